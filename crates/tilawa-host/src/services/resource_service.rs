use tilawa_audio::ResourceEvent;
use tilawa_bridge::HostEvent;

use crate::state::LoadOutcome;

/// Applies an asynchronous resource event to the state and publishes the
/// result. Events of loads other than the current one are dropped.
pub async fn handle_resource_event(context: super::HostContextHandle, event: ResourceEvent) {
    let notification = {
        let mut guard = context.state.write().await;
        let state = &mut *guard;
        if state.current_load != Some(event.load()) {
            log::debug!("Ignoring stale resource event {event:?}");
            return;
        }

        match event {
            ResourceEvent::MetadataLoaded { duration, .. } => {
                state.playback.duration = duration.max(0.0);
                state.playback.current_time =
                    state.playback.clamp_time(state.playback.current_time);
                None
            }
            ResourceEvent::CanPlay { load } => {
                if state.playback.loaded_url.is_none() {
                    // a load that timed out earlier finished after all
                    state.playback.loaded_url = state
                        .resource
                        .as_ref()
                        .and_then(|resource| resource.source())
                        .map(str::to_string);
                    log::info!("Load {load} became playable after its timeout");
                }
                if let Some(pending) = state.take_pending(load) {
                    pending.resolve(LoadOutcome::Ready);
                }
                None
            }
            ResourceEvent::TimeUpdate { position, .. } => {
                state.playback.current_time = state.playback.clamp_time(position.max(0.0));
                None
            }
            ResourceEvent::Ended { load } => {
                log::info!("Load {load} reached the end of the stream");
                state.playback.is_playing = false;
                state.playback.current_time = 0.0;
                if let Some(resource) = state.resource.as_mut() {
                    resource.pause();
                    resource.seek(0.0);
                }
                Some(HostEvent::Ended)
            }
            ResourceEvent::Error { load, message } => {
                log::error!("Resource error for load {load}: {message}");
                state.playback.is_playing = false;
                state.playback.loaded_url = None;
                if let Some(pending) = state.take_pending(load) {
                    pending.resolve(LoadOutcome::Failed(message.clone()));
                }
                Some(HostEvent::Error { error: message })
            }
        }
    };

    context.publish_state().await;
    if let Some(notification) = notification {
        context.notify(notification);
    }
}
