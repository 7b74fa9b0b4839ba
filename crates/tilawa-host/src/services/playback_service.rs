use tilawa_audio::LoadId;
use tilawa_bridge::state::is_valid_time;
use tilawa_bridge::{Envelope, ErrorCode, Response};
use tokio::sync::oneshot;

use crate::state::{LoadOutcome, PendingLoad, State};

/// Creates the audio resource on first use and applies the current gain.
fn ensure_resource(
    context: &super::HostContextHandle,
    state: &mut State,
) -> Result<(), tilawa_audio::ResourceError> {
    if state.resource.is_none() {
        let resource = context.factory.create(context.resource_events.clone())?;
        log::info!("Created audio resource");
        state.resource = Some(resource);
        state.apply_gain();
    }
    Ok(())
}

/// Handles an incoming load request (see
/// [`tilawa_bridge::Command::Load`]).
///
/// The answer is sent from a separate task once the load settles, so the
/// command loop keeps serving other requests in the meantime.
pub async fn handle_load(context: super::HostContextHandle, url: String, envelope: Envelope) {
    let (waiter, outcome) = oneshot::channel();
    let load = {
        let mut guard = context.state.write().await;
        let state = &mut *guard;

        if state.is_bound_to(&url) {
            let playable = state
                .resource
                .as_ref()
                .is_some_and(|resource| resource.ready_state().can_play());
            if let Some(pending) = state.pending.take_if(|_| playable) {
                pending.resolve(LoadOutcome::Ready);
            }

            match state.pending.as_mut() {
                Some(pending) if Some(pending.load) == state.current_load => {
                    log::debug!("Load of {url} already in progress, waiting on it");
                    pending.waiters.push(waiter);
                    pending.load
                }
                _ => {
                    log::debug!("{url} is already loaded");
                    envelope.respond(Response::with_state(state.playback.clone()));
                    return;
                }
            }
        } else {
            if let Err(err) = ensure_resource(&context, state) {
                log::error!("Failed to create audio resource: {err}");
                envelope.respond(Response::failure(ErrorCode::ResourceError, err.to_string()));
                return;
            }
            let Some(resource) = state.resource.as_mut() else {
                return;
            };

            resource.pause();
            let load = resource.load(&url);
            log::info!("Loading {url} (load {load})");

            if let Some(previous) = state.pending.take() {
                previous.resolve(LoadOutcome::Failed(
                    "load was superseded by a newer one".to_string(),
                ));
            }
            state.current_load = Some(load);
            state.pending = Some(PendingLoad {
                load,
                waiters: vec![waiter],
            });
            state.playback.is_playing = false;
            state.playback.current_time = 0.0;
            state.playback.duration = 0.0;
            state.playback.loaded_url = Some(url);
            load
        }
    };

    context.publish_state().await;
    tokio::spawn(await_load(context, load, outcome, envelope));
}

/// Waits for `load` to settle or for the load timeout, then answers.
async fn await_load(
    context: super::HostContextHandle,
    load: LoadId,
    outcome: oneshot::Receiver<LoadOutcome>,
    envelope: Envelope,
) {
    let settled = tokio::select! {
        settled = tokio::time::timeout(context.timings.load_timeout(), outcome) => settled,
        _ = context.wait_retired() => {
            log::debug!("Host context reclaimed while load {load} was pending");
            envelope.respond(Response::failure(
                ErrorCode::ResourceError,
                "the host context was reclaimed",
            ));
            return;
        }
    };

    let response = match settled {
        Ok(Ok(LoadOutcome::Ready)) => {
            Response::with_state(context.state.read().await.playback.clone())
        }
        Ok(Ok(LoadOutcome::Failed(message))) => {
            Response::failure(ErrorCode::ResourceError, message)
        }
        Ok(Err(_)) => Response::failure(ErrorCode::ResourceError, "load was abandoned"),
        Err(_) => {
            let mut state = context.state.write().await;
            let ready = state
                .resource
                .as_ref()
                .is_some_and(|resource| resource.ready_state().can_play());

            if ready && state.current_load == Some(load) {
                log::debug!("Load {load} timed out but enough data is buffered");
                Response::with_state(state.playback.clone())
            } else {
                log::warn!("Load {load} timed out before becoming playable");
                if state.current_load == Some(load) {
                    state.playback.loaded_url = None;
                    state.playback.is_playing = false;
                    drop(state);
                    context.publish_state().await;
                }
                Response::failure(
                    ErrorCode::LoadTimeout,
                    "the stream did not buffer enough data in time",
                )
            }
        }
    };

    envelope.respond(response);
}

/// Handles an incoming play request (see [`tilawa_bridge::Command::Play`]).
pub async fn handle_play(context: super::HostContextHandle, envelope: Envelope) {
    let response = {
        let mut state = context.state.write().await;
        if state.playback.loaded_url.is_none() {
            envelope.respond(Response::failure(
                ErrorCode::NotLoaded,
                "nothing is loaded",
            ));
            return;
        }

        let played = match state.resource.as_mut() {
            Some(resource) => resource.play(),
            None => Err(tilawa_audio::ResourceError::NotAllowed(
                "audio resource is missing".to_string(),
            )),
        };
        match played {
            Ok(()) => {
                state.playback.is_playing = true;
                Response::ok()
            }
            Err(err) => {
                log::warn!("Playback was rejected: {err}");
                state.playback.is_playing = false;
                Response::failure(ErrorCode::PlaybackRejected, err.to_string())
            }
        }
    };

    context.publish_state().await;
    envelope.respond(response);
}

/// Handles an incoming pause request (see [`tilawa_bridge::Command::Pause`]).
pub async fn handle_pause(context: super::HostContextHandle, envelope: Envelope) {
    {
        let mut state = context.state.write().await;
        let Some(resource) = state.resource.as_mut() else {
            envelope.respond(Response::failure(
                ErrorCode::NotInitialized,
                "audio resource was never created",
            ));
            return;
        };
        resource.pause();
        state.playback.is_playing = false;
        state.sync_position();
    }

    context.publish_state().await;
    envelope.respond(Response::ok());
}

/// Handles an incoming seek request (see [`tilawa_bridge::Command::Seek`]).
pub async fn handle_seek(context: super::HostContextHandle, time: f64, envelope: Envelope) {
    if !is_valid_time(time) {
        envelope.respond(Response::failure(
            ErrorCode::InvalidTime,
            format!("{time} is not a valid position"),
        ));
        return;
    }

    {
        let mut state = context.state.write().await;
        let time = state.playback.clamp_time(time);
        let Some(resource) = state.resource.as_mut() else {
            envelope.respond(Response::failure(
                ErrorCode::NotInitialized,
                "audio resource was never created",
            ));
            return;
        };
        resource.seek(time);
        state.playback.current_time = time;
    }

    context.publish_state().await;
    envelope.respond(Response::ok());
}
