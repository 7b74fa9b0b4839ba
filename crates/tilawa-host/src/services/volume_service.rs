use tilawa_bridge::preferences::keys;
use tilawa_bridge::state::is_valid_volume;
use tilawa_bridge::{Envelope, ErrorCode, Response};

/// Handles an incoming volume request (see
/// [`tilawa_bridge::Command::SetVolume`]) and persists the new level.
pub async fn handle_set_volume(context: super::HostContextHandle, volume: f64, envelope: Envelope) {
    if !is_valid_volume(volume) {
        envelope.respond(Response::failure(
            ErrorCode::InvalidVolume,
            format!("volume {volume} is outside of [0, 1]"),
        ));
        return;
    }

    {
        let mut state = context.state.write().await;
        state.playback.volume = volume;
        state.apply_gain();
    }

    // persisting is fire-and-forget, the answer does not wait for the disk
    let preferences = context.preferences.clone();
    tokio::spawn(async move {
        if let Err(err) = preferences.set_one(keys::VOLUME, volume).await {
            log::warn!("Failed to persist volume {volume}: {err}");
        }
    });

    context.publish_state().await;
    envelope.respond(Response::ok());
}

/// Handles an incoming mute request (see
/// [`tilawa_bridge::Command::SetMuted`]). The stored volume is untouched.
pub async fn handle_set_muted(context: super::HostContextHandle, muted: bool, envelope: Envelope) {
    {
        let mut state = context.state.write().await;
        state.playback.is_muted = muted;
        state.apply_gain();
    }

    context.publish_state().await;
    envelope.respond(Response::ok());
}
