use tilawa_bridge::{Envelope, Response};

/// Handles an incoming state request (see
/// [`tilawa_bridge::Command::GetState`]).
pub async fn handle_get_state(context: super::HostContextHandle, envelope: Envelope) {
    let state = {
        let mut state = context.state.write().await;
        if state.playback.is_playing {
            state.sync_position();
        }
        state.playback.clone()
    };
    envelope.respond(Response::with_state(state));
}

/// Handles a liveness probe. Reaching this handler means the command loop is
/// running, so the host is ready.
pub fn handle_ping(envelope: Envelope) {
    envelope.respond(Response::ready(true));
}
