//! Local replica of the host's playback state.

use tilawa_bridge::{HostEvent, PlaybackState};

/// Notifications forwarded from the host to the application.
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerEvent {
    /// The mirror was replaced by a new snapshot.
    State(PlaybackState),
    /// The loaded track played through to its end.
    Ended,
    /// The host reported a resource error outside of any command.
    Error(String),
    /// A host context finished starting.
    HostReady,
}

/// Last snapshot received from the host, plus the user's scrub position.
///
/// Snapshots replace the mirror wholesale. While scrubbing, the displayed
/// position is the local one; every other field keeps following the host.
#[derive(Debug, Clone, Default)]
pub struct StateMirror {
    state: PlaybackState,
    scrub: Option<f64>,
    synced: bool,
}

impl StateMirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a host event and returns what the application should see.
    pub fn apply_event(&mut self, event: HostEvent) -> ControllerEvent {
        match event {
            HostEvent::StateUpdate { state } => {
                self.replace(state);
                ControllerEvent::State(self.view())
            }
            HostEvent::Ended => ControllerEvent::Ended,
            HostEvent::Error { error } => ControllerEvent::Error(error),
            HostEvent::Ready => ControllerEvent::HostReady,
        }
    }

    /// Replaces the mirrored snapshot.
    pub fn replace(&mut self, state: PlaybackState) {
        self.state = state;
        self.synced = true;
    }

    /// Whether any snapshot was received yet.
    pub fn is_synced(&self) -> bool {
        self.synced
    }

    /// The last snapshot exactly as the host sent it.
    pub fn host_state(&self) -> &PlaybackState {
        &self.state
    }

    /// The snapshot as displayed, with the scrub position applied.
    pub fn view(&self) -> PlaybackState {
        PlaybackState {
            current_time: self.displayed_time(),
            ..self.state.clone()
        }
    }

    pub fn displayed_time(&self) -> f64 {
        self.scrub.unwrap_or(self.state.current_time)
    }

    pub fn is_scrubbing(&self) -> bool {
        self.scrub.is_some()
    }

    /// Starts or moves a scrub gesture.
    pub fn scrub_to(&mut self, position: f64) {
        let position = self.state.clamp_time(position.max(0.0));
        self.scrub = Some(position);
    }

    /// Ends the scrub gesture, returning the position to seek to.
    pub fn finish_scrub(&mut self) -> Option<f64> {
        self.scrub.take()
    }
}
