use tilawa_audio::{AudioResource, LoadId};
use tilawa_bridge::PlaybackState;
use tokio::sync::oneshot;

/// How a pending load finished, as seen by the requests waiting on it.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    Ready,
    Failed(String),
}

/// Requests waiting for a load to become playable.
pub struct PendingLoad {
    pub load: LoadId,
    pub waiters: Vec<oneshot::Sender<LoadOutcome>>,
}

impl PendingLoad {
    /// Resolves every waiter. Waiters that already gave up are skipped.
    pub fn resolve(self, outcome: LoadOutcome) {
        for waiter in self.waiters {
            let _ = waiter.send(outcome.clone());
        }
    }
}

/// The host's state: the playback snapshot and the audio resource it
/// describes.
///
/// The resource is created lazily on the first load and is reachable only
/// through this struct, which never leaves the host crate.
pub struct State {
    /// Snapshot broadcast to controllers.
    pub playback: PlaybackState,
    /// The audio resource, absent until the first load.
    pub resource: Option<Box<dyn AudioResource>>,
    /// The load whose resource events are applied; older ones are ignored.
    pub current_load: Option<LoadId>,
    /// Requests waiting on `current_load`.
    pub pending: Option<PendingLoad>,
}

impl State {
    /// Fresh host state starting from a persisted volume level.
    pub fn new(volume: f64) -> Self {
        Self {
            playback: PlaybackState::with_volume(volume),
            resource: None,
            current_load: None,
            pending: None,
        }
    }

    /// Whether both the snapshot and the resource point at `url`.
    pub fn is_bound_to(&self, url: &str) -> bool {
        self.playback.loaded_url.as_deref() == Some(url)
            && self.resource.as_ref().and_then(|resource| resource.source()) == Some(url)
    }

    /// Pushes the effective gain to the resource, if any.
    pub fn apply_gain(&mut self) {
        let gain = self.playback.effective_gain();
        if let Some(resource) = self.resource.as_mut() {
            resource.set_gain(gain);
        }
    }

    /// Reads the resource position into the snapshot.
    pub fn sync_position(&mut self) {
        if let Some(resource) = self.resource.as_ref() {
            let position = resource.position();
            self.playback.current_time = self.playback.clamp_time(position.max(0.0));
        }
    }

    /// Takes the waiters of `load` if it is still the pending one.
    pub fn take_pending(&mut self, load: LoadId) -> Option<PendingLoad> {
        match self.pending.as_ref() {
            Some(pending) if pending.load == load => self.pending.take(),
            _ => None,
        }
    }
}

/// Thread-safe, async-friendly shared reference to the host [`State`].
pub type SharedState = std::sync::Arc<tokio::sync::RwLock<State>>;
