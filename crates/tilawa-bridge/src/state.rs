use serde::{Deserialize, Serialize};

/// Snapshot of the playback host's state.
///
/// The host is the only writer. Controllers hold read-only copies that they
/// replace wholesale on every broadcast.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackState {
    /// Whether the resource is currently producing audio.
    pub is_playing: bool,
    /// Playback position in seconds.
    pub current_time: f64,
    /// Track length in seconds, `0.0` until metadata is known.
    pub duration: f64,
    /// Stored volume level in `[0, 1]`. Muting does not change it.
    pub volume: f64,
    pub is_muted: bool,
    /// Stream URL the resource is bound to, if any.
    pub loaded_url: Option<String>,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            is_playing: false,
            current_time: 0.0,
            duration: 0.0,
            volume: 1.0,
            is_muted: false,
            loaded_url: None,
        }
    }
}

impl PlaybackState {
    /// Fresh state that starts from a previously persisted volume level.
    pub fn with_volume(volume: f64) -> Self {
        Self {
            volume: if is_valid_volume(volume) { volume } else { 1.0 },
            ..Self::default()
        }
    }

    /// Gain actually applied to the output.
    pub fn effective_gain(&self) -> f64 {
        if self.is_muted { 0.0 } else { self.volume }
    }

    /// Whether the track length has been resolved.
    pub fn has_duration(&self) -> bool {
        self.duration > 0.0
    }

    /// Limits a position to the known track length.
    pub fn clamp_time(&self, time: f64) -> f64 {
        if self.has_duration() {
            time.min(self.duration)
        } else {
            time
        }
    }
}

/// Whether `level` is an acceptable volume. NaN is rejected.
pub fn is_valid_volume(level: f64) -> bool {
    (0.0..=1.0).contains(&level)
}

/// Whether `time` is an acceptable playback position.
pub fn is_valid_time(time: f64) -> bool {
    time.is_finite() && time >= 0.0
}
