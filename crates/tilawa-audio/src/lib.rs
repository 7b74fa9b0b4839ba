//! Audio output resource used by the playback host.
//!
//! This crate defines the [`AudioResource`] seam the host drives, and the
//! events a resource reports asynchronously while it fetches, decodes and
//! plays a stream. It focuses on:
//! - Binding a resource to a stream URL and reporting readiness.
//! - Producing audio with an adjustable gain.
//! - Reporting progress, end of stream and errors as [`ResourceEvent`]s.
//!
//! # Load identifiers
//! Every [`AudioResource::load`] call returns a fresh [`LoadId`], and every
//! event carries the id of the load it belongs to. Events of superseded loads
//! may still arrive and must be ignored by the receiver.

pub mod output;
mod stream;
#[cfg(feature = "scripted")]
pub mod scripted;

use tokio::sync::mpsc::UnboundedSender;

/// Identifier of a single `load` call on a resource.
pub type LoadId = u64;

/// Asynchronous notifications emitted by a resource.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceEvent {
    /// The track length became known.
    MetadataLoaded { load: LoadId, duration: f64 },
    /// Enough data is buffered to start playing.
    CanPlay { load: LoadId },
    /// Playback position advanced.
    TimeUpdate { load: LoadId, position: f64 },
    /// Playback reached the natural end of the stream.
    Ended { load: LoadId },
    /// Fetching or decoding failed.
    Error { load: LoadId, message: String },
}

impl ResourceEvent {
    /// The load this event belongs to.
    pub fn load(&self) -> LoadId {
        match self {
            ResourceEvent::MetadataLoaded { load, .. }
            | ResourceEvent::CanPlay { load }
            | ResourceEvent::TimeUpdate { load, .. }
            | ResourceEvent::Ended { load }
            | ResourceEvent::Error { load, .. } => *load,
        }
    }
}

/// Sending half used by resources to report [`ResourceEvent`]s.
pub type EventSink = UnboundedSender<ResourceEvent>;

/// How much of the bound stream is available, in increasing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum ReadyState {
    /// Nothing is known about the stream yet.
    #[default]
    Nothing,
    /// Duration and format are known.
    Metadata,
    /// Data for the current position is available.
    CurrentData,
    /// Data beyond the current position is available.
    FutureData,
    /// Enough data is buffered to play through.
    EnoughData,
}

impl ReadyState {
    /// Whether playback could start right away.
    pub fn can_play(self) -> bool {
        self >= ReadyState::FutureData
    }
}

/// Errors that can occur while creating or driving an audio resource.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ResourceError {
    /// No audio output device could be opened.
    #[error("failed to open audio output: {0}")]
    OutputUnavailable(String),
    /// The stream format cannot be decoded.
    #[error("the media format is not supported: {0}")]
    NotSupported(String),
    /// The request is invalid in the resource's current state.
    #[error("the operation is not allowed: {0}")]
    NotAllowed(String),
    /// The resource's worker is gone.
    #[error("audio worker has stopped")]
    WorkerStopped,
}

/// A single audio-producing resource.
///
/// Implementations never block: `load` starts fetching in the background and
/// reports progress through the [`EventSink`] given at creation.
pub trait AudioResource: Send + Sync {
    /// Stops current playback and binds the resource to `url`.
    fn load(&mut self, url: &str) -> LoadId;

    /// The URL the resource is currently bound to.
    fn source(&self) -> Option<&str>;

    /// Starts producing audio. Playback of a stream that is still loading
    /// begins once it becomes playable.
    fn play(&mut self) -> Result<(), ResourceError>;

    fn pause(&mut self);

    /// Moves the playback position, in seconds.
    fn seek(&mut self, position: f64);

    /// Current playback position, in seconds.
    fn position(&self) -> f64;

    /// Applies the output gain in `[0, 1]`.
    fn set_gain(&mut self, gain: f64);

    fn ready_state(&self) -> ReadyState;
}

/// Creates audio resources on demand.
pub trait ResourceFactory: Send + Sync {
    fn create(&self, events: EventSink) -> Result<Box<dyn AudioResource>, ResourceError>;
}
