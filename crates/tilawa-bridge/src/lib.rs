//! Communication bridge between the playback host and its controllers.
//!
//! This crate defines the types and protocols used to connect any number of
//! controllers (user-facing front ends) with a single long-lived playback host
//! that owns the audio output.
//!
//! The design is a small command-and-broadcast channel:
//! - Controllers send one-shot [`Command`]s and await exactly one
//!   [`Response`] each.
//! - The host pushes [`HostEvent`]s (full state snapshots, end-of-track and
//!   error notifications) to every subscriber.
//!
//! Delivery goes through the [`channel::MessageRouter`], which models the
//! failure modes of an inter-context messaging layer: the receiving end may
//! not be registered yet, may drop a request without answering, or the whole
//! messaging capability may be gone.

pub mod channel;
pub mod config;
pub mod preferences;
pub mod state;

use serde::{Deserialize, Serialize};

pub use crate::channel::{ChannelError, Envelope, MessageRouter, Target};
pub use crate::state::PlaybackState;

/// Commands issued by a controller.
///
/// Every command except [`Command::CreateHost`] is addressed to the playback
/// host; host creation is requested from the lifecycle supervisor.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    /// Asks the supervisor to make sure the host context exists.
    #[serde(rename = "CREATE_OFFSCREEN", alias = "CREATE_HOST")]
    CreateHost,
    /// Liveness probe answered with a readiness flag.
    Ping,
    /// Binds the audio resource to a stream URL and waits until it can play.
    #[serde(rename = "LOAD_AUDIO")]
    Load { url: String },
    Play,
    Pause,
    /// Moves the playback position, in seconds.
    #[serde(rename = "SET_TIME")]
    Seek { time: f64 },
    /// Sets the stored volume level in `[0, 1]`.
    SetVolume { volume: f64 },
    SetMuted { muted: bool },
    GetState,
}

impl Command {
    /// Returns the component this command is addressed to.
    pub fn target(&self) -> Target {
        match self {
            Command::CreateHost => Target::Supervisor,
            _ => Target::Host,
        }
    }

    /// Whether this is the host creation request.
    pub fn is_create_host(&self) -> bool {
        matches!(self, Command::CreateHost)
    }
}

/// Reason codes carried by failed responses and controller errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// No messaging capability is present at all.
    ChannelUnavailable,
    /// The receiving end of a request was never registered.
    HostNotReady,
    /// No response arrived within the request window.
    MessageTimeout,
    /// The resource did not buffer enough data before the load timeout.
    LoadTimeout,
    /// The resource reported a load or decode error.
    ResourceError,
    InvalidTime,
    InvalidVolume,
    /// Playback was requested while nothing is loaded.
    NotLoaded,
    /// The audio resource was never created.
    NotInitialized,
    /// The resource refused to start producing audio.
    PlaybackRejected,
    /// The receiver does not handle this command.
    UnsupportedCommand,
    /// The supervisor failed to create the host context.
    CreationFailed,
    /// A failed response did not name its reason.
    Unknown,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorCode::ChannelUnavailable => "CHANNEL_UNAVAILABLE",
            ErrorCode::HostNotReady => "HOST_NOT_READY",
            ErrorCode::MessageTimeout => "MESSAGE_TIMEOUT",
            ErrorCode::LoadTimeout => "LOAD_TIMEOUT",
            ErrorCode::ResourceError => "RESOURCE_ERROR",
            ErrorCode::InvalidTime => "INVALID_TIME",
            ErrorCode::InvalidVolume => "INVALID_VOLUME",
            ErrorCode::NotLoaded => "NOT_LOADED",
            ErrorCode::NotInitialized => "NOT_INITIALIZED",
            ErrorCode::PlaybackRejected => "PLAYBACK_REJECTED",
            ErrorCode::UnsupportedCommand => "UNSUPPORTED_COMMAND",
            ErrorCode::CreationFailed => "CREATION_FAILED",
            ErrorCode::Unknown => "UNKNOWN",
        };
        formatter.write_str(name)
    }
}

/// Answer to a single [`Command`].
///
/// A handler may also answer with no response at all (an acknowledgement
/// without payload); the router delivers that as `None`.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct Response {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorCode>,
    /// Human-readable failure reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<PlaybackState>,
    /// Readiness flag returned by `PING`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready: Option<bool>,
}

impl Response {
    /// A plain successful response without payload.
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    /// A successful response carrying a state snapshot.
    pub fn with_state(state: PlaybackState) -> Self {
        Self {
            success: true,
            state: Some(state),
            ..Self::default()
        }
    }

    /// A successful liveness response.
    pub fn ready(ready: bool) -> Self {
        Self {
            success: true,
            ready: Some(ready),
            ..Self::default()
        }
    }

    pub fn failure(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(code),
            message: Some(message.into()),
            ..Self::default()
        }
    }
}

/// Messages broadcast by the host to every subscribed controller.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum HostEvent {
    /// Full snapshot of the playback state after a change or heartbeat.
    #[serde(rename = "AUDIO_STATE_UPDATE")]
    StateUpdate { state: PlaybackState },
    /// The loaded track played through to its natural end.
    #[serde(rename = "AUDIO_ENDED")]
    Ended,
    /// The resource reported an error outside of any command.
    #[serde(rename = "AUDIO_ERROR")]
    Error { error: String },
    /// The host context finished starting and accepts commands.
    #[serde(rename = "OFFSCREEN_READY")]
    Ready,
}
