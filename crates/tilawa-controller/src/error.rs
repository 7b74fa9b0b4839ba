use std::time::Duration;

use tilawa_bridge::{ChannelError, ErrorCode};

/// Errors surfaced to the application by the [`crate::ControllerClient`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClientError {
    /// No messaging capability at all. Retrying will not help.
    #[error("messaging is not available")]
    ChannelUnavailable,
    /// The host endpoint does not exist, even after bootstrapping it.
    #[error("the playback host is not ready")]
    HostNotReady,
    #[error("no response within {0:?}")]
    MessageTimeout(Duration),
    /// The receiver dropped the request without answering.
    #[error("the message port closed before a response was received")]
    PortClosed,
    /// The receiver answered with a failure.
    #[error("{code}: {message}")]
    Host { code: ErrorCode, message: String },
}

impl ClientError {
    /// The protocol code describing this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            ClientError::ChannelUnavailable => ErrorCode::ChannelUnavailable,
            ClientError::HostNotReady => ErrorCode::HostNotReady,
            ClientError::MessageTimeout(_) => ErrorCode::MessageTimeout,
            ClientError::PortClosed => ErrorCode::Unknown,
            ClientError::Host { code, .. } => *code,
        }
    }

    /// Whether a bootstrap followed by a resend may fix this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ClientError::HostNotReady)
    }
}

impl From<ChannelError> for ClientError {
    fn from(err: ChannelError) -> Self {
        match err {
            ChannelError::Unavailable => ClientError::ChannelUnavailable,
            ChannelError::NoReceiver => ClientError::HostNotReady,
            ChannelError::PortClosed => ClientError::PortClosed,
        }
    }
}
