//! Single-shot delivery of a command with a bounded wait.
//!
//! The router reports three shapes of answer: a successful response, a failed
//! one, and no payload at all. Only this module knows about the third shape;
//! everything above it sees `Result<Response, ClientError>`.

use std::time::Duration;

use tilawa_bridge::{Command, ErrorCode, MessageRouter, Response};

use crate::error::ClientError;

/// Raw answer as delivered by the router.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Reply {
    Success(Response),
    Failure { code: ErrorCode, message: String },
    /// The receiver acknowledged without a payload.
    Implicit,
}

impl From<Option<Response>> for Reply {
    fn from(answer: Option<Response>) -> Self {
        match answer {
            None => Reply::Implicit,
            Some(response) if response.success => Reply::Success(response),
            Some(response) => Reply::Failure {
                code: response.error.unwrap_or(ErrorCode::Unknown),
                message: response
                    .message
                    .unwrap_or_else(|| "request failed".to_string()),
            },
        }
    }
}

impl Reply {
    /// An acknowledgement without payload counts as success.
    pub fn into_result(self) -> Result<Response, ClientError> {
        match self {
            Reply::Success(response) => Ok(response),
            Reply::Implicit => Ok(Response::ok()),
            Reply::Failure { code, message } => Err(ClientError::Host { code, message }),
        }
    }
}

/// Sends `command` to its target once and waits at most `window` for the
/// answer. Host work that outlives the window is not cancelled.
pub(crate) async fn send_once(
    router: &MessageRouter,
    command: Command,
    window: Duration,
) -> Result<Response, ClientError> {
    let target = command.target();
    match tokio::time::timeout(window, router.send(target, command)).await {
        Ok(Ok(answer)) => Reply::from(answer).into_result(),
        Ok(Err(err)) => Err(err.into()),
        Err(_) => Err(ClientError::MessageTimeout(window)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tilawa_bridge::{Envelope, Target};
    use tokio::sync::mpsc;

    mod reply {
        use super::*;

        #[test]
        fn missing_payload_is_success() {
            assert_eq!(Reply::from(None), Reply::Implicit);
            assert_eq!(Reply::Implicit.into_result(), Ok(Response::ok()));
        }

        #[test]
        fn failure_keeps_code_and_message() {
            let reply = Reply::from(Some(Response::failure(
                ErrorCode::NotLoaded,
                "nothing is loaded",
            )));
            assert_eq!(
                reply.into_result(),
                Err(ClientError::Host {
                    code: ErrorCode::NotLoaded,
                    message: "nothing is loaded".to_string()
                })
            );
        }

        #[test]
        fn failure_without_code_is_unknown() {
            let response = Response {
                success: false,
                ..Response::default()
            };
            let err = Reply::from(Some(response)).into_result().unwrap_err();
            assert_eq!(err.code(), ErrorCode::Unknown);
        }
    }

    mod send_once {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn times_out_on_silent_receiver() {
            let router = MessageRouter::default();
            let (tx, mut rx) = mpsc::channel::<Envelope>(4);
            router.register(Target::Host, tx).await.unwrap();
            let held = tokio::spawn(async move {
                let envelope = rx.recv().await;
                tokio::time::sleep(Duration::from_secs(60)).await;
                drop(envelope);
            });

            let window = Duration::from_secs(5);
            let result = send_once(&router, Command::GetState, window).await;

            assert_eq!(result, Err(ClientError::MessageTimeout(window)));
            held.abort();
        }

        #[tokio::test]
        async fn missing_host_is_not_ready() {
            let router = MessageRouter::default();
            let result = send_once(&router, Command::Play, Duration::from_secs(5)).await;
            assert_eq!(result, Err(ClientError::HostNotReady));
        }

        #[tokio::test]
        async fn closed_router_is_unavailable() {
            let router = MessageRouter::default();
            router.close().await;
            let result = send_once(&router, Command::CreateHost, Duration::from_secs(5)).await;
            assert_eq!(result, Err(ClientError::ChannelUnavailable));
        }
    }
}
