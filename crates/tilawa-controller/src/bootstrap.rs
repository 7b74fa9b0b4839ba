//! Best-effort "make sure the host is alive" sequence.
//!
//! The sequence never loops: it asks the supervisor at most once per call and
//! its total duration is bounded by [`TimingConfig::bootstrap_bound`].

use tilawa_bridge::config::TimingConfig;
use tilawa_bridge::{ChannelError, Command, MessageRouter, Target};

use crate::error::ClientError;

/// Asks the supervisor for a host when none is registered, then probes the
/// host with a ping.
///
/// Returns whether the host answered the ping. A missing or slow host is not
/// an error here; only a router without any messaging capability is.
pub(crate) async fn ensure_host(
    router: &MessageRouter,
    timings: &TimingConfig,
) -> Result<bool, ClientError> {
    if router.is_closed() {
        return Err(ClientError::ChannelUnavailable);
    }

    if !router.host_exists().await {
        log::debug!("No host registered, asking the supervisor to create one");
        let request = router.send(Target::Supervisor, Command::CreateHost);
        match tokio::time::timeout(timings.create_fallback(), request).await {
            Ok(Err(ChannelError::Unavailable)) => return Err(ClientError::ChannelUnavailable),
            Ok(answer) => {
                log::debug!("Supervisor answered host creation with {answer:?}");
                tokio::time::sleep(timings.create_settle()).await;
            }
            Err(_) => log::warn!("Supervisor did not answer host creation in time"),
        }

        if !router.host_exists().await {
            log::warn!("Host is still missing after the creation request, continuing anyway");
            return Ok(false);
        }
    }

    let ping = router.send(Target::Host, Command::Ping);
    match tokio::time::timeout(timings.ping_timeout(), ping).await {
        Ok(Ok(Some(response))) if response.success && response.ready == Some(true) => Ok(true),
        outcome => {
            log::debug!("Host ping did not confirm readiness: {outcome:?}");
            tokio::time::sleep(timings.ping_settle()).await;
            Ok(false)
        }
    }
}
