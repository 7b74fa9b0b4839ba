//! Lifecycle supervisor of the playback host context.
//!
//! The supervisor is the only component allowed to create the host. It keeps
//! at most one host context alive, creates it lazily on demand or at startup,
//! and answers `CREATE_HOST` requests routed to it.

use std::sync::Arc;

use tilawa_audio::ResourceFactory;
use tilawa_bridge::config::TimingConfig;
use tilawa_bridge::preferences::PreferenceStore;
use tilawa_bridge::{ChannelError, Command, Envelope, ErrorCode, MessageRouter, Response};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

use crate::runtime::{HostHandle, spawn_host};

/// Reason declared when the host context is created.
pub const HOST_JUSTIFICATION: &str = "audio playback must continue after the controller closes";

/// Errors that can occur while creating the host context.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SupervisorError {
    /// The host endpoint could not be registered on the router.
    #[error("failed to register the host context: {0}")]
    Channel(#[from] ChannelError),
}

/// Whether [`Supervisor::ensure_host`] had to create the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostStatus {
    Created,
    AlreadyRunning,
}

/// Creates and owns the single playback host context.
pub struct Supervisor {
    router: MessageRouter,
    factory: Arc<dyn ResourceFactory>,
    preferences: PreferenceStore,
    timings: TimingConfig,
    /// Guards check-then-create so concurrent requests never spawn two hosts.
    host: Mutex<Option<HostHandle>>,
}

impl Supervisor {
    pub fn new(
        router: MessageRouter,
        factory: Arc<dyn ResourceFactory>,
        preferences: PreferenceStore,
        timings: TimingConfig,
    ) -> Self {
        Self {
            router,
            factory,
            preferences,
            timings,
            host: Mutex::new(None),
        }
    }

    /// Makes sure the host context exists, creating it if needed.
    pub async fn ensure_host(&self) -> Result<HostStatus, SupervisorError> {
        let mut host = self.host.lock().await;

        let running = host.as_ref().is_some_and(HostHandle::is_running);
        if running && self.router.host_exists().await {
            return Ok(HostStatus::AlreadyRunning);
        }
        if let Some(stale) = host.take() {
            log::warn!("Host context stopped unexpectedly, recreating it");
            stale.shutdown();
        }

        log::info!("Creating host context: {HOST_JUSTIFICATION}");
        let handle = spawn_host(
            self.router.clone(),
            self.factory.clone(),
            self.preferences.clone(),
            self.timings.clone(),
        )
        .await?;
        *host = Some(handle);
        Ok(HostStatus::Created)
    }

    /// Called when the application starts.
    pub async fn on_startup(&self) -> Result<HostStatus, SupervisorError> {
        log::debug!("Startup, ensuring the host context");
        self.ensure_host().await
    }

    /// Called after the application was installed or updated.
    pub async fn on_installed(&self) -> Result<HostStatus, SupervisorError> {
        log::debug!("Installed, ensuring the host context");
        self.ensure_host().await
    }

    /// Tears the host context down. All playback state except the persisted
    /// volume is lost; the next [`Supervisor::ensure_host`] starts fresh.
    pub async fn reclaim_host(&self) {
        let mut host = self.host.lock().await;
        self.router.unregister_host().await;
        if let Some(handle) = host.take() {
            handle.shutdown();
            log::info!("Host context reclaimed");
        }
    }

    /// Registers the supervisor endpoint and serves requests until the
    /// router drops it.
    pub async fn listen(self: Arc<Self>) -> Result<JoinHandle<()>, ChannelError> {
        let (tx, mut rx) = mpsc::channel::<Envelope>(16);
        self.router.register_supervisor(tx).await?;

        Ok(tokio::spawn(async move {
            while let Some(envelope) = rx.recv().await {
                log::debug!("Supervisor got a message: {:?}", envelope.command);
                self.handle(envelope).await;
            }
        }))
    }

    async fn handle(&self, envelope: Envelope) {
        match envelope.command {
            Command::CreateHost => match self.ensure_host().await {
                Ok(status) => {
                    log::debug!("Host creation request handled: {status:?}");
                    envelope.respond(Response::ok());
                }
                Err(err) => {
                    log::error!("Failed to create host context: {err}");
                    envelope.respond(Response::failure(ErrorCode::CreationFailed, err.to_string()));
                }
            },
            _ => envelope.respond(Response::failure(
                ErrorCode::UnsupportedCommand,
                "the supervisor only creates the host context",
            )),
        }
    }
}
