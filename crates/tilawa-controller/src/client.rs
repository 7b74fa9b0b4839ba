//! Command dispatch and state mirroring for a single controller.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tilawa_bridge::config::TimingConfig;
use tilawa_bridge::preferences::{PreferenceStore, keys};
use tilawa_bridge::{Command, MessageRouter, PlaybackState, Response};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{Mutex, RwLock, mpsc};
use tokio::task::JoinHandle;

use crate::bootstrap;
use crate::error::ClientError;
use crate::mirror::{ControllerEvent, StateMirror};
use crate::transport;

/// A controller talking to the playback host through the router.
///
/// Commands issued through one client are sent one at a time, in call order.
pub struct ControllerClient {
    router: MessageRouter,
    preferences: PreferenceStore,
    timings: TimingConfig,
    dispatch: Mutex<()>,
    /// Cleared when the host went missing, so the next command bootstraps.
    host_confirmed: AtomicBool,
    mirror: Arc<RwLock<StateMirror>>,
}

impl ControllerClient {
    pub fn new(router: MessageRouter, preferences: PreferenceStore, timings: TimingConfig) -> Self {
        Self {
            router,
            preferences,
            timings,
            dispatch: Mutex::new(()),
            host_confirmed: AtomicBool::new(false),
            mirror: Arc::new(RwLock::new(StateMirror::new())),
        }
    }

    /// Runs the bootstrap sequence now instead of before the first command.
    pub async fn ensure_host(&self) -> Result<bool, ClientError> {
        let _dispatch = self.dispatch.lock().await;
        self.bootstrap().await
    }

    async fn bootstrap(&self) -> Result<bool, ClientError> {
        let ready = bootstrap::ensure_host(&self.router, &self.timings).await?;
        self.host_confirmed.store(true, Ordering::Release);
        Ok(ready)
    }

    /// Sends a command, bootstrapping the host first when needed and
    /// resending once if the host turned out to be missing.
    async fn request(&self, command: Command) -> Result<Response, ClientError> {
        let _dispatch = self.dispatch.lock().await;
        let window = self.timings.message_timeout();

        if command.is_create_host() {
            return transport::send_once(&self.router, command, window).await;
        }
        if !self.host_confirmed.load(Ordering::Acquire) {
            self.bootstrap().await?;
        }

        log::debug!("Sending {command:?}");
        match transport::send_once(&self.router, command.clone(), window).await {
            Err(err) if err.is_recoverable() => {
                log::warn!("Host was not ready for {command:?}, bootstrapping and retrying once");
                self.host_confirmed.store(false, Ordering::Release);
                self.bootstrap().await?;
                tokio::time::sleep(self.timings.retry_delay()).await;
                transport::send_once(&self.router, command, window).await
            }
            result => result,
        }
    }

    /// Loads a stream and waits until it can play.
    pub async fn load(&self, url: impl Into<String>) -> Result<PlaybackState, ClientError> {
        let response = self.request(Command::Load { url: url.into() }).await?;
        match response.state {
            Some(state) => Ok(state),
            None => Ok(self.mirror.read().await.host_state().clone()),
        }
    }

    pub async fn play(&self) -> Result<(), ClientError> {
        self.request(Command::Play).await.map(drop)
    }

    pub async fn pause(&self) -> Result<(), ClientError> {
        self.request(Command::Pause).await.map(drop)
    }

    /// Moves the playback position, in seconds.
    pub async fn seek(&self, time: f64) -> Result<(), ClientError> {
        self.request(Command::Seek { time }).await.map(drop)
    }

    /// Sets the volume level and remembers it as the user's preference.
    pub async fn set_volume(&self, volume: f64) -> Result<(), ClientError> {
        self.request(Command::SetVolume { volume }).await?;
        if let Err(err) = self.preferences.set_one(keys::VOLUME, volume).await {
            log::warn!("Failed to store volume preference: {err}");
        }
        Ok(())
    }

    pub async fn set_muted(&self, muted: bool) -> Result<(), ClientError> {
        self.request(Command::SetMuted { muted }).await.map(drop)
    }

    /// Fetches the host's snapshot and replaces the mirror with it. An answer
    /// without a snapshot leaves the mirror as it is.
    pub async fn get_state(&self) -> Result<PlaybackState, ClientError> {
        let response = self.request(Command::GetState).await?;
        let mut mirror = self.mirror.write().await;
        match response.state {
            Some(state) => {
                mirror.replace(state.clone());
                Ok(state)
            }
            None => Ok(mirror.host_state().clone()),
        }
    }

    /// Liveness probe.
    pub async fn ping(&self) -> Result<bool, ClientError> {
        let response = self.request(Command::Ping).await?;
        Ok(response.ready.unwrap_or(false))
    }

    /// The mirrored snapshot as displayed.
    pub async fn snapshot(&self) -> PlaybackState {
        self.mirror.read().await.view()
    }

    /// Starts or moves a scrub gesture. Nothing is sent until
    /// [`ControllerClient::finish_scrub`].
    pub async fn scrub_to(&self, position: f64) {
        self.mirror.write().await.scrub_to(position);
    }

    /// Ends the scrub gesture by seeking to its position.
    pub async fn finish_scrub(&self) -> Result<(), ClientError> {
        let position = self.mirror.write().await.finish_scrub();
        match position {
            Some(position) => self.seek(position).await,
            None => Ok(()),
        }
    }

    /// Subscribes to host broadcasts. Snapshots update the mirror; every
    /// event is forwarded to the returned stream.
    pub fn listen(&self) -> ControllerEvents {
        let mut updates = self.router.subscribe();
        let mirror = self.mirror.clone();
        let (tx, rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(async move {
            loop {
                let event = match updates.recv().await {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        log::debug!("Mirror skipped {skipped} host event(s)");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };
                let event = mirror.write().await.apply_event(event);
                if tx.send(event).is_err() {
                    break;
                }
            }
        });

        ControllerEvents { rx, task }
    }
}

/// Stream of [`ControllerEvent`]s. Dropping it stops the listener.
pub struct ControllerEvents {
    rx: mpsc::UnboundedReceiver<ControllerEvent>,
    task: JoinHandle<()>,
}

impl ControllerEvents {
    pub async fn recv(&mut self) -> Option<ControllerEvent> {
        self.rx.recv().await
    }
}

impl Drop for ControllerEvents {
    fn drop(&mut self) {
        self.task.abort();
    }
}
