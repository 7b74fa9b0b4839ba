//! Host context and message dispatching utilities.
//!
//! The context contains the shared state and provides helpers for publishing
//! state snapshots and notifications to every subscribed controller.

use std::sync::Arc;

use tilawa_audio::{EventSink, ResourceFactory};
use tilawa_bridge::config::TimingConfig;
use tilawa_bridge::preferences::PreferenceStore;
use tilawa_bridge::{Command, Envelope, ErrorCode, HostEvent, MessageRouter, Response};
use tokio::sync::mpsc::Receiver;
use tokio::sync::watch;

use crate::services;
use crate::state::SharedState;

/// Shared host context passed to services and message handlers.
pub(crate) struct HostContext {
    /// Playback state and the audio resource it describes.
    pub state: SharedState,
    /// Router used to broadcast events to controllers.
    pub router: MessageRouter,
    /// Creates the audio resource on first use.
    pub factory: Arc<dyn ResourceFactory>,
    /// Sink handed to the resource for its asynchronous events.
    pub resource_events: EventSink,
    pub preferences: PreferenceStore,
    pub timings: TimingConfig,
    /// Set once the supervisor reclaims this context.
    pub retired: watch::Sender<bool>,
}

impl HostContext {
    /// Read and dispatch commands, one at a time, until the endpoint closes.
    pub async fn consume_bridge_messages(self: &Arc<Self>, mut rx: Receiver<Envelope>) {
        self.router.broadcast(HostEvent::Ready);
        while let Some(envelope) = rx.recv().await {
            log::debug!("Got a controller message: {:?}", envelope.command);
            self.dispatch_message(envelope).await;
        }
        log::info!("Host endpoint closed, command loop finished");
    }

    /// Dispatches the received command down to individual service handlers.
    async fn dispatch_message(self: &Arc<Self>, envelope: Envelope) {
        match envelope.command.clone() {
            Command::Load { url } => {
                services::playback_service::handle_load(self.clone(), url, envelope).await;
            }
            Command::Play => {
                services::playback_service::handle_play(self.clone(), envelope).await;
            }
            Command::Pause => {
                services::playback_service::handle_pause(self.clone(), envelope).await;
            }
            Command::Seek { time } => {
                services::playback_service::handle_seek(self.clone(), time, envelope).await;
            }
            Command::SetVolume { volume } => {
                services::volume_service::handle_set_volume(self.clone(), volume, envelope).await;
            }
            Command::SetMuted { muted } => {
                services::volume_service::handle_set_muted(self.clone(), muted, envelope).await;
            }
            Command::GetState => {
                services::status_service::handle_get_state(self.clone(), envelope).await;
            }
            Command::Ping => services::status_service::handle_ping(envelope),
            Command::CreateHost => envelope.respond(Response::failure(
                ErrorCode::UnsupportedCommand,
                "host creation is handled by the supervisor",
            )),
        }
    }

    /// Marks the context as reclaimed. A retired context never publishes
    /// again, and its pending loads are abandoned.
    pub fn retire(&self) {
        self.retired.send_replace(true);
    }

    pub fn is_retired(&self) -> bool {
        *self.retired.borrow()
    }

    /// Resolves once the context is retired.
    pub async fn wait_retired(&self) {
        let mut retired = self.retired.subscribe();
        let _ = retired.wait_for(|retired| *retired).await;
    }

    /// Broadcasts the current state snapshot.
    ///
    /// Always reflects the current truth, so publishing twice is harmless.
    pub async fn publish_state(&self) {
        if self.is_retired() {
            return;
        }
        let state = self.state.read().await.playback.clone();
        self.router.broadcast(HostEvent::StateUpdate { state });
    }

    /// Broadcasts a notification that is not a state snapshot.
    pub fn notify(&self, event: HostEvent) {
        if self.is_retired() {
            return;
        }
        self.router.broadcast(event);
    }
}
