//! Host runtime setup and orchestration.
//!
//! This module wires together the persisted volume, shared state, and the
//! three tasks that make up a running host context: the command loop, the
//! resource event pump and the progress heartbeat.

use std::sync::Arc;

use tilawa_audio::{ResourceEvent, ResourceFactory};
use tilawa_bridge::config::TimingConfig;
use tilawa_bridge::preferences::{PreferenceStore, keys};
use tilawa_bridge::{ChannelError, MessageRouter};
use tokio::sync::{RwLock, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::app::HostContext;
use crate::services;
use crate::state::State;

/// Capacity of the host's command queue.
const COMMAND_QUEUE: usize = 64;

/// Running host context. Dropping it does not stop the host; call
/// [`HostHandle::shutdown`].
pub(crate) struct HostHandle {
    context: Arc<HostContext>,
    tasks: Vec<JoinHandle<()>>,
}

impl HostHandle {
    /// Whether the command loop is still running.
    pub fn is_running(&self) -> bool {
        self.tasks.first().is_some_and(|task| !task.is_finished())
    }

    /// Retires the context and stops its tasks. Load waits spawned by the
    /// command loop notice the retirement and finish on their own.
    pub fn shutdown(self) {
        self.context.retire();
        for task in self.tasks {
            task.abort();
        }
    }
}

/// Initialize host state, register the host endpoint and start its tasks.
pub(crate) async fn spawn_host(
    router: MessageRouter,
    factory: Arc<dyn ResourceFactory>,
    preferences: PreferenceStore,
    timings: TimingConfig,
) -> Result<HostHandle, ChannelError> {
    let volume = preferences.get_f64(keys::VOLUME).await.unwrap_or(1.0);
    log::debug!("Starting host with volume {volume}");

    let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE);
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (retired, _) = watch::channel(false);

    let context = Arc::new(HostContext {
        state: Arc::new(RwLock::new(State::new(volume))),
        router: router.clone(),
        factory,
        resource_events: event_tx,
        preferences,
        timings,
        retired,
    });

    router.register_host(command_tx).await?;

    let command_loop = {
        let context = context.clone();
        tokio::spawn(async move { context.consume_bridge_messages(command_rx).await })
    };
    let pump = tokio::spawn(pump_resource_events(context.clone(), event_rx));
    let heartbeat = tokio::spawn(run_heartbeat(context.clone()));

    Ok(HostHandle {
        context,
        tasks: vec![command_loop, pump, heartbeat],
    })
}

/// Applies resource events in the order the resource emitted them.
async fn pump_resource_events(
    context: Arc<HostContext>,
    mut events: mpsc::UnboundedReceiver<ResourceEvent>,
) {
    while let Some(event) = events.recv().await {
        services::resource_service::handle_resource_event(context.clone(), event).await;
    }
}

/// Publishes a snapshot every heartbeat while playing, so controllers that
/// missed an update converge within one interval.
async fn run_heartbeat(context: Arc<HostContext>) {
    let mut interval = tokio::time::interval(context.timings.heartbeat());
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        let playing = {
            let mut state = context.state.write().await;
            if state.playback.is_playing {
                state.sync_position();
            }
            state.playback.is_playing
        };
        if playing {
            context.publish_state().await;
        }
    }
}
