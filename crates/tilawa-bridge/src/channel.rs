//! Targeted request/response delivery plus a state broadcast.
//!
//! The router connects execution contexts that come and go independently. A
//! receiver registers a bounded [`tokio::sync::mpsc`] sender for its
//! [`Target`]; requests are wrapped in an [`Envelope`] with a
//! [`tokio::sync::oneshot`] reply slot. Host events fan out through a
//! [`tokio::sync::broadcast`] channel that any number of controllers may
//! subscribe to.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{RwLock, broadcast, mpsc, oneshot};

use crate::{Command, HostEvent, Response};

/// Default capacity of the broadcast channel, in events.
pub const BROADCAST_CAPACITY: usize = 64;

/// Addressable receivers on the router.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// The playback host context.
    Host,
    /// The lifecycle supervisor.
    Supervisor,
}

/// Errors reported by the router itself, before any handler answered.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    /// The router was shut down, no messaging is possible at all.
    #[error("messaging is not available")]
    Unavailable,
    /// Nothing is registered for the target.
    #[error("could not establish connection, receiving end does not exist")]
    NoReceiver,
    /// The receiver dropped the request without answering.
    #[error("the message port closed before a response was received")]
    PortClosed,
}

/// A request in flight together with its reply slot.
///
/// Replying with `None` acknowledges the request without a payload; dropping
/// the envelope without replying closes the port.
#[derive(Debug)]
pub struct Envelope {
    pub command: Command,
    pub reply: oneshot::Sender<Option<Response>>,
}

impl Envelope {
    /// Sends the answer back to the requester. A requester that stopped
    /// waiting is not an error.
    pub fn respond(self, response: Response) {
        let _ = self.reply.send(Some(response));
    }

    /// Acknowledges the request without a payload.
    pub fn acknowledge(self) {
        let _ = self.reply.send(None);
    }
}

struct RouterInner {
    closed: AtomicBool,
    host: RwLock<Option<mpsc::Sender<Envelope>>>,
    supervisor: RwLock<Option<mpsc::Sender<Envelope>>>,
    events: broadcast::Sender<HostEvent>,
}

/// Cheaply cloneable handle to the shared message router.
#[derive(Clone)]
pub struct MessageRouter {
    inner: Arc<RouterInner>,
}

impl std::fmt::Debug for MessageRouter {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("MessageRouter")
            .field("closed", &self.inner.closed.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

impl Default for MessageRouter {
    fn default() -> Self {
        Self::new(BROADCAST_CAPACITY)
    }
}

impl MessageRouter {
    /// Creates a router whose broadcast channel buffers `capacity` events per
    /// subscriber.
    pub fn new(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity);
        Self {
            inner: Arc::new(RouterInner {
                closed: AtomicBool::new(false),
                host: RwLock::new(None),
                supervisor: RwLock::new(None),
                events,
            }),
        }
    }

    fn endpoint(&self, target: Target) -> &RwLock<Option<mpsc::Sender<Envelope>>> {
        match target {
            Target::Host => &self.inner.host,
            Target::Supervisor => &self.inner.supervisor,
        }
    }

    fn ensure_open(&self) -> Result<(), ChannelError> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(ChannelError::Unavailable);
        }
        Ok(())
    }

    /// Registers the receiving end for `target`, replacing any previous one.
    pub async fn register(
        &self,
        target: Target,
        sender: mpsc::Sender<Envelope>,
    ) -> Result<(), ChannelError> {
        self.ensure_open()?;
        *self.endpoint(target).write().await = Some(sender);
        log::debug!("Registered {target:?} endpoint");
        Ok(())
    }

    /// Removes the receiving end for `target`. Pending requests that were
    /// already queued still reach the old receiver.
    pub async fn unregister(&self, target: Target) {
        if self.endpoint(target).write().await.take().is_some() {
            log::debug!("Unregistered {target:?} endpoint");
        }
    }

    /// Shorthand for [`MessageRouter::register`] with [`Target::Host`].
    pub async fn register_host(&self, sender: mpsc::Sender<Envelope>) -> Result<(), ChannelError> {
        self.register(Target::Host, sender).await
    }

    pub async fn unregister_host(&self) {
        self.unregister(Target::Host).await
    }

    /// Shorthand for [`MessageRouter::register`] with [`Target::Supervisor`].
    pub async fn register_supervisor(
        &self,
        sender: mpsc::Sender<Envelope>,
    ) -> Result<(), ChannelError> {
        self.register(Target::Supervisor, sender).await
    }

    /// Whether a live host context is registered.
    pub async fn host_exists(&self) -> bool {
        match self.inner.host.read().await.as_ref() {
            Some(sender) => !sender.is_closed(),
            None => false,
        }
    }

    /// Delivers `command` to its target and waits for the answer.
    ///
    /// `Ok(None)` means the receiver acknowledged without a payload. This call
    /// has no timeout of its own; callers bound it.
    pub async fn send(
        &self,
        target: Target,
        command: Command,
    ) -> Result<Option<Response>, ChannelError> {
        self.ensure_open()?;
        let sender = self
            .endpoint(target)
            .read()
            .await
            .clone()
            .ok_or(ChannelError::NoReceiver)?;

        let (reply, answer) = oneshot::channel();
        sender
            .send(Envelope { command, reply })
            .await
            .map_err(|_| ChannelError::NoReceiver)?;

        answer.await.map_err(|_| ChannelError::PortClosed)
    }

    /// Subscribes to host events. Events published before this call are not
    /// replayed.
    pub fn subscribe(&self) -> broadcast::Receiver<HostEvent> {
        self.inner.events.subscribe()
    }

    /// Publishes an event to all current subscribers. Having none is fine.
    pub fn broadcast(&self, event: HostEvent) {
        if self.inner.closed.load(Ordering::Acquire) {
            return;
        }
        let _ = self.inner.events.send(event);
    }

    /// Shuts messaging down for good and drops every registered endpoint.
    pub async fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        self.inner.host.write().await.take();
        self.inner.supervisor.write().await.take();
        log::info!("Message router closed");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}
