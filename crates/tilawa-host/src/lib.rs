//! Playback host runtime and its lifecycle supervisor.
//!
//! This crate owns the single audio resource, routes controller commands to
//! services, and manages the shared playback state used by asynchronous
//! tasks. The host context is only ever created through the [`Supervisor`].

mod app;
mod runtime;
mod services;
mod state;
mod supervisor;

pub use crate::supervisor::{HOST_JUSTIFICATION, HostStatus, Supervisor, SupervisorError};
