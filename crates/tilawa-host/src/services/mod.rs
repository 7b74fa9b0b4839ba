//! Host service handlers for controller-driven commands.
//!
//! This module groups async command handlers that operate on the shared
//! `HostContext`, mutate the playback state, drive the audio resource and
//! publish the resulting snapshot back to controllers.

pub mod playback_service;
pub mod resource_service;
pub mod status_service;
pub mod volume_service;

/// Represents a type that is used in all handlers as a host context.
pub(crate) type HostContextHandle = std::sync::Arc<crate::app::HostContext>;
