//! Controller side of the playback protocol.
//!
//! A [`ControllerClient`] makes sure the playback host exists, sends commands
//! to it one at a time with bounded waits, and keeps a local mirror of the
//! host's state up to date from broadcasts. On top of it, the [`session`]
//! module drives continuous listening through the recitation [`catalog`].

mod bootstrap;
pub mod catalog;
mod client;
mod error;
pub mod formatting;
mod mirror;
pub mod session;
mod transport;

pub use crate::client::{ControllerClient, ControllerEvents};
pub use crate::error::ClientError;
pub use crate::mirror::{ControllerEvent, StateMirror};
