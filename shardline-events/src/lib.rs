//! Shardline Events - turning gateway dispatches into typed events.
//!
//! Two halves:
//!
//! - [`decode`] is a pure function from a dispatch frame to an [`Event`] plus
//!   the [`CachePatch`](shardline_cache::CachePatch) the event implies.
//! - [`EventRegistry`] fans events out to listeners. Each listener has a
//!   kind filter and an optional predicate; a failing or panicking listener
//!   is logged and does not disturb the others.
//!
//! The shard session runs decode, cache apply and publish inline, so events
//! from one shard reach listeners in the order the frames arrived.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod decode;
mod error;
mod event;
mod registry;

pub use decode::{decode, decode_channel, decode_member, decode_user, Decoded, DispatchFrame};
pub use error::{DecodeError, DecodeResult, ListenerError, WaitError};
pub use event::{Envelope, Event, EventKind, Message, Ready};
pub use registry::{EventFilter, EventRegistry, EventStream, Listener, ListenerId};
