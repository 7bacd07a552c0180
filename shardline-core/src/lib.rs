//! Shardline Core - Identifiers shared by every shardline crate.
//!
//! Every remote entity is keyed by a 64-bit, time-ordered [`Snowflake`].
//! Typed wrappers ([`GuildId`], [`ChannelId`], ...) sit on top of it so a
//! guild id can never be passed where a user id is expected.
//!
//! # Design Principles
//!
//! - **Strongly-typed IDs**: Prevent mixing up `GuildId` with `UserId`
//! - **Pure codec**: Parsing and formatting have no shared state
//! - **No unsafe code**

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod ids;
mod snowflake;

pub use error::{CoreError, CoreResult};
pub use ids::{ApplicationId, ChannelId, GuildId, MessageId, RoleId, UserId};
pub use snowflake::{Snowflake, SNOWFLAKE_EPOCH_MS};
