//! Shardline - a sharded gateway client runtime.
//!
//! The [`Client`] ties the workspace crates together:
//!
//! ```text
//!                 ┌──────────────────────────────────────────┐
//!   gateway ◀────▶│ ShardManager ─ ShardSession × N          │
//!   (WebSocket)   │        │ decode                           │
//!                 │        ▼                                  │
//!                 │  EntityCache ◀── apply ── CachePatch      │
//!                 │        │                                  │
//!                 │        ▼ publish                          │
//!                 │  EventRegistry ──▶ listeners              │
//!                 │                                           │
//!   REST API ◀────│ Dispatcher ─ route buckets ─ global bucket│
//!                 └──────────────────────────────────────────┘
//! ```
//!
//! Configuration is read from TOML with [`ClientConfig::from_file`]; the
//! `shardline` binary adds command-line overrides and log setup.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod client;
pub mod config;
pub mod error;

pub use client::Client;
pub use config::{CacheSection, ClientConfig, GatewaySection, HttpSection};
pub use error::{ClientError, ClientResult};

pub use shardline_cache as cache;
pub use shardline_core as core;
pub use shardline_events as events;
pub use shardline_flow as flow;
pub use shardline_gateway as gateway;
