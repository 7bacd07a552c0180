//! Shardline Tests - integration tests across the shardline crates.
//!
//! ## Test Organization
//!
//! **Integration Tests** (`*_tests.rs`):
//! - `session_tests`: shard session protocol against a scripted gateway
//! - `cache_tests`: event pipeline into the cache, ordering and concurrency
//! - `dispatcher_tests`: REST rate limiting through the client
//! - `client_tests`: the client facade end to end
//!
//! **Support Modules**:
//! - `properties`: cache model and checker, with property-based tests
//! - `scripted_gateway`: in-memory `GatewayTransport` driven by the test
//! - `scripted_http`: in-memory `HttpTransport` with canned responses
//! - `scenarios`: gateway payload builders and ready-made configurations
//!
//! ## Naming Conventions
//!
//! - Integration tests: `test_<component>_<scenario>`
//! - Unit tests: inline in each crate under `#[cfg(test)]`

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod properties;
pub mod scenarios;
pub mod scripted_gateway;
pub mod scripted_http;

#[cfg(test)]
mod cache_tests;
