//! Rate-limited request dispatching for shardline.
//!
//! Every outbound REST call passes through a [`Dispatcher`], which enforces:
//!
//! - **Per-route buckets**: each route group has its own window of requests,
//!   served by a dedicated worker task in FIFO order.
//! - **A global bucket**: a single window every request must also pass.
//! - **Throttle handling**: a "too many requests" response zeroes the bucket
//!   until `now + retry_after` and requeues the request at the head.
//! - **Bounded retries**: transient failures back off exponentially up to an
//!   attempt ceiling.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          Dispatcher                              │
//! │                                                                  │
//! │  execute(group) ──▶ ┌──────────────┐   ┌──────────────┐          │
//! │                     │ bucket worker│──▶│ global window│──▶ HTTP  │
//! │  execute(group) ──▶ │  (FIFO queue)│   │   limiter    │          │
//! │                     └──────────────┘   └──────────────┘          │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Time
//!
//! Windows are tracked with [`tokio::time::Instant`], so tests drive them
//! with a paused clock instead of real sleeps.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod headers;
pub mod limiter;
pub mod request;
pub mod route;
pub mod transport;
pub mod window;

pub use config::{ConfigError, DispatcherConfig};
pub use dispatcher::Dispatcher;
pub use error::{DispatchError, DispatchResult, TransportFailure};
pub use headers::RateLimitHeaders;
pub use limiter::WindowLimiter;
pub use request::{Request, Response};
pub use route::Route;
pub use transport::{HttpTransport, ReqwestTransport};
pub use window::WindowBucket;
