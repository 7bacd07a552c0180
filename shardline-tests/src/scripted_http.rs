//! Scripted HTTP transport.
//!
//! Responses are queued per path. A path with nothing queued answers
//! `200 OK` with an empty body. Every request is recorded with the (possibly
//! paused) time it was sent.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, HeaderValue, Method, StatusCode};
use serde_json::Value;
use shardline_flow::{HttpTransport, Request, Response, TransportFailure};
use tokio::time::Instant;

/// A request as seen by the scripted transport.
#[derive(Debug, Clone)]
pub struct SentRequest {
    /// When it was sent.
    pub at: Instant,
    /// Method.
    pub method: Method,
    /// Path.
    pub path: String,
}

type Scripted = Result<Response, TransportFailure>;

/// An HTTP transport answering from per-path queues.
#[derive(Default)]
pub struct ScriptedHttp {
    script: Mutex<HashMap<String, VecDeque<Scripted>>>,
    sent: Mutex<Vec<SentRequest>>,
}

impl ScriptedHttp {
    /// Creates a transport with nothing queued.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queues a response for `path`.
    pub fn respond(&self, path: &str, response: Response) {
        self.queue(path, Ok(response));
    }

    /// Queues a transport failure for `path`.
    pub fn fail(&self, path: &str, message: &str) {
        self.queue(path, Err(TransportFailure::new(message)));
    }

    fn queue(&self, path: &str, outcome: Scripted) {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(path.to_string())
            .or_default()
            .push_back(outcome);
    }

    /// Every request sent so far.
    #[must_use]
    pub fn sent(&self) -> Vec<SentRequest> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Requests sent to `path`.
    #[must_use]
    pub fn sent_to(&self, path: &str) -> Vec<SentRequest> {
        self.sent()
            .into_iter()
            .filter(|r| r.path == path)
            .collect()
    }
}

#[async_trait]
impl HttpTransport for ScriptedHttp {
    async fn send(&self, request: &Request) -> Result<Response, TransportFailure> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(SentRequest {
                at: Instant::now(),
                method: request.method.clone(),
                path: request.path.clone(),
            });
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(&request.path)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Ok(status(StatusCode::OK)))
    }
}

/// A response with `code` and no body.
#[must_use]
pub fn status(code: StatusCode) -> Response {
    Response::new(code, HeaderMap::new(), Bytes::new())
}

/// A `200 OK` response with a JSON body.
#[must_use]
pub fn json(body: &Value) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert("content-type", HeaderValue::from_static("application/json"));
    Response::new(StatusCode::OK, headers, Bytes::from(body.to_string()))
}

/// A `429` response with `retry-after` in seconds.
#[must_use]
pub fn throttled(retry_after: &'static str, global: bool) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert("retry-after", HeaderValue::from_static(retry_after));
    if global {
        headers.insert("x-ratelimit-global", HeaderValue::from_static("true"));
    }
    Response::new(StatusCode::TOO_MANY_REQUESTS, headers, Bytes::new())
}

/// A `200 OK` response carrying rate-limit headers.
#[must_use]
pub fn with_limits(limit: u32, remaining: u32, reset_after: &str) -> Response {
    let mut headers = HeaderMap::new();
    if let Ok(v) = HeaderValue::from_str(&limit.to_string()) {
        headers.insert("x-ratelimit-limit", v);
    }
    if let Ok(v) = HeaderValue::from_str(&remaining.to_string()) {
        headers.insert("x-ratelimit-remaining", v);
    }
    if let Ok(v) = HeaderValue::from_str(reset_after) {
        headers.insert("x-ratelimit-reset-after", v);
    }
    Response::new(StatusCode::OK, headers, Bytes::new())
}
