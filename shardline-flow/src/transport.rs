//! HTTP transport abstraction.
//!
//! The dispatcher only needs "send this request, give me the response".
//! Production code uses [`ReqwestTransport`]; tests plug in scripted
//! transports that record send times and return canned responses.

use std::time::Duration;

use async_trait::async_trait;
use http::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};

use crate::error::TransportFailure;
use crate::request::{Request, Response};

/// Default API base URL.
pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";

/// Sends a single request and returns whatever the remote answered.
///
/// Implementations must not retry or rate limit; the dispatcher does both.
/// Any HTTP status, including 429 and 5xx, is a successful `send`.
#[async_trait]
pub trait HttpTransport: Send + Sync + 'static {
    /// Sends `request`.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportFailure`] if no response was received.
    async fn send(&self, request: &Request) -> Result<Response, TransportFailure>;
}

/// HTTP transport backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    base_url: String,
    authorization: Option<HeaderValue>,
}

impl ReqwestTransport {
    /// Creates a transport for `base_url`, authorizing with a bot token.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is not a valid header value or the
    /// client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        token: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, TransportFailure> {
        let authorization = token
            .map(|t| HeaderValue::from_str(&format!("Bot {t}")))
            .transpose()
            .map_err(|e| TransportFailure::new(format!("invalid token: {e}")))?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportFailure::new(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            authorization,
        })
    }

    /// Returns the base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: &Request) -> Result<Response, TransportFailure> {
        let url = format!("{}{}", self.base_url, request.path);

        let mut builder = self
            .client
            .request(request.method.clone(), url)
            .headers(request.headers.clone())
            .header(
                USER_AGENT,
                concat!("shardline (", env!("CARGO_PKG_VERSION"), ")"),
            );
        if let Some(auth) = &self.authorization {
            builder = builder.header(AUTHORIZATION, auth.clone());
        }
        if let Some(body) = &request.body {
            builder = builder
                .header(CONTENT_TYPE, "application/json")
                .body(body.clone());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TransportFailure::new(e.to_string()))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportFailure::new(e.to_string()))?;

        Ok(Response::new(status, headers, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let transport =
            ReqwestTransport::new("https://example.test/api/", None, Duration::from_secs(5))
                .unwrap();
        assert_eq!(transport.base_url(), "https://example.test/api");
    }

    #[test]
    fn test_invalid_token_rejected() {
        let result = ReqwestTransport::new(DEFAULT_API_BASE, Some("bad\ntoken"), Duration::from_secs(5));
        assert!(result.is_err());
    }
}
