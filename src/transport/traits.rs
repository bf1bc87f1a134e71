//! Transport trait abstraction for pluggable HTTP backends

use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by a transport before a complete response was read
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request failed: {0}")]
    Request(String),
}

/// A form POST to the vendor API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub headers: Vec<(&'static str, String)>,
    pub body: String,
    pub timeout: Duration,
}

impl HttpRequest {
    pub fn post(url: impl Into<String>, body: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
            body: body.into(),
            timeout,
        }
    }

    pub fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    /// First value of a header, name compared case-insensitively
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Status and (bounded) body of a completed exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Bytes,
}

/// Receives response headers as soon as the response head arrives,
/// before any of the body is read
pub trait HeaderObserver: Send {
    fn on_header(&mut self, name: &str, value: &str);
}

/// An HTTP client able to perform vendor API requests
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Perform a request, feeding response headers to `observer` while the
    /// response streams in
    async fn perform(
        &self,
        request: &HttpRequest,
        observer: Option<&mut dyn HeaderObserver>,
    ) -> Result<HttpResponse, TransportError>;

    /// Human-readable name for this transport
    fn name(&self) -> &'static str;
}
