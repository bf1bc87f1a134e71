//! reqwest-backed transport for the vendor cloud API

use crate::transport::traits::{
    HeaderObserver, HttpRequest, HttpResponse, HttpTransport, TransportError,
};
use async_trait::async_trait;
use bytes::BytesMut;
use powerlink_shared::protocol;
use tracing::debug;

/// HTTP transport built on a shared reqwest client
///
/// No cookie store is kept: the session cookie is captured and replayed by
/// the service itself.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .user_agent(protocol::USER_AGENT)
            .no_proxy()
            .build()
            .map_err(|e| TransportError::Request(e.to_string()))?;
        Ok(Self::with_client(client))
    }

    /// Wrap a preconfigured client; per-request timeouts still apply
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn map_error(err: reqwest::Error, request: &HttpRequest) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(request.timeout)
    } else if err.is_connect() {
        TransportError::Connect(err.to_string())
    } else {
        TransportError::Request(err.to_string())
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn perform(
        &self,
        request: &HttpRequest,
        observer: Option<&mut dyn HeaderObserver>,
    ) -> Result<HttpResponse, TransportError> {
        let mut builder = self
            .client
            .post(&request.url)
            .timeout(request.timeout)
            .body(request.body.clone());
        for (name, value) in &request.headers {
            builder = builder.header(*name, value.as_str());
        }

        let mut response = builder.send().await.map_err(|e| map_error(e, request))?;
        let status = response.status().as_u16();
        debug!("{} -> HTTP {}", request.url, status);

        if let Some(observer) = observer {
            for (name, value) in response.headers() {
                if let Ok(value) = value.to_str() {
                    observer.on_header(name.as_str(), value);
                }
            }
        }

        let mut body = BytesMut::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| map_error(e, request))? {
            let room = protocol::MAX_RESPONSE_BYTES - body.len();
            body.extend_from_slice(&chunk[..chunk.len().min(room)]);
            if body.len() >= protocol::MAX_RESPONSE_BYTES {
                debug!("response body truncated at {} bytes", body.len());
                break;
            }
        }

        Ok(HttpResponse {
            status,
            body: body.freeze(),
        })
    }

    fn name(&self) -> &'static str {
        "reqwest"
    }
}
