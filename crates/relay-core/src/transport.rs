//! HTTP transport seam.
//!
//! Vendor adapters and credential issuers never open sockets themselves;
//! they describe a call as a [`TransportRequest`] and hand it to an injected
//! [`HttpTransport`]. [`ReqwestTransport`] is the production implementation.

use crate::error::RelayError;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use http::Method;
use std::time::Duration;
use tracing::{debug, error};

/// A fully described outbound HTTP call
#[derive(Debug, Clone)]
pub struct TransportRequest {
    /// HTTP method
    pub method: Method,
    /// Absolute URL including query string
    pub url: String,
    /// Request headers
    pub headers: Vec<(String, String)>,
    /// Request body
    pub body: Option<Bytes>,
}

impl TransportRequest {
    /// Create a request without headers or body
    #[must_use]
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// Create a POST request
    #[must_use]
    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    /// Add a header
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set a JSON body and the matching content type
    ///
    /// # Errors
    /// Returns a translation error if the body cannot be serialized
    pub fn json<T: serde::Serialize>(mut self, body: &T) -> Result<Self, RelayError> {
        self.body = Some(Bytes::from(serde_json::to_vec(body)?));
        if self.header_value("content-type").is_none() {
            self.headers
                .push(("Content-Type".to_string(), "application/json".to_string()));
        }
        Ok(self)
    }

    /// Look up a header value (case-insensitive)
    #[must_use]
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Response status plus a lazily read body
pub struct TransportResponse {
    /// HTTP status code
    pub status: u16,
    /// Body byte stream
    pub body: BoxStream<'static, Result<Bytes, RelayError>>,
}

impl TransportResponse {
    /// Response with an in-memory body
    #[must_use]
    pub fn from_bytes(status: u16, body: impl Into<Bytes>) -> Self {
        let body: Bytes = body.into();
        Self {
            status,
            body: stream::once(async move { Ok(body) }).boxed(),
        }
    }

    /// Whether the status is 2xx
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Read the whole body
    ///
    /// # Errors
    /// Returns the first error raised while reading
    pub async fn bytes(mut self) -> Result<Bytes, RelayError> {
        let mut buf = BytesMut::new();
        while let Some(chunk) = self.body.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(buf.freeze())
    }

    /// Read the whole body as (lossy) UTF-8 text
    ///
    /// # Errors
    /// Returns the first error raised while reading
    pub async fn text(self) -> Result<String, RelayError> {
        let bytes = self.bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

impl std::fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportResponse")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

/// Executes HTTP calls on behalf of the relay
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Execute the request and return status plus body.
    ///
    /// Non-2xx statuses are not errors at this layer.
    ///
    /// # Errors
    /// Returns `RelayError::Transport` if no response was received
    async fn execute(&self, request: TransportRequest) -> Result<TransportResponse, RelayError>;
}

/// Transport configuration
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Whole-request timeout
    pub timeout: Duration,
    /// Connect timeout
    pub connect_timeout: Duration,
    /// Idle connections kept per host
    pub pool_max_idle_per_host: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            connect_timeout: Duration::from_secs(10),
            pool_max_idle_per_host: 100,
        }
    }
}

/// [`HttpTransport`] backed by `reqwest`
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Build a transport with its own client
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created
    pub fn new(config: &TransportConfig) -> Result<Self, RelayError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .build()
            .map_err(|e| RelayError::internal(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client })
    }

    /// Wrap an existing client
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: TransportRequest) -> Result<TransportResponse, RelayError> {
        debug!(method = %request.method, "Executing upstream request");

        let mut builder = self.client.request(request.method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|e| {
            error!(error = %e, "Upstream request failed");
            RelayError::transport(format!("Request failed: {e}"))
        })?;

        let status = response.status().as_u16();
        let body = response
            .bytes_stream()
            .map(|chunk| {
                chunk.map_err(|e| RelayError::transport(format!("Failed to read response: {e}")))
            })
            .boxed();

        Ok(TransportResponse { status, body })
    }
}
