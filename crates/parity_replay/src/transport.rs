//! HTTP transport seam.
//!
//! The orchestrator only needs "send this request, give me status, headers
//! and at most N body bytes". [`ReqwestTransport`] does that over the
//! network; tests substitute a scripted implementation.

use async_trait::async_trait;
use indexmap::IndexMap;
use parity_core::{Backend, Origins, RequestDescriptor};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Transport errors
#[derive(Debug, Error)]
pub enum TransportError {
    /// Request could not be built
    #[error("Invalid request {url}: {reason}")]
    InvalidRequest {
        /// Target URL
        url: String,
        /// Why
        reason: String,
    },
    /// No response within the timeout
    #[error("Timed out: {url}")]
    Timeout {
        /// Target URL
        url: String,
    },
    /// Connection or protocol failure
    #[error("Request to {url} failed: {reason}")]
    Failed {
        /// Target URL
        url: String,
        /// Why
        reason: String,
    },
    /// Client construction failed
    #[error("HTTP client setup failed: {0}")]
    Client(String),
}

/// The request actually put on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRequest {
    /// Backend addressed
    pub backend: Backend,
    /// Resolved descriptor; its URI is the absolute target
    pub descriptor: RequestDescriptor,
}

impl OutboundRequest {
    /// Resolve a captured descriptor for one backend
    #[must_use]
    pub fn for_backend(descriptor: &RequestDescriptor, origins: &Origins, backend: Backend) -> Self {
        Self {
            backend,
            descriptor: descriptor.with_uri(origins.resolve(descriptor.uri(), backend)),
        }
    }

    /// Target URL
    #[must_use]
    pub fn url(&self) -> &str {
        self.descriptor.uri()
    }

    /// Unredacted curl command that reproduces this request
    #[must_use]
    pub fn to_curl(&self) -> String {
        self.descriptor.to_curl(false)
    }
}

/// Status, headers and capped body of a response
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TransportResponse {
    /// HTTP status
    pub status: u16,
    /// Lowercased names; repeated values joined by `, `
    pub headers: IndexMap<String, String>,
    /// Body prefix
    pub body: Vec<u8>,
    /// Whether more body bytes were available than kept
    pub truncated: bool,
}

impl TransportResponse {
    /// Add a header, merging repeats
    pub fn push_header(&mut self, name: &str, value: &str) {
        let name = name.to_ascii_lowercase();
        match self.headers.get_mut(&name) {
            Some(existing) => {
                existing.push_str(", ");
                existing.push_str(value);
            }
            None => {
                self.headers.insert(name, value.to_string());
            }
        }
    }

    /// Append body bytes up to `cap`; returns false once the cap is hit
    pub fn push_body(&mut self, chunk: &[u8], cap: usize) -> bool {
        let room = cap.saturating_sub(self.body.len());
        if chunk.len() > room {
            self.body.extend_from_slice(&chunk[..room]);
            self.truncated = true;
            return false;
        }
        self.body.extend_from_slice(chunk);
        true
    }
}

/// Sends one request to one backend
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send `request`, keeping at most `body_cap` body bytes
    ///
    /// # Errors
    ///
    /// Returns error if no response could be obtained
    async fn send(
        &self,
        request: &OutboundRequest,
        body_cap: usize,
    ) -> Result<TransportResponse, TransportError>;
}

/// Transport configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Whole-request timeout in seconds
    pub timeout_secs: u64,
    /// Redirects followed before giving up
    pub max_redirects: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            max_redirects: 10,
        }
    }
}

/// Network transport backed by `reqwest`
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Build a client
    ///
    /// # Errors
    ///
    /// Returns error if the TLS backend cannot be initialised
    pub fn new(config: &TransportConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()
            .map_err(|e| TransportError::Client(e.to_string()))?;
        Ok(Self { client })
    }

    fn classify(url: &str, err: &reqwest::Error) -> TransportError {
        if err.is_timeout() {
            TransportError::Timeout {
                url: url.to_string(),
            }
        } else if err.is_builder() {
            TransportError::InvalidRequest {
                url: url.to_string(),
                reason: err.to_string(),
            }
        } else {
            TransportError::Failed {
                url: url.to_string(),
                reason: err.to_string(),
            }
        }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(
        &self,
        request: &OutboundRequest,
        body_cap: usize,
    ) -> Result<TransportResponse, TransportError> {
        let url = request.url();
        let descriptor = &request.descriptor;
        let method = reqwest::Method::from_bytes(descriptor.method().as_bytes()).map_err(|e| {
            TransportError::InvalidRequest {
                url: url.to_string(),
                reason: e.to_string(),
            }
        })?;

        let mut builder = self.client.request(method, url);
        if let Some(auth) = descriptor.auth() {
            builder = builder.header(reqwest::header::AUTHORIZATION, auth);
        }
        if let Some(accept) = descriptor.accept() {
            builder = builder.header(reqwest::header::ACCEPT, accept);
        }

        let mut response = builder
            .send()
            .await
            .map_err(|e| Self::classify(url, &e))?;

        let mut out = TransportResponse {
            status: response.status().as_u16(),
            ..TransportResponse::default()
        };
        for (name, value) in response.headers() {
            out.push_header(name.as_str(), &String::from_utf8_lossy(value.as_bytes()));
        }

        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| Self::classify(url, &e))?
        {
            if !out.push_body(&chunk, body_cap) {
                debug!(%url, body_cap, "response body truncated");
                break;
            }
        }
        Ok(out)
    }
}
