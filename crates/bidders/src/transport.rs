//! Transport seam for server round-trip bidders.
//!
//! The SDK's networking stack lives outside this crate; bidders only see
//! this trait. [`CannedTransport`] answers from memory after a fixed
//! latency, for local runs and tests.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Option<String>,
}

impl TransportResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: Some(body.into()),
        }
    }

    pub fn no_content() -> Self {
        Self {
            status: 204,
            body: None,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("request timed out")]
    TimedOut,

    #[error("{0}")]
    Other(String),
}

#[async_trait]
pub trait BidTransport: Send + Sync {
    async fn post(&self, url: &str, body: String) -> Result<TransportResponse, TransportError>;
}

/// Replies with a fixed result after a fixed delay.
#[derive(Debug, Clone)]
pub struct CannedTransport {
    reply: Result<TransportResponse, TransportError>,
    latency: Duration,
}

impl CannedTransport {
    pub fn new(reply: Result<TransportResponse, TransportError>, latency: Duration) -> Self {
        Self { reply, latency }
    }

    pub fn ok(body: impl Into<String>, latency: Duration) -> Self {
        Self::new(Ok(TransportResponse::ok(body)), latency)
    }
}

#[async_trait]
impl BidTransport for CannedTransport {
    async fn post(&self, _url: &str, _body: String) -> Result<TransportResponse, TransportError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.reply.clone()
    }
}
