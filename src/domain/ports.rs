use crate::error::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;

/// Network address of an acquirer host.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// One request/response exchange of framed bytes with a single host.
///
/// Implementations must work against a freshly opened connection for every
/// call and return the complete response frame, unvalidated. Failures must
/// distinguish connection refusal and connect-stage timeouts (nothing was
/// written) from response-stage timeouts and dropped connections.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn exchange(&self, endpoint: &Endpoint, frame: &[u8]) -> Result<Vec<u8>>;
}

pub type TransportBox = Box<dyn Transport>;
