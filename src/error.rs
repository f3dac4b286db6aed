use std::fmt;
use thiserror::Error;

/// Point of the exchange at which a transport timeout fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoStage {
    /// Connection was never established; nothing was written.
    Connect,
    /// The request was written and the host did not answer in time.
    Response,
}

impl fmt::Display for IoStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IoStage::Connect => f.write_str("connect"),
            IoStage::Response => f.write_str("response"),
        }
    }
}

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Framing error: {0}")]
    Framing(String),
    #[error("Checksum mismatch: expected {expected:#04x}, received {actual:#04x}")]
    Checksum { expected: u8, actual: u8 },
    #[error("Decryption error: {0}")]
    Decryption(String),
    #[error("Network error talking to {endpoint}: {reason}")]
    Network { endpoint: String, reason: String },
    #[error("Timed out at {stage} stage talking to {endpoint}")]
    Timeout { endpoint: String, stage: IoStage },
    #[error("Connection refused by {endpoint}: {source}")]
    ConnectionRefused {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Batch close in progress; retry once the close completes")]
    BatchInProgress,
    #[error("{0} transactions still awaiting a host response; retry the close once they complete")]
    TransactionsInFlight(u32),
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
    #[error("Encoding error: {0}")]
    Encoding(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl GatewayError {
    /// Whether the whole send may be repeated without risking a duplicate
    /// financial transaction at the host.
    pub fn is_retryable(&self) -> bool {
        match self {
            GatewayError::Checksum { .. }
            | GatewayError::ConnectionRefused { .. }
            | GatewayError::TransactionsInFlight(_) => true,
            GatewayError::Timeout { stage, .. } => *stage == IoStage::Connect,
            _ => false,
        }
    }

    /// Whether the host may have processed the request despite the failure.
    pub fn is_ambiguous(&self) -> bool {
        matches!(
            self,
            GatewayError::Network { .. }
                | GatewayError::Timeout {
                    stage: IoStage::Response,
                    ..
                }
        )
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;
