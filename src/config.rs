use crate::domain::acceptor::AcceptorConfig;
use crate::domain::ports::Endpoint;
use crate::error::{GatewayError, Result};
use crate::protocol::envelope::{EncryptionEnvelope, EncryptionScheme, Identity};
use crate::protocol::frame::{ControlCodes, FrameCodec};
use crate::protocol::message::TerminalProfile;
use crate::protocol::stan::MAX_STAN;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

const COMPANY_ID_LEN: usize = 4;
const TERMINAL_ID_LEN: usize = 15;

/// Field encryption settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EncryptionConfig {
    /// Overrides the acceptor's advertised scheme when set.
    pub scheme: Option<EncryptionScheme>,
    /// Defaults to the company and terminal ids.
    pub identity: Option<Identity>,
}

/// Everything a gateway needs, loaded once and never mutated.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    pub primary: Endpoint,
    #[serde(default)]
    pub secondary: Option<Endpoint>,
    pub company_id: String,
    pub terminal_id: String,
    #[serde(default)]
    pub acceptor: AcceptorConfig,
    #[serde(default)]
    pub framing: ControlCodes,
    #[serde(default)]
    pub encryption: EncryptionConfig,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u64,
    #[serde(default = "default_sequence")]
    pub starting_stan: u32,
    #[serde(default = "default_sequence")]
    pub starting_batch: u32,
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

fn default_response_timeout_ms() -> u64 {
    30_000
}

fn default_sequence() -> u32 {
    1
}

impl GatewayConfig {
    /// Builds a config with defaults for everything but the essentials.
    pub fn new(primary: Endpoint, company_id: impl Into<String>, terminal_id: impl Into<String>) -> Self {
        Self {
            primary,
            secondary: None,
            company_id: company_id.into(),
            terminal_id: terminal_id.into(),
            acceptor: AcceptorConfig::default(),
            framing: ControlCodes::default(),
            encryption: EncryptionConfig::default(),
            connect_timeout_ms: default_connect_timeout_ms(),
            response_timeout_ms: default_response_timeout_ms(),
            starting_stan: default_sequence(),
            starting_batch: default_sequence(),
        }
    }

    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| GatewayError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    pub fn validate(&self) -> Result<()> {
        check_id("company_id", &self.company_id, COMPANY_ID_LEN)?;
        check_id("terminal_id", &self.terminal_id, TERMINAL_ID_LEN)?;
        self.acceptor.validate()?;

        let ControlCodes { start, end } = self.framing;
        if start == end {
            return Err(GatewayError::Config(
                "framing start and end markers must differ".to_string(),
            ));
        }
        // Payloads are printable ASCII, so markers must lie outside it.
        if [start, end].iter().any(|b| (0x20..0x7f).contains(b)) {
            return Err(GatewayError::Config(
                "framing markers must not be printable ASCII".to_string(),
            ));
        }

        if self.connect_timeout_ms == 0 || self.response_timeout_ms == 0 {
            return Err(GatewayError::Config("timeouts must be non-zero".to_string()));
        }
        if !(1..=MAX_STAN).contains(&self.starting_stan) {
            return Err(GatewayError::Config(format!(
                "starting_stan must be between 1 and {}",
                MAX_STAN
            )));
        }
        if !(1..=MAX_STAN).contains(&self.starting_batch) {
            return Err(GatewayError::Config(format!(
                "starting_batch must be between 1 and {}",
                MAX_STAN
            )));
        }
        Ok(())
    }

    pub fn scheme(&self) -> EncryptionScheme {
        self.encryption
            .scheme
            .unwrap_or(self.acceptor.supported_encryption)
    }

    pub fn identity(&self) -> Identity {
        self.encryption
            .identity
            .clone()
            .unwrap_or_else(|| Identity::new(&self.company_id, &self.terminal_id))
    }

    pub fn envelope(&self) -> EncryptionEnvelope {
        EncryptionEnvelope::new(self.scheme(), &self.identity())
    }

    pub fn frame_codec(&self) -> FrameCodec {
        FrameCodec::new(self.framing)
    }

    pub fn terminal_profile(&self) -> TerminalProfile {
        TerminalProfile {
            company_id: self.company_id.clone(),
            terminal_id: self.terminal_id.clone(),
            acceptor: self.acceptor.clone(),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }
}

fn check_id(name: &str, value: &str, max: usize) -> Result<()> {
    if value.is_empty() || value.len() > max || !value.bytes().all(|b| b.is_ascii_graphic()) {
        return Err(GatewayError::Config(format!(
            "{} must be 1 to {} printable characters, got {:?}",
            name, max, value
        )));
    }
    Ok(())
}
