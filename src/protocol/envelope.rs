//! Symmetric envelope for sensitive cardholder fields.
//!
//! Values are base64-encoded before they enter the envelope, so what goes on
//! the wire is always envelope output over base64 text. Encrypted schemes use
//! AES-256-GCM with a key derived from the caller identity; the scheme tag is
//! bound in as associated data so a value sealed under one scheme never opens
//! under another.

use crate::error::{GatewayError, Result};
use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rand::RngCore;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::fmt;

const NONCE_LEN: usize = 12;

/// Versioned encryption scheme applied to sensitive fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncryptionScheme {
    #[default]
    None,
    Tep2,
    Version2,
}

impl EncryptionScheme {
    /// Single-character tag transmitted alongside encrypted card data.
    pub fn tag(&self) -> &'static str {
        match self {
            EncryptionScheme::None => "0",
            EncryptionScheme::Tep2 => "2",
            EncryptionScheme::Version2 => "V",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "0" => Some(EncryptionScheme::None),
            "2" => Some(EncryptionScheme::Tep2),
            "V" => Some(EncryptionScheme::Version2),
            _ => None,
        }
    }

    pub fn is_encrypted(&self) -> bool {
        !matches!(self, EncryptionScheme::None)
    }
}

/// Credentials the envelope key is derived from.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct Identity {
    pub username: String,
    pub api_key: String,
}

impl Identity {
    pub fn new(username: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            api_key: api_key.into(),
        }
    }

    fn derive_key(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.username.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.api_key.as_bytes());
        hasher.finalize().into()
    }
}

// Keep the key out of logs.
impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("username", &self.username)
            .field("api_key", &"***")
            .finish()
    }
}

/// Key-exchange blob sent next to `Version2` card data.
///
/// The host uses it to recover the session key; this side never looks inside.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionData {
    pub version: String,
    pub ktb: String,
}

impl EncryptionData {
    pub fn version2(ktb: impl Into<String>) -> Self {
        Self {
            version: "2".to_string(),
            ktb: ktb.into(),
        }
    }
}

#[derive(Clone)]
pub struct EncryptionEnvelope {
    scheme: EncryptionScheme,
    cipher: Option<Aes256Gcm>,
}

impl fmt::Debug for EncryptionEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionEnvelope")
            .field("scheme", &self.scheme)
            .finish_non_exhaustive()
    }
}

impl EncryptionEnvelope {
    pub fn new(scheme: EncryptionScheme, identity: &Identity) -> Self {
        let cipher = scheme.is_encrypted().then(|| {
            let key = identity.derive_key();
            Aes256Gcm::new(&key.into())
        });
        Self { scheme, cipher }
    }

    pub fn scheme(&self) -> EncryptionScheme {
        self.scheme
    }

    pub fn encode(&self, plaintext: &str) -> Result<String> {
        let Some(cipher) = &self.cipher else {
            return Ok(plaintext.to_string());
        };

        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);
        let sealed = cipher
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: plaintext.as_bytes(),
                    aad: self.scheme.tag().as_bytes(),
                },
            )
            .map_err(|e| GatewayError::Encoding(format!("encryption failed: {}", e)))?;

        let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&sealed);
        Ok(STANDARD.encode(out))
    }

    pub fn decode(&self, ciphertext: &str) -> Result<String> {
        let Some(cipher) = &self.cipher else {
            return Ok(ciphertext.to_string());
        };

        let raw = STANDARD
            .decode(ciphertext)
            .map_err(|e| GatewayError::Decryption(format!("invalid base64: {}", e)))?;
        if raw.len() <= NONCE_LEN {
            return Err(GatewayError::Decryption("ciphertext too short".to_string()));
        }
        let (nonce, sealed) = raw.split_at(NONCE_LEN);
        let opened = cipher
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: sealed,
                    aad: self.scheme.tag().as_bytes(),
                },
            )
            .map_err(|_| {
                GatewayError::Decryption("authentication failed for identity".to_string())
            })?;
        String::from_utf8(opened)
            .map_err(|e| GatewayError::Decryption(format!("plaintext is not UTF-8: {}", e)))
    }

    /// Base64-encodes `value`, then seals it.
    pub fn seal_field(&self, value: &str) -> Result<String> {
        self.encode(&STANDARD.encode(value.as_bytes()))
    }

    /// Inverse of [`EncryptionEnvelope::seal_field`].
    pub fn open_field(&self, sealed: &str) -> Result<String> {
        let encoded = self.decode(sealed)?;
        let bytes = STANDARD
            .decode(encoded.as_bytes())
            .map_err(|e| GatewayError::Decryption(format!("invalid inner base64: {}", e)))?;
        String::from_utf8(bytes)
            .map_err(|e| GatewayError::Decryption(format!("field is not UTF-8: {}", e)))
    }
}
