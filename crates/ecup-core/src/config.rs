use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{EcupError, EcupResult};
use crate::types::CipherAlgorithm;

/// Top-level configuration (loaded from ecup.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EcupConfig {
    pub logging: LoggingConfig,
    pub gateway: GatewayConfig,
    pub kms: KmsConfig,
    pub crypto: CryptoConfig,
    pub identity: IdentityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

/// Content gateway used to retrieve metadata blocks
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Gateway base URL; blocks are fetched from {url}/ipfs/{cid}?format=car
    pub url: String,
    /// Reject plaintext HTTP gateways instead of warning
    pub enforce_tls: bool,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Largest response body accepted from the gateway
    pub max_response_bytes: u64,
}

/// Remote key-custody service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KmsConfig {
    /// HTTPS endpoint of the key-custody service
    pub url: String,
    /// DID identifying the key-custody service (audience of invocations)
    pub service_did: String,
    /// Permit plaintext HTTP. Test environments only.
    pub allow_insecure_http: bool,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// Content cipher: "aes-ctr" (default) or "aes-cbc" (legacy)
    pub cipher: CipherAlgorithm,
    /// Read size when streaming files through the cipher
    pub chunk_size: usize,
}

/// Caller identity and authorization material
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// DID of the invocation issuer
    pub issuer_did: Option<String>,
    /// File holding the issuer's hex-encoded Ed25519 secret key
    pub signing_key_file: Option<PathBuf>,
    /// Storage space the content belongs to
    pub space_did: Option<String>,
    /// File holding delegation proofs, one per line
    pub proof_file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: "https://w3s.link".into(),
            enforce_tls: false,
            timeout_secs: 30,
            max_response_bytes: 4 * 1024 * 1024,
        }
    }
}

impl Default for KmsConfig {
    fn default() -> Self {
        Self {
            url: "https://localhost:8443".into(),
            service_did: "did:web:localhost".into(),
            allow_insecure_http: false,
            timeout_secs: 30,
        }
    }
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            cipher: CipherAlgorithm::AesCtr,
            chunk_size: 64 * 1024,
        }
    }
}

impl EcupConfig {
    /// Parse a config from TOML text and validate it.
    pub fn from_toml(content: &str) -> EcupResult<Self> {
        let config: EcupConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the config file at `path`, falling back to defaults when it does not exist.
    pub fn load(path: &Path) -> EcupResult<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Self::from_toml(&content)
        } else {
            tracing::warn!(
                "config file not found: {}  (using defaults)",
                path.display()
            );
            Ok(Self::default())
        }
    }

    /// Reject values that can never work at runtime.
    pub fn validate(&self) -> EcupResult<()> {
        if self.crypto.chunk_size == 0 {
            return Err(EcupError::Config("crypto.chunk_size must be > 0".into()));
        }
        if self.gateway.max_response_bytes == 0 {
            return Err(EcupError::Config(
                "gateway.max_response_bytes must be > 0".into(),
            ));
        }
        if !matches!(self.logging.format.as_str(), "json" | "text") {
            return Err(EcupError::UnknownVariant {
                kind: "log format",
                value: self.logging.format.clone(),
            });
        }
        if !self.kms.service_did.starts_with("did:") {
            return Err(EcupError::Config(format!(
                "kms.service_did is not a DID: {}",
                self.kms.service_did
            )));
        }
        Ok(())
    }
}

/// Expand `~` in path to the user's home directory
pub fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        let home = std::env::var("HOME").unwrap_or_default();
        PathBuf::from(home).join(rest)
    } else {
        path.to_path_buf()
    }
}
