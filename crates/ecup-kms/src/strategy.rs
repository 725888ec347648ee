//! The contract shared by every key-wrap strategy

use async_trait::async_trait;
use ecup_block::{
    AccessControlCondition, Cid, EncryptedMetadata, KmsKeyInfo, KmsMetadata, ThresholdMetadata,
};
use ecup_core::KeyCustody;
use ecup_crypto::KeyMaterial;

use crate::error::{KeyWrapError, KeyWrapResult};
use crate::invocation::{Delegation, Issuer};

/// Caller identity for wrapping a new key.
#[derive(Debug, Clone, Default)]
pub struct EncryptionConfig {
    pub space: Option<String>,
    pub issuer: Option<Issuer>,
    pub proofs: Vec<Delegation>,
}

/// Caller identity plus the record being unwrapped.
#[derive(Debug, Clone)]
pub struct DecryptionConfig {
    pub space: Option<String>,
    pub issuer: Option<Issuer>,
    pub proofs: Vec<Delegation>,
    pub metadata: EncryptedMetadata,
}

/// Strategy-specific part of an encrypted metadata record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WrapMetadata {
    Kms {
        space: String,
        kms: KmsKeyInfo,
    },
    ThresholdNetwork {
        plaintext_key_hash: String,
        access_control_conditions: Vec<AccessControlCondition>,
    },
}

/// Result of wrapping one content key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrappedKey {
    pub strategy: KeyCustody,
    pub metadata: WrapMetadata,
    /// Wrapped key material in the strategy's transport encoding.
    pub encrypted_key: String,
}

impl WrappedKey {
    /// Complete the metadata record once the ciphertext's CID is known.
    pub fn into_metadata(self, encrypted_data_cid: Cid) -> KeyWrapResult<EncryptedMetadata> {
        let record = match self.metadata {
            WrapMetadata::Kms { space, kms } => EncryptedMetadata::kms(KmsMetadata {
                encrypted_data_cid,
                encrypted_symmetric_key: self.encrypted_key,
                space,
                kms,
            })?,
            WrapMetadata::ThresholdNetwork {
                plaintext_key_hash,
                access_control_conditions,
            } => EncryptedMetadata::threshold_network(ThresholdMetadata {
                encrypted_data_cid,
                identity_bound_ciphertext: self.encrypted_key,
                plaintext_key_hash,
                access_control_conditions,
            })?,
        };
        Ok(record)
    }
}

#[async_trait]
pub trait KeyWrapStrategy: Send + Sync {
    fn kind(&self) -> KeyCustody;

    async fn encrypt_symmetric_key(
        &self,
        material: &KeyMaterial,
        config: &EncryptionConfig,
    ) -> KeyWrapResult<WrappedKey>;

    async fn decrypt_symmetric_key(
        &self,
        encrypted_key: &str,
        config: &DecryptionConfig,
    ) -> KeyWrapResult<KeyMaterial>;
}

/// Borrowed view of a validated decryption request.
pub(crate) struct Authorized<'a> {
    pub space: &'a str,
    pub issuer: &'a Issuer,
    pub proofs: &'a [Delegation],
}

/// Check the request carries everything an unwrap needs and targets `expected`.
pub(crate) fn authorize_decrypt(
    config: &DecryptionConfig,
    expected: KeyCustody,
) -> KeyWrapResult<Authorized<'_>> {
    let mut missing = Vec::new();
    let space = config.space.as_deref().filter(|s| !s.trim().is_empty());
    if space.is_none() {
        missing.push("space");
    }
    if config.proofs.is_empty() {
        missing.push("delegation");
    }
    if config.issuer.is_none() {
        missing.push("issuer");
    }

    match (space, config.issuer.as_ref()) {
        (Some(space), Some(issuer)) if missing.is_empty() => {
            let found = config.metadata.strategy();
            if found != expected {
                return Err(KeyWrapError::StrategyMismatch { expected, found });
            }
            Ok(Authorized {
                space,
                issuer,
                proofs: &config.proofs,
            })
        }
        _ => Err(KeyWrapError::MissingRequiredParameters(missing)),
    }
}

/// Space and issuer for a wrap request.
pub(crate) fn require_encrypt_identity(
    config: &EncryptionConfig,
) -> KeyWrapResult<(&str, &Issuer)> {
    let space = config.space.as_deref().filter(|s| !s.trim().is_empty());
    match (space, config.issuer.as_ref()) {
        (Some(space), Some(issuer)) => Ok((space, issuer)),
        (space, issuer) => {
            let mut missing = Vec::new();
            if space.is_none() {
                missing.push("space");
            }
            if issuer.is_none() {
                missing.push("issuer");
            }
            Err(KeyWrapError::MissingRequiredParameters(missing))
        }
    }
}
