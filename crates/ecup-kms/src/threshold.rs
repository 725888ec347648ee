//! Threshold-network key-wrap strategy
//!
//! The content key is encrypted by an external network under access-control
//! conditions bound to the caller's space. The network itself is a peer
//! supplied by the caller through [`ThresholdNetwork`].

use std::sync::Arc;

use async_trait::async_trait;
use ecup_block::AccessControlCondition;
use ecup_core::KeyCustody;
use ecup_crypto::{split, KeyMaterial};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::error::{KeyWrapError, KeyWrapResult};
use crate::invocation::{Invocation, SignedInvocation, CONTENT_DECRYPT};
use crate::strategy::{
    authorize_decrypt, DecryptionConfig, EncryptionConfig, KeyWrapStrategy, WrapMetadata,
    WrappedKey,
};

/// Everything the network needs to release a key.
#[derive(Debug, Clone)]
pub struct ThresholdDecryptRequest {
    pub ciphertext: String,
    pub data_to_encrypt_hash: String,
    pub access_control_conditions: Vec<AccessControlCondition>,
    /// `space/content/decrypt` invocation proving the caller's authority.
    pub invocation: SignedInvocation,
}

#[async_trait]
pub trait ThresholdNetwork: Send + Sync {
    /// DID the network answers to.
    fn did(&self) -> &str;

    /// Encrypt `plaintext` so it can only be released under `conditions`.
    async fn encrypt(
        &self,
        plaintext: &[u8],
        conditions: &[AccessControlCondition],
    ) -> KeyWrapResult<String>;

    async fn decrypt(&self, request: &ThresholdDecryptRequest) -> KeyWrapResult<Vec<u8>>;
}

pub struct ThresholdKeyWrap {
    network: Arc<dyn ThresholdNetwork>,
}

impl ThresholdKeyWrap {
    pub fn new(network: Arc<dyn ThresholdNetwork>) -> Self {
        Self { network }
    }
}

impl std::fmt::Debug for ThresholdKeyWrap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThresholdKeyWrap")
            .field("network", &self.network.did())
            .finish()
    }
}

fn key_hash(combined: &[u8]) -> String {
    hex::encode(Sha256::digest(combined))
}

#[async_trait]
impl KeyWrapStrategy for ThresholdKeyWrap {
    fn kind(&self) -> KeyCustody {
        KeyCustody::ThresholdNetwork
    }

    async fn encrypt_symmetric_key(
        &self,
        material: &KeyMaterial,
        config: &EncryptionConfig,
    ) -> KeyWrapResult<WrappedKey> {
        let space = config
            .space
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| KeyWrapError::MissingRequiredParameters(vec!["space"]))?;

        let conditions = vec![AccessControlCondition::space_authority(space)];
        let combined = material.combined();
        let ciphertext = self.network.encrypt(&combined[..], &conditions).await?;
        tracing::debug!(space, network = self.network.did(), "content key bound to space");

        Ok(WrappedKey {
            strategy: KeyCustody::ThresholdNetwork,
            metadata: WrapMetadata::ThresholdNetwork {
                plaintext_key_hash: key_hash(&combined[..]),
                access_control_conditions: conditions,
            },
            encrypted_key: ciphertext,
        })
    }

    async fn decrypt_symmetric_key(
        &self,
        encrypted_key: &str,
        config: &DecryptionConfig,
    ) -> KeyWrapResult<KeyMaterial> {
        let auth = authorize_decrypt(config, KeyCustody::ThresholdNetwork)?;
        let ecup_block::EncryptedMetadata::ThresholdNetwork(record) = &config.metadata else {
            return Err(KeyWrapError::StrategyMismatch {
                expected: KeyCustody::ThresholdNetwork,
                found: config.metadata.strategy(),
            });
        };

        let invocation = Invocation::new(
            auth.issuer,
            self.network.did(),
            CONTENT_DECRYPT,
            auth.space,
            serde_json::json!({ "resource": record.encrypted_data_cid.to_string() }),
            auth.proofs,
        )
        .sign(auth.issuer)?;

        let request = ThresholdDecryptRequest {
            ciphertext: encrypted_key.to_string(),
            data_to_encrypt_hash: record.plaintext_key_hash.clone(),
            access_control_conditions: record.access_control_conditions.clone(),
            invocation,
        };
        let combined = Zeroizing::new(self.network.decrypt(&request).await?);

        if key_hash(&combined) != record.plaintext_key_hash {
            return Err(KeyWrapError::InvalidResponse(
                "released key does not match plaintextKeyHash".into(),
            ));
        }
        Ok(split(&combined)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invocation::{Delegation, Issuer};
    use ed25519_dalek::SigningKey;

    /// Returns whatever it was given, reversed, and hands back a fixed answer on decrypt.
    struct EchoNetwork {
        release: Vec<u8>,
    }

    #[async_trait]
    impl ThresholdNetwork for EchoNetwork {
        fn did(&self) -> &str {
            "did:web:threshold.example"
        }

        async fn encrypt(
            &self,
            plaintext: &[u8],
            conditions: &[AccessControlCondition],
        ) -> KeyWrapResult<String> {
            assert_eq!(conditions.len(), 1);
            Ok(hex::encode(plaintext.iter().rev().copied().collect::<Vec<_>>()))
        }

        async fn decrypt(&self, request: &ThresholdDecryptRequest) -> KeyWrapResult<Vec<u8>> {
            assert_eq!(request.invocation.invocation.can, CONTENT_DECRYPT);
            Ok(self.release.clone())
        }
    }

    fn config_for(metadata: ecup_block::EncryptedMetadata) -> DecryptionConfig {
        DecryptionConfig {
            space: Some("did:key:z6MkSpace".into()),
            issuer: Some(Issuer::new(
                "did:key:z6MkIssuer",
                SigningKey::from_bytes(&[5u8; 32]),
            )),
            proofs: vec![Delegation::new("proof")],
            metadata,
        }
    }

    #[tokio::test]
    async fn test_wrap_binds_conditions_to_space() {
        let wrap = ThresholdKeyWrap::new(Arc::new(EchoNetwork { release: Vec::new() }));
        let material = ecup_crypto::generate_key_material();
        let wrapped = wrap
            .encrypt_symmetric_key(
                &material,
                &EncryptionConfig {
                    space: Some("did:key:z6MkSpace".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(wrapped.strategy, KeyCustody::ThresholdNetwork);
        match &wrapped.metadata {
            WrapMetadata::ThresholdNetwork {
                plaintext_key_hash,
                access_control_conditions,
            } => {
                assert_eq!(plaintext_key_hash, &key_hash(&material.combined()[..]));
                assert_eq!(
                    access_control_conditions[0].return_value_test.value,
                    "did:key:z6MkSpace"
                );
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_released_key_is_checked_against_hash() {
        let material = ecup_crypto::generate_key_material();
        let wrap = ThresholdKeyWrap::new(Arc::new(EchoNetwork {
            release: vec![0u8; 48],
        }));
        let wrapped = wrap
            .encrypt_symmetric_key(
                &material,
                &EncryptionConfig {
                    space: Some("did:key:z6MkSpace".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let key = wrapped.encrypted_key.clone();
        let metadata = wrapped
            .into_metadata(ecup_block::cid_for(ecup_block::RAW, b"ct").unwrap())
            .unwrap();

        let err = wrap
            .decrypt_symmetric_key(&key, &config_for(metadata))
            .await
            .unwrap_err();
        assert!(matches!(err, KeyWrapError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_space_required_for_wrap() {
        let wrap = ThresholdKeyWrap::new(Arc::new(EchoNetwork { release: Vec::new() }));
        let err = wrap
            .encrypt_symmetric_key(&ecup_crypto::generate_key_material(), &EncryptionConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, KeyWrapError::MissingRequiredParameters(m) if m == vec!["space"]));
    }
}
