//! KMS key-wrap strategy
//!
//! Wrapping happens locally against a per-space public key obtained from the
//! service with an `encryption setup` invocation. Unwrapping is always remote:
//! the service holds the private key and answers a `key decrypt` invocation
//! carrying the caller's delegation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ecup_block::KmsKeyInfo;
use ecup_core::config::KmsConfig;
use ecup_core::KeyCustody;
use ecup_crypto::{split, KeyMaterial};
use serde::{Deserialize, Serialize};
use url::Url;
use zeroize::Zeroizing;

use crate::client::{validate_endpoint, HttpKeyCustodyClient, KeyCustodyClient};
use crate::error::{KeyWrapError, KeyWrapResult};
use crate::invocation::{Invocation, Issuer, ENCRYPTION_SETUP, KEY_DECRYPT};
use crate::keyref::{encode_key_reference, sanitize_space_did_for_kms_key_id};
use crate::strategy::{
    authorize_decrypt, require_encrypt_identity, DecryptionConfig, EncryptionConfig,
    KeyWrapStrategy, WrapMetadata, WrappedKey,
};

/// The only wrap algorithm this client implements.
pub const AGE_X25519: &str = "age-x25519";

/// `ok` payload of an encryption setup receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptionSetup {
    pub public_key: String,
    pub algorithm: String,
    pub provider: String,
    pub key_reference: String,
}

/// `ok` payload of a key decrypt receipt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecryptedKey {
    /// Base64 of the 48-byte `key ‖ iv`.
    pub decrypted_symmetric_key: String,
}

#[derive(Debug, Clone, Copy)]
pub struct KmsOptions {
    /// Test environments only.
    pub allow_insecure_http: bool,
    pub timeout: Duration,
}

impl Default for KmsOptions {
    fn default() -> Self {
        Self {
            allow_insecure_http: false,
            timeout: Duration::from_secs(30),
        }
    }
}

pub struct KmsKeyWrap {
    endpoint: Url,
    service_did: String,
    client: Arc<dyn KeyCustodyClient>,
}

impl std::fmt::Debug for KmsKeyWrap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KmsKeyWrap")
            .field("endpoint", &self.endpoint.as_str())
            .field("service_did", &self.service_did)
            .finish_non_exhaustive()
    }
}

impl KmsKeyWrap {
    /// Connect to the service at `url`, identified by `service_did`.
    ///
    /// Fails unless `url` is HTTPS (or HTTP with `allow_insecure_http`).
    pub fn new(url: &str, service_did: &str, options: KmsOptions) -> KeyWrapResult<Self> {
        let endpoint = validate_endpoint(url, options.allow_insecure_http)?;
        let client = HttpKeyCustodyClient::new(endpoint.clone(), options.timeout)?;
        Ok(Self {
            endpoint,
            service_did: service_did.to_string(),
            client: Arc::new(client),
        })
    }

    pub fn from_config(config: &KmsConfig) -> KeyWrapResult<Self> {
        Self::new(
            &config.url,
            &config.service_did,
            KmsOptions {
                allow_insecure_http: config.allow_insecure_http,
                timeout: Duration::from_secs(config.timeout_secs),
            },
        )
    }

    /// Use a custom transport. The URL policy still applies.
    pub fn with_client(
        url: &str,
        service_did: &str,
        allow_insecure_http: bool,
        client: Arc<dyn KeyCustodyClient>,
    ) -> KeyWrapResult<Self> {
        Ok(Self {
            endpoint: validate_endpoint(url, allow_insecure_http)?,
            service_did: service_did.to_string(),
            client,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn service_did(&self) -> &str {
        &self.service_did
    }

    async fn setup(
        &self,
        space: &str,
        config: &EncryptionConfig,
        issuer: &Issuer,
    ) -> KeyWrapResult<EncryptionSetup> {
        let invocation = Invocation::new(
            issuer,
            &self.service_did,
            ENCRYPTION_SETUP,
            space,
            serde_json::json!({ "keyId": sanitize_space_did_for_kms_key_id(space) }),
            &config.proofs,
        )
        .sign(issuer)?;

        let ok = self.client.invoke(&invocation).await?;
        serde_json::from_value(ok)
            .map_err(|e| KeyWrapError::InvalidResponse(format!("encryption setup: {e}")))
    }
}

fn wrap_with_age(public_key: &str, material: &KeyMaterial) -> KeyWrapResult<Vec<u8>> {
    let recipient = public_key
        .trim()
        .parse::<age::x25519::Recipient>()
        .map_err(|e| KeyWrapError::InvalidResponse(format!("age recipient: {e}")))?;
    let combined = material.combined();
    age::encrypt(&recipient, &combined[..]).map_err(|e| KeyWrapError::Wrap(e.to_string()))
}

#[async_trait]
impl KeyWrapStrategy for KmsKeyWrap {
    fn kind(&self) -> KeyCustody {
        KeyCustody::Kms
    }

    async fn encrypt_symmetric_key(
        &self,
        material: &KeyMaterial,
        config: &EncryptionConfig,
    ) -> KeyWrapResult<WrappedKey> {
        let (space, issuer) = require_encrypt_identity(config)?;
        let setup = self.setup(space, config, issuer).await?;

        if setup.algorithm != AGE_X25519 {
            return Err(KeyWrapError::UnsupportedAlgorithm(setup.algorithm));
        }
        let wrapped = wrap_with_age(&setup.public_key, material)?;
        tracing::debug!(
            space,
            provider = %setup.provider,
            wrapped_len = wrapped.len(),
            "wrapped content key for space"
        );

        Ok(WrappedKey {
            strategy: KeyCustody::Kms,
            metadata: WrapMetadata::Kms {
                space: space.to_string(),
                kms: KmsKeyInfo {
                    provider: setup.provider,
                    key_id: encode_key_reference(&setup.key_reference),
                    algorithm: setup.algorithm,
                },
            },
            encrypted_key: STANDARD.encode(wrapped),
        })
    }

    async fn decrypt_symmetric_key(
        &self,
        encrypted_key: &str,
        config: &DecryptionConfig,
    ) -> KeyWrapResult<KeyMaterial> {
        let auth = authorize_decrypt(config, KeyCustody::Kms)?;
        let ecup_block::EncryptedMetadata::Kms(record) = &config.metadata else {
            return Err(KeyWrapError::StrategyMismatch {
                expected: KeyCustody::Kms,
                found: config.metadata.strategy(),
            });
        };

        let invocation = Invocation::new(
            auth.issuer,
            &self.service_did,
            KEY_DECRYPT,
            auth.space,
            serde_json::json!({
                "encryptedSymmetricKey": encrypted_key,
                "keyId": record.kms.key_id,
                "algorithm": record.kms.algorithm,
            }),
            auth.proofs,
        )
        .sign(auth.issuer)?;

        let ok = self.client.invoke(&invocation).await?;
        let response: DecryptedKey = serde_json::from_value(ok)
            .map_err(|e| KeyWrapError::InvalidResponse(format!("key decrypt: {e}")))?;

        let combined = Zeroizing::new(
            STANDARD
                .decode(response.decrypted_symmetric_key.trim())
                .map_err(|e| KeyWrapError::InvalidResponse(format!("decrypted key: {e}")))?,
        );
        Ok(split(&combined)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invocation::{Delegation, SignedInvocation};
    use ed25519_dalek::SigningKey;
    use std::sync::Mutex;

    /// Answers every invocation with a canned receipt and records what it saw.
    struct Canned {
        reply: KeyWrapResult<serde_json::Value>,
        seen: Mutex<Vec<SignedInvocation>>,
    }

    #[async_trait]
    impl KeyCustodyClient for Canned {
        async fn invoke(&self, invocation: &SignedInvocation) -> KeyWrapResult<serde_json::Value> {
            self.seen.lock().unwrap().push(invocation.clone());
            match &self.reply {
                Ok(v) => Ok(v.clone()),
                Err(KeyWrapError::Remote { name, message }) => Err(KeyWrapError::Remote {
                    name: name.clone(),
                    message: message.clone(),
                }),
                Err(e) => panic!("unsupported canned error {e}"),
            }
        }
    }

    fn canned(reply: KeyWrapResult<serde_json::Value>) -> Arc<Canned> {
        Arc::new(Canned {
            reply,
            seen: Mutex::new(Vec::new()),
        })
    }

    fn encryption_config() -> EncryptionConfig {
        EncryptionConfig {
            space: Some("did:key:z6MkSpace".into()),
            issuer: Some(Issuer::new(
                "did:key:z6MkIssuer",
                SigningKey::from_bytes(&[9u8; 32]),
            )),
            proofs: vec![Delegation::new("proof")],
        }
    }

    #[test]
    fn test_constructor_enforces_https() {
        let err = KmsKeyWrap::new("http://localhost:3000", "did:web:kms", KmsOptions::default())
            .unwrap_err();
        assert!(err.to_string().contains("HTTPS"));
        assert!(KmsKeyWrap::new("https://localhost:3000", "did:web:kms", KmsOptions::default()).is_ok());
    }

    #[tokio::test]
    async fn test_setup_invocation_shape() {
        let identity = age::x25519::Identity::generate();
        let client = canned(Ok(serde_json::json!({
            "publicKey": identity.to_public().to_string(),
            "algorithm": AGE_X25519,
            "provider": "mock-kms",
            "keyReference": "keyRings/spaces/cryptoKeys/z6MkSpace",
        })));
        let kms =
            KmsKeyWrap::with_client("https://kms.example", "did:web:kms.example", false, client.clone())
                .unwrap();

        let material = ecup_crypto::generate_key_material();
        let wrapped = kms
            .encrypt_symmetric_key(&material, &encryption_config())
            .await
            .unwrap();

        let seen = client.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        let inv = &seen[0].invocation;
        assert_eq!(inv.can, ENCRYPTION_SETUP);
        assert_eq!(inv.with, "did:key:z6MkSpace");
        assert_eq!(inv.aud, "did:web:kms.example");
        assert_eq!(inv.nb["keyId"], "z6MkSpace");

        match wrapped.metadata {
            WrapMetadata::Kms { kms, .. } => {
                assert_eq!(kms.provider, "mock-kms");
                assert_eq!(
                    crate::keyref::decode_key_reference(&kms.key_id).unwrap(),
                    "keyRings/spaces/cryptoKeys/z6MkSpace"
                );
            }
            other => panic!("unexpected {other:?}"),
        }

        // The wrapped key opens with the service's identity
        let sealed = STANDARD.decode(&wrapped.encrypted_key).unwrap();
        let opened = age::decrypt(&identity, &sealed).unwrap();
        assert_eq!(&opened[..], &material.combined()[..]);
    }

    #[tokio::test]
    async fn test_unknown_algorithm_rejected() {
        let client = canned(Ok(serde_json::json!({
            "publicKey": "-----BEGIN PUBLIC KEY-----",
            "algorithm": "RSA_DECRYPT_OAEP_3072_SHA256",
            "provider": "google-kms",
            "keyReference": "k",
        })));
        let kms = KmsKeyWrap::with_client("https://kms.example", "did:web:kms", false, client).unwrap();
        let err = kms
            .encrypt_symmetric_key(&ecup_crypto::generate_key_material(), &encryption_config())
            .await
            .unwrap_err();
        assert!(matches!(err, KeyWrapError::UnsupportedAlgorithm(a) if a.starts_with("RSA")));
    }

    #[tokio::test]
    async fn test_remote_setup_failure_surfaces_verbatim() {
        let client = canned(Err(KeyWrapError::Remote {
            name: "SpaceNotProvisioned".into(),
            message: "space not provisioned".into(),
        }));
        let kms =
            KmsKeyWrap::with_client("https://kms.example", "did:web:kms", false, client.clone()).unwrap();
        let err = kms
            .encrypt_symmetric_key(&ecup_crypto::generate_key_material(), &encryption_config())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "SpaceNotProvisioned: space not provisioned");
        // no automatic retry
        assert_eq!(client.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_encrypt_requires_identity() {
        let client = canned(Ok(serde_json::Value::Null));
        let kms =
            KmsKeyWrap::with_client("https://kms.example", "did:web:kms", false, client.clone()).unwrap();
        let err = kms
            .encrypt_symmetric_key(&ecup_crypto::generate_key_material(), &EncryptionConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, KeyWrapError::MissingRequiredParameters(_)));
        assert!(client.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_decrypt_response() {
        let client = canned(Ok(serde_json::json!({ "decryptedSymmetricKey": STANDARD.encode([0u8; 47]) })));
        let kms = KmsKeyWrap::with_client("https://kms.example", "did:web:kms", false, client).unwrap();

        let metadata = WrappedKey {
            strategy: KeyCustody::Kms,
            metadata: WrapMetadata::Kms {
                space: "did:key:z6MkSpace".into(),
                kms: KmsKeyInfo {
                    provider: "p".into(),
                    key_id: "aw".into(),
                    algorithm: AGE_X25519.into(),
                },
            },
            encrypted_key: "d3JhcA".into(),
        }
        .into_metadata(ecup_block::cid_for(ecup_block::RAW, b"ct").unwrap())
        .unwrap();
        let base = encryption_config();
        let config = DecryptionConfig {
            space: base.space,
            issuer: base.issuer,
            proofs: base.proofs,
            metadata,
        };

        let err = kms.decrypt_symmetric_key("d3JhcA", &config).await.unwrap_err();
        assert!(matches!(
            err,
            KeyWrapError::Crypto(ecup_crypto::CryptoError::InvalidCombinedLength { actual: 47, .. })
        ));
    }
}
