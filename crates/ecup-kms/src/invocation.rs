//! Signed capability invocations and their receipts
//!
//! An invocation names an ability (`can`) on a resource (`with`), carries
//! caveats (`nb`) and the delegation chain (`prf`) that authorizes it, and is
//! signed by the issuer's Ed25519 key. The signature covers the JSON encoding
//! of every field except `sig`.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::{KeyWrapError, KeyWrapResult};

pub const ENCRYPTION_SETUP: &str = "space/encryption/setup";
pub const KEY_DECRYPT: &str = "space/encryption/key/decrypt";
pub const CONTENT_DECRYPT: &str = "space/content/decrypt";

/// Invocations expire this long after they are issued.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// The principal that signs invocations.
#[derive(Clone)]
pub struct Issuer {
    did: String,
    signing_key: SigningKey,
}

impl Issuer {
    pub fn new(did: impl Into<String>, signing_key: SigningKey) -> Self {
        Self {
            did: did.into(),
            signing_key,
        }
    }

    /// Build from a 32-byte Ed25519 secret.
    pub fn from_secret_bytes(did: impl Into<String>, secret: &[u8]) -> KeyWrapResult<Self> {
        let secret: [u8; 32] = secret.try_into().map_err(|_| {
            KeyWrapError::Signature(format!(
                "Ed25519 secret must be 32 bytes, got {}",
                secret.len()
            ))
        })?;
        Ok(Self::new(did, SigningKey::from_bytes(&secret)))
    }

    pub fn did(&self) -> &str {
        &self.did
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    fn sign(&self, message: &[u8]) -> Signature {
        self.signing_key.sign(message)
    }
}

impl std::fmt::Debug for Issuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Issuer")
            .field("did", &self.did)
            .field("signing_key", &"[REDACTED]")
            .finish()
    }
}

/// An encoded delegation proving the issuer may act on a space.
///
/// Produced by the access-control system and passed through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Delegation(pub String);

impl Delegation {
    pub fn new(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// The signed part of an invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invocation {
    pub iss: String,
    pub aud: String,
    pub can: String,
    pub with: String,
    pub nb: serde_json::Value,
    pub prf: Vec<Delegation>,
    pub nonce: String,
    /// Expiry, seconds since the Unix epoch.
    pub exp: u64,
}

impl Invocation {
    pub fn new(
        issuer: &Issuer,
        audience: &str,
        ability: &str,
        resource: &str,
        caveats: serde_json::Value,
        proofs: &[Delegation],
    ) -> Self {
        let mut nonce = [0u8; 12];
        rand::thread_rng().fill_bytes(&mut nonce);

        Self {
            iss: issuer.did().to_string(),
            aud: audience.to_string(),
            can: ability.to_string(),
            with: resource.to_string(),
            nb: caveats,
            prf: proofs.to_vec(),
            nonce: URL_SAFE_NO_PAD.encode(nonce),
            exp: unix_now().saturating_add(DEFAULT_TTL.as_secs()),
        }
    }

    fn signing_bytes(&self) -> KeyWrapResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| KeyWrapError::Signature(e.to_string()))
    }

    pub fn sign(self, issuer: &Issuer) -> KeyWrapResult<SignedInvocation> {
        if issuer.did() != self.iss {
            return Err(KeyWrapError::Signature(format!(
                "invocation issued by {} cannot be signed by {}",
                self.iss,
                issuer.did()
            )));
        }
        let sig = issuer.sign(&self.signing_bytes()?);
        Ok(SignedInvocation {
            invocation: self,
            sig: STANDARD.encode(sig.to_bytes()),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedInvocation {
    #[serde(flatten)]
    pub invocation: Invocation,
    /// Base64 Ed25519 signature.
    pub sig: String,
}

impl SignedInvocation {
    /// Check the signature against the issuer's public key.
    pub fn verify(&self, key: &VerifyingKey) -> KeyWrapResult<()> {
        let raw = STANDARD
            .decode(&self.sig)
            .map_err(|e| KeyWrapError::Signature(format!("signature encoding: {e}")))?;
        let sig = Signature::from_slice(&raw).map_err(|e| KeyWrapError::Signature(e.to_string()))?;
        key.verify(&self.invocation.signing_bytes()?, &sig)
            .map_err(|_| KeyWrapError::Signature("signature does not match issuer key".into()))
    }

    pub fn is_expired(&self) -> bool {
        self.invocation.exp <= unix_now()
    }
}

/// Error half of a receipt, as reported by the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub name: String,
    pub message: String,
}

/// Outcome of an invocation: `{"ok": ...}` or `{"error": {name, message}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Receipt<T> {
    #[serde(rename = "ok")]
    Ok(T),
    #[serde(rename = "error")]
    Error(Failure),
}

impl<T> Receipt<T> {
    pub fn into_result(self) -> KeyWrapResult<T> {
        match self {
            Self::Ok(value) => Ok(value),
            Self::Error(Failure { name, message }) => Err(KeyWrapError::Remote { name, message }),
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
