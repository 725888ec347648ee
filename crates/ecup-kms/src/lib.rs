//! ecup-kms: custody of content keys
//!
//! Two strategies wrap a file's [`KeyMaterial`](ecup_crypto::KeyMaterial):
//!
//! - [`KmsKeyWrap`]: wraps locally against a per-space public key from a
//!   remote key-custody service; only the service can unwrap.
//! - [`ThresholdKeyWrap`]: hands the key to a threshold network under
//!   access-control conditions bound to the caller's space.
//!
//! Remote calls are signed capability invocations ([`SignedInvocation`]).
//! [`CryptoAdapter`] pairs a strategy with a content cipher.

pub mod adapter;
pub mod client;
pub mod error;
pub mod invocation;
pub mod keyref;
pub mod kms;
pub mod strategy;
pub mod threshold;

pub use adapter::CryptoAdapter;
pub use client::{validate_endpoint, HttpKeyCustodyClient, KeyCustodyClient};
pub use error::{KeyWrapError, KeyWrapResult};
pub use invocation::{
    Delegation, Failure, Invocation, Issuer, Receipt, SignedInvocation, CONTENT_DECRYPT,
    ENCRYPTION_SETUP, KEY_DECRYPT,
};
pub use keyref::{decode_key_reference, encode_key_reference, sanitize_space_did_for_kms_key_id};
pub use kms::{DecryptedKey, EncryptionSetup, KmsKeyWrap, KmsOptions, AGE_X25519};
pub use strategy::{DecryptionConfig, EncryptionConfig, KeyWrapStrategy, WrapMetadata, WrappedKey};
pub use threshold::{ThresholdDecryptRequest, ThresholdKeyWrap, ThresholdNetwork};
