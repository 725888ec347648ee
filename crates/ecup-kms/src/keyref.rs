//! Key-reference transport encoding and KMS key-ID naming

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

use crate::error::{KeyWrapError, KeyWrapResult};

/// Opaque, reversible transport form of a KMS key reference.
pub fn encode_key_reference(reference: &str) -> String {
    URL_SAFE_NO_PAD.encode(reference.as_bytes())
}

pub fn decode_key_reference(encoded: &str) -> KeyWrapResult<String> {
    let bytes = URL_SAFE_NO_PAD
        .decode(encoded.trim())
        .map_err(|e| KeyWrapError::InvalidKeyReference(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| KeyWrapError::InvalidKeyReference(e.to_string()))
}

/// `did:key:z6Mk...` becomes `z6Mk...`; other inputs pass through unchanged.
pub fn sanitize_space_did_for_kms_key_id(space_did: &str) -> String {
    space_did
        .strip_prefix("did:key:")
        .unwrap_or(space_did)
        .to_string()
}
