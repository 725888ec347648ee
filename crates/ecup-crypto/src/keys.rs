//! Key material: per-operation AES-256 key + 128-bit IV, and the fixed `key ‖ iv` codec

use rand::RngCore;
use zeroize::{Zeroize, Zeroizing};

use crate::error::{CryptoError, CryptoResult};
use crate::{BLOCK_SIZE, COMBINED_SIZE, KEY_SIZE};

/// A 256-bit content encryption key. Zeroized on drop.
#[derive(Clone)]
pub struct SymmetricKey {
    bytes: [u8; KEY_SIZE],
}

impl SymmetricKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn from_slice(bytes: &[u8]) -> CryptoResult<Self> {
        let bytes: [u8; KEY_SIZE] =
            bytes
                .try_into()
                .map_err(|_| CryptoError::InvalidKeyLength {
                    expected: KEY_SIZE,
                    actual: bytes.len(),
                })?;
        Ok(Self { bytes })
    }

    /// Generate a random key from the OS-seeded thread RNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for SymmetricKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymmetricKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// A 128-bit initialization value (CBC IV, or CTR initial counter block).
#[derive(Clone)]
pub struct Iv {
    bytes: [u8; BLOCK_SIZE],
}

impl Iv {
    pub fn from_bytes(bytes: [u8; BLOCK_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn from_slice(bytes: &[u8]) -> CryptoResult<Self> {
        let bytes: [u8; BLOCK_SIZE] =
            bytes
                .try_into()
                .map_err(|_| CryptoError::InvalidIvLength {
                    expected: BLOCK_SIZE,
                    actual: bytes.len(),
                })?;
        Ok(Self { bytes })
    }

    pub fn generate() -> Self {
        let mut bytes = [0u8; BLOCK_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; BLOCK_SIZE] {
        &self.bytes
    }
}

impl Drop for Iv {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for Iv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Iv").field("bytes", &"[REDACTED]").finish()
    }
}

/// The single secret protected by key wrapping: `{ key, iv }`.
#[derive(Debug, Clone)]
pub struct KeyMaterial {
    pub key: SymmetricKey,
    pub iv: Iv,
}

impl KeyMaterial {
    pub fn new(key: SymmetricKey, iv: Iv) -> Self {
        Self { key, iv }
    }

    /// Concatenate into the 48-byte `key ‖ iv` form.
    pub fn combined(&self) -> Zeroizing<[u8; COMBINED_SIZE]> {
        let mut out = Zeroizing::new([0u8; COMBINED_SIZE]);
        out[..KEY_SIZE].copy_from_slice(self.key.as_bytes());
        out[KEY_SIZE..].copy_from_slice(self.iv.as_bytes());
        out
    }
}

/// Generate fresh key material. Called once per encryption; never cached.
pub fn generate_key_material() -> KeyMaterial {
    KeyMaterial::new(SymmetricKey::generate(), Iv::generate())
}

/// Combine a 32-byte key and a 16-byte IV into `key ‖ iv`.
pub fn combine(key: &[u8], iv: &[u8]) -> CryptoResult<Zeroizing<[u8; COMBINED_SIZE]>> {
    let material = KeyMaterial::new(SymmetricKey::from_slice(key)?, Iv::from_slice(iv)?);
    Ok(material.combined())
}

/// Split a 48-byte `key ‖ iv` buffer back into its parts.
pub fn split(combined: &[u8]) -> CryptoResult<KeyMaterial> {
    if combined.len() != COMBINED_SIZE {
        return Err(CryptoError::InvalidCombinedLength {
            expected: COMBINED_SIZE,
            actual: combined.len(),
        });
    }
    let (key, iv) = combined.split_at(KEY_SIZE);
    Ok(KeyMaterial::new(
        SymmetricKey::from_slice(key)?,
        Iv::from_slice(iv)?,
    ))
}
