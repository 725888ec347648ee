//! ecup-crypto: client-side streaming encryption for ecup
//!
//! Pipeline: plaintext stream → fresh key material → cipher transform per chunk → ciphertext stream
//!
//! Two interchangeable strategies implement [`SymmetricCrypto`]:
//! ```text
//! AesCtrCrypto (default)
//!   └── keystream block i = AES-256(key, increment(iv, i)), carried across chunks
//! AesCbcCrypto (legacy, read-compatible with older ciphertexts)
//!   └── AES-256-CBC, PKCS#7 padding, partial blocks buffered across chunks
//! ```
//!
//! Key material (256-bit key + 128-bit IV) is generated per operation and
//! never reused. Wrapping it for storage is the job of `ecup-kms`.

pub mod cbc;
pub mod counter;
pub mod ctr;
pub mod error;
pub mod keys;
pub mod stream;

pub use cbc::AesCbcCrypto;
pub use counter::Counter;
pub use ctr::{AesCtrCrypto, CtrKeystream};
pub use error::{CryptoError, CryptoResult};
pub use keys::{combine, generate_key_material, split, Iv, KeyMaterial, SymmetricKey};
pub use stream::{cipher_for, ByteStream, EncryptedStream, SymmetricCrypto};

/// Size of an AES-256 key in bytes
pub const KEY_SIZE: usize = 32;

/// Size of an AES block, and of the IV / initial counter
pub const BLOCK_SIZE: usize = 16;

/// Size of `key ‖ iv`
pub const COMBINED_SIZE: usize = KEY_SIZE + BLOCK_SIZE;
