//! Streaming cipher contract shared by the CTR and CBC strategies
//!
//! Streams are pull-based: no bytes are transformed until the consumer polls,
//! and each chunk is transformed synchronously as it arrives. Per-stream state
//! (counter, carried keystream, CBC chaining block) lives in the fold state of
//! that stream only, so concurrent streams never share mutable state.

use std::sync::Arc;

use bytes::Bytes;
use ecup_core::CipherAlgorithm;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};

use crate::cbc::AesCbcCrypto;
use crate::ctr::AesCtrCrypto;
use crate::error::CryptoResult;
use crate::keys::{Iv, KeyMaterial, SymmetricKey};

/// A lazily produced sequence of byte chunks of arbitrary size.
pub type ByteStream = BoxStream<'static, CryptoResult<Bytes>>;

/// Output of [`SymmetricCrypto::encrypt_stream`]: fresh key material plus the
/// ciphertext stream it drives.
pub struct EncryptedStream {
    pub key_material: KeyMaterial,
    pub ciphertext: ByteStream,
}

impl std::fmt::Debug for EncryptedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedStream")
            .field("key_material", &self.key_material)
            .finish_non_exhaustive()
    }
}

/// A symmetric stream cipher strategy.
pub trait SymmetricCrypto: Send + Sync {
    fn algorithm(&self) -> CipherAlgorithm;

    fn generate_key(&self) -> SymmetricKey {
        SymmetricKey::generate()
    }

    /// Encrypt with caller-supplied key material.
    fn encrypt_stream_with(&self, plaintext: ByteStream, material: &KeyMaterial) -> ByteStream;

    fn decrypt_stream(&self, ciphertext: ByteStream, key: &SymmetricKey, iv: &Iv) -> ByteStream;

    /// Encrypt under freshly generated key material.
    fn encrypt_stream(&self, plaintext: ByteStream) -> EncryptedStream {
        let key_material = KeyMaterial::new(self.generate_key(), Iv::generate());
        let ciphertext = self.encrypt_stream_with(plaintext, &key_material);
        EncryptedStream {
            key_material,
            ciphertext,
        }
    }
}

/// Strategy object for a configured algorithm.
pub fn cipher_for(algorithm: CipherAlgorithm) -> Arc<dyn SymmetricCrypto> {
    match algorithm {
        CipherAlgorithm::AesCtr => Arc::new(AesCtrCrypto),
        CipherAlgorithm::AesCbc => Arc::new(AesCbcCrypto),
    }
}

/// Build a stream from in-memory chunks.
pub fn from_chunks<I>(chunks: I) -> ByteStream
where
    I: IntoIterator<Item = Bytes>,
    I::IntoIter: Send + 'static,
{
    stream::iter(chunks.into_iter().map(Ok)).boxed()
}

/// Drain a stream into one buffer. Intended for small payloads and tests.
pub async fn collect(stream: ByteStream) -> CryptoResult<Vec<u8>> {
    stream
        .try_fold(Vec::new(), |mut acc, chunk| async move {
            acc.extend_from_slice(&chunk);
            Ok(acc)
        })
        .await
}
