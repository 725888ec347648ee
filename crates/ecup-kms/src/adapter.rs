use std::sync::Arc;

use ecup_core::{CipherAlgorithm, KeyCustody};
use ecup_crypto::{ByteStream, EncryptedStream, KeyMaterial, SymmetricCrypto};

use crate::error::KeyWrapResult;
use crate::strategy::{DecryptionConfig, EncryptionConfig, KeyWrapStrategy, WrappedKey};

/// A content cipher paired with a key-wrap strategy.
///
/// Built once per session. Both halves are immutable, so one adapter can
/// drive any number of concurrent encryptions and decryptions.
#[derive(Clone)]
pub struct CryptoAdapter {
    cipher: Arc<dyn SymmetricCrypto>,
    key_wrap: Arc<dyn KeyWrapStrategy>,
}

impl std::fmt::Debug for CryptoAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoAdapter")
            .field("cipher", &self.cipher.algorithm())
            .field("key_wrap", &self.key_wrap.kind())
            .finish()
    }
}

impl CryptoAdapter {
    pub fn new(cipher: Arc<dyn SymmetricCrypto>, key_wrap: Arc<dyn KeyWrapStrategy>) -> Self {
        Self { cipher, key_wrap }
    }

    pub fn algorithm(&self) -> CipherAlgorithm {
        self.cipher.algorithm()
    }

    pub fn strategy(&self) -> KeyCustody {
        self.key_wrap.kind()
    }

    /// Encrypt under fresh key material.
    pub fn encrypt_stream(&self, plaintext: ByteStream) -> EncryptedStream {
        self.cipher.encrypt_stream(plaintext)
    }

    pub fn decrypt_stream(&self, ciphertext: ByteStream, material: &KeyMaterial) -> ByteStream {
        self.cipher
            .decrypt_stream(ciphertext, &material.key, &material.iv)
    }

    pub async fn encrypt_symmetric_key(
        &self,
        material: &KeyMaterial,
        config: &EncryptionConfig,
    ) -> KeyWrapResult<WrappedKey> {
        self.key_wrap.encrypt_symmetric_key(material, config).await
    }

    pub async fn decrypt_symmetric_key(
        &self,
        encrypted_key: &str,
        config: &DecryptionConfig,
    ) -> KeyWrapResult<KeyMaterial> {
        self.key_wrap
            .decrypt_symmetric_key(encrypted_key, config)
            .await
    }

    /// Recover the key named by `config.metadata` and decrypt `ciphertext` with it.
    pub async fn decrypt_with_metadata(
        &self,
        ciphertext: ByteStream,
        config: &DecryptionConfig,
    ) -> KeyWrapResult<ByteStream> {
        let material = self
            .decrypt_symmetric_key(config.metadata.encrypted_symmetric_key(), config)
            .await?;
        Ok(self.decrypt_stream(ciphertext, &material))
    }
}
