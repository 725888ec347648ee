//! Legacy AES-256-CBC stream encryption (PKCS#7 padding)
//!
//! Kept so ciphertexts issued before the CTR switch remain readable. Chunks
//! of any size are accepted; bytes that do not fill a block wait in a small
//! buffer until the next chunk (or the end of the stream) arrives. The
//! decryptor always holds back the last full block so padding can be checked
//! once the stream ends.

use aes::cipher::{generic_array::GenericArray, BlockDecrypt, BlockEncrypt, KeyInit};
use aes::Aes256;
use bytes::{Bytes, BytesMut};
use ecup_core::CipherAlgorithm;
use futures::stream::{self, StreamExt, TryStreamExt};
use zeroize::Zeroize;

use crate::error::{CryptoError, CryptoResult};
use crate::keys::{Iv, KeyMaterial, SymmetricKey};
use crate::stream::{ByteStream, SymmetricCrypto};
use crate::BLOCK_SIZE;

trait BlockTransform: Send {
    fn update(&mut self, chunk: &[u8]) -> CryptoResult<Bytes>;
    fn finish(&mut self) -> CryptoResult<Bytes>;
}

struct CbcEncryptor {
    cipher: Aes256,
    prev: [u8; BLOCK_SIZE],
    pending: Vec<u8>,
}

impl CbcEncryptor {
    fn new(key: &SymmetricKey, iv: &Iv) -> Self {
        Self {
            cipher: Aes256::new(key.as_bytes().into()),
            prev: *iv.as_bytes(),
            pending: Vec::with_capacity(2 * BLOCK_SIZE),
        }
    }

    fn encrypt_block(&mut self, plain: &[u8], out: &mut BytesMut) {
        let mut block = GenericArray::from(self.prev);
        for (b, p) in block.iter_mut().zip(plain) {
            *b ^= p;
        }
        self.cipher.encrypt_block(&mut block);
        self.prev.copy_from_slice(&block);
        out.extend_from_slice(&block);
    }
}

impl BlockTransform for CbcEncryptor {
    fn update(&mut self, chunk: &[u8]) -> CryptoResult<Bytes> {
        self.pending.extend_from_slice(chunk);
        let ready = self.pending.len() / BLOCK_SIZE * BLOCK_SIZE;
        let mut out = BytesMut::with_capacity(ready);

        let mut block = [0u8; BLOCK_SIZE];
        for offset in (0..ready).step_by(BLOCK_SIZE) {
            block.copy_from_slice(&self.pending[offset..offset + BLOCK_SIZE]);
            self.encrypt_block(&block, &mut out);
        }
        block.zeroize();
        self.pending.drain(..ready);
        Ok(out.freeze())
    }

    fn finish(&mut self) -> CryptoResult<Bytes> {
        let pad = BLOCK_SIZE - self.pending.len();
        let mut last = std::mem::take(&mut self.pending);
        last.resize(BLOCK_SIZE, pad as u8);

        let mut out = BytesMut::with_capacity(BLOCK_SIZE);
        self.encrypt_block(&last, &mut out);
        last.zeroize();
        Ok(out.freeze())
    }
}

struct CbcDecryptor {
    cipher: Aes256,
    prev: [u8; BLOCK_SIZE],
    pending: Vec<u8>,
    total: u64,
}

impl CbcDecryptor {
    fn new(key: &SymmetricKey, iv: &Iv) -> Self {
        Self {
            cipher: Aes256::new(key.as_bytes().into()),
            prev: *iv.as_bytes(),
            pending: Vec::with_capacity(2 * BLOCK_SIZE),
            total: 0,
        }
    }

    fn decrypt_block(&mut self, cipher_block: &[u8]) -> [u8; BLOCK_SIZE] {
        let mut block = GenericArray::clone_from_slice(cipher_block);
        self.cipher.decrypt_block(&mut block);
        let mut plain: [u8; BLOCK_SIZE] = block.into();
        for (p, c) in plain.iter_mut().zip(self.prev) {
            *p ^= c;
        }
        self.prev.copy_from_slice(cipher_block);
        plain
    }
}

impl BlockTransform for CbcDecryptor {
    fn update(&mut self, chunk: &[u8]) -> CryptoResult<Bytes> {
        self.total += chunk.len() as u64;
        self.pending.extend_from_slice(chunk);

        let mut ready = self.pending.len() / BLOCK_SIZE * BLOCK_SIZE;
        if ready == self.pending.len() && ready > 0 {
            ready -= BLOCK_SIZE;
        }

        let mut out = BytesMut::with_capacity(ready);
        let mut block = [0u8; BLOCK_SIZE];
        for offset in (0..ready).step_by(BLOCK_SIZE) {
            block.copy_from_slice(&self.pending[offset..offset + BLOCK_SIZE]);
            let mut plain = self.decrypt_block(&block);
            out.extend_from_slice(&plain);
            plain.zeroize();
        }
        self.pending.drain(..ready);
        Ok(out.freeze())
    }

    fn finish(&mut self) -> CryptoResult<Bytes> {
        if self.pending.len() != BLOCK_SIZE {
            return Err(CryptoError::InvalidCiphertextLength(self.total));
        }
        let last = std::mem::take(&mut self.pending);
        let mut plain = self.decrypt_block(&last);

        let pad = plain[BLOCK_SIZE - 1] as usize;
        let valid = (1..=BLOCK_SIZE).contains(&pad)
            && plain[BLOCK_SIZE - pad..].iter().all(|b| *b as usize == pad);
        if !valid {
            plain.zeroize();
            return Err(CryptoError::InvalidPadding);
        }

        let out = Bytes::copy_from_slice(&plain[..BLOCK_SIZE - pad]);
        plain.zeroize();
        Ok(out)
    }
}

struct CbcState<T> {
    input: ByteStream,
    transform: T,
    finished: bool,
}

async fn next_chunk<T: BlockTransform>(
    mut state: CbcState<T>,
) -> CryptoResult<Option<(Bytes, CbcState<T>)>> {
    loop {
        if state.finished {
            return Ok(None);
        }
        match state.input.try_next().await? {
            Some(chunk) => {
                let out = state.transform.update(&chunk)?;
                if !out.is_empty() {
                    return Ok(Some((out, state)));
                }
            }
            None => {
                state.finished = true;
                let out = state.transform.finish()?;
                return Ok(Some((out, state)));
            }
        }
    }
}

fn transform<T: BlockTransform + 'static>(input: ByteStream, transform: T) -> ByteStream {
    let state = CbcState {
        input,
        transform,
        finished: false,
    };
    stream::try_unfold(state, next_chunk)
        .try_filter(|chunk| futures::future::ready(!chunk.is_empty()))
        .boxed()
}

/// AES-256-CBC strategy with PKCS#7 padding.
///
/// Ciphertext is always 1..=16 bytes longer than the plaintext.
#[derive(Debug, Default, Clone, Copy)]
pub struct AesCbcCrypto;

impl SymmetricCrypto for AesCbcCrypto {
    fn algorithm(&self) -> CipherAlgorithm {
        CipherAlgorithm::AesCbc
    }

    fn encrypt_stream_with(&self, plaintext: ByteStream, material: &KeyMaterial) -> ByteStream {
        transform(plaintext, CbcEncryptor::new(&material.key, &material.iv))
    }

    fn decrypt_stream(&self, ciphertext: ByteStream, key: &SymmetricKey, iv: &Iv) -> ByteStream {
        transform(ciphertext, CbcDecryptor::new(key, iv))
    }
}
