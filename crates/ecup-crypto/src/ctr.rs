//! AES-256-CTR stream encryption
//!
//! Keystream block `i` is `AES-256(key, increment(iv, i))`, where `i` counts
//! keystream blocks generated so far across *all* chunks of the stream, never
//! the chunk's ordinal. Chunks may have any length: when a chunk ends inside a
//! keystream block, the unused tail of that block is carried into the next
//! chunk. The output is therefore identical to one-shot CTR over the
//! concatenated input, whatever the chunking, and no counter value is used twice.

use aes::cipher::{generic_array::GenericArray, BlockEncrypt, KeyInit};
use aes::Aes256;
use bytes::{Bytes, BytesMut};
use ecup_core::CipherAlgorithm;
use futures::stream::{self, StreamExt, TryStreamExt};
use zeroize::Zeroize;

use crate::counter::Counter;
use crate::error::{CryptoError, CryptoResult};
use crate::keys::{Iv, KeyMaterial, SymmetricKey};
use crate::stream::{ByteStream, SymmetricCrypto};
use crate::BLOCK_SIZE;

/// CTR keystream generator with cumulative block accounting.
pub struct CtrKeystream {
    cipher: Aes256,
    base: Counter,
    /// Keystream blocks generated so far; the next block uses `base + blocks_consumed`.
    blocks_consumed: u64,
    /// Last generated block, partially used when `carry_pos < BLOCK_SIZE`.
    carry: [u8; BLOCK_SIZE],
    carry_pos: usize,
}

impl CtrKeystream {
    pub fn new(key: &SymmetricKey, iv: &Iv) -> Self {
        Self {
            cipher: Aes256::new(key.as_bytes().into()),
            base: Counter::from_bytes(*iv.as_bytes()),
            blocks_consumed: 0,
            carry: [0u8; BLOCK_SIZE],
            carry_pos: BLOCK_SIZE,
        }
    }

    pub fn blocks_consumed(&self) -> u64 {
        self.blocks_consumed
    }

    /// XOR the next `data.len()` keystream bytes into `data`.
    pub fn apply(&mut self, data: &mut [u8]) -> CryptoResult<()> {
        let mut offset = 0;

        if self.carry_pos < BLOCK_SIZE && !data.is_empty() {
            let take = (BLOCK_SIZE - self.carry_pos).min(data.len());
            let keystream = &self.carry[self.carry_pos..self.carry_pos + take];
            xor_in_place(&mut data[..take], keystream);
            self.carry_pos += take;
            offset = take;
        }

        for block in data[offset..].chunks_mut(BLOCK_SIZE) {
            let keystream = self.next_block()?;
            xor_in_place(block, &keystream[..block.len()]);
            if block.len() < BLOCK_SIZE {
                self.carry = keystream;
                self.carry_pos = block.len();
            }
        }
        Ok(())
    }

    fn next_block(&mut self) -> CryptoResult<[u8; BLOCK_SIZE]> {
        let counter = self.base.increment(self.blocks_consumed)?;
        let mut block = GenericArray::from(*counter.as_bytes());
        self.cipher.encrypt_block(&mut block);
        self.blocks_consumed = self
            .blocks_consumed
            .checked_add(1)
            .ok_or(CryptoError::CounterOverflow {
                blocks: self.blocks_consumed,
            })?;
        Ok(block.into())
    }
}

impl Drop for CtrKeystream {
    fn drop(&mut self) {
        self.carry.zeroize();
    }
}

fn xor_in_place(data: &mut [u8], keystream: &[u8]) {
    for (byte, k) in data.iter_mut().zip(keystream) {
        *byte ^= k;
    }
}

/// Fold state threaded through the ciphertext stream.
struct CtrState {
    input: ByteStream,
    keystream: CtrKeystream,
}

async fn next_chunk(mut state: CtrState) -> CryptoResult<Option<(Bytes, CtrState)>> {
    let Some(chunk) = state.input.try_next().await? else {
        tracing::debug!(
            blocks = state.keystream.blocks_consumed(),
            "CTR stream finished"
        );
        return Ok(None);
    };
    let mut buf = BytesMut::from(&chunk[..]);
    state.keystream.apply(&mut buf)?;
    Ok(Some((buf.freeze(), state)))
}

fn transform(input: ByteStream, keystream: CtrKeystream) -> ByteStream {
    stream::try_unfold(CtrState { input, keystream }, next_chunk).boxed()
}

/// AES-256-CTR strategy. Output length always equals input length.
#[derive(Debug, Default, Clone, Copy)]
pub struct AesCtrCrypto;

impl SymmetricCrypto for AesCtrCrypto {
    fn algorithm(&self) -> CipherAlgorithm {
        CipherAlgorithm::AesCtr
    }

    fn encrypt_stream_with(&self, plaintext: ByteStream, material: &KeyMaterial) -> ByteStream {
        transform(plaintext, CtrKeystream::new(&material.key, &material.iv))
    }

    fn decrypt_stream(&self, ciphertext: ByteStream, key: &SymmetricKey, iv: &Iv) -> ByteStream {
        transform(ciphertext, CtrKeystream::new(key, iv))
    }
}
