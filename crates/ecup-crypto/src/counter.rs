//! 128-bit big-endian block counter for CTR mode
//!
//! The counter is kept as 16 raw bytes and advanced with explicit byte-wise
//! carry propagation, so the overflow check at the most-significant byte is
//! exact. Wrapping past 2^128 would repeat keystream blocks and is an error.

use crate::error::{CryptoError, CryptoResult};
use crate::BLOCK_SIZE;

/// An unsigned 128-bit big-endian counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Counter([u8; BLOCK_SIZE]);

impl Counter {
    pub fn from_bytes(bytes: [u8; BLOCK_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn zero() -> Self {
        Self([0u8; BLOCK_SIZE])
    }

    pub fn as_bytes(&self) -> &[u8; BLOCK_SIZE] {
        &self.0
    }

    /// Return `self + blocks`, failing with [`CryptoError::CounterOverflow`]
    /// when the carry leaves the most-significant byte.
    pub fn increment(&self, blocks: u64) -> CryptoResult<Counter> {
        let mut out = self.0;
        let mut addend = blocks;
        let mut carry: u16 = 0;

        for byte in out.iter_mut().rev() {
            if addend == 0 && carry == 0 {
                break;
            }
            let sum = u16::from(*byte) + (addend & 0xff) as u16 + carry;
            *byte = (sum & 0xff) as u8;
            carry = sum >> 8;
            addend >>= 8;
        }

        if carry != 0 || addend != 0 {
            return Err(CryptoError::CounterOverflow { blocks });
        }
        Ok(Counter(out))
    }
}

impl From<[u8; BLOCK_SIZE]> for Counter {
    fn from(bytes: [u8; BLOCK_SIZE]) -> Self {
        Self(bytes)
    }
}
