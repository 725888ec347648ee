//! Cryptographic error types.

use thiserror::Error;

/// Errors raised by key handling and the stream ciphers.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("invalid IV length: expected {expected}, got {actual}")]
    InvalidIvLength { expected: usize, actual: usize },

    #[error("invalid combined key material length: expected {expected}, got {actual}")]
    InvalidCombinedLength { expected: usize, actual: usize },

    /// Advancing the block counter would pass 2^128 and reuse keystream.
    #[error("block counter overflow: cannot advance by {blocks} blocks")]
    CounterOverflow { blocks: u64 },

    #[error("invalid ciphertext length: {0} bytes is not a positive multiple of the block size")]
    InvalidCiphertextLength(u64),

    #[error("invalid padding in final ciphertext block")]
    InvalidPadding,

    #[error("I/O error in stream: {0}")]
    Io(#[from] std::io::Error),
}

pub type CryptoResult<T> = Result<T, CryptoError>;
