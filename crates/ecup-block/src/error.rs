use thiserror::Error;

pub type BlockResult<T> = Result<T, BlockError>;

#[derive(Debug, Error)]
pub enum BlockError {
    #[error("invalid CID '{input}': {reason}")]
    InvalidCid { input: String, reason: String },

    #[error("unsupported multihash code 0x{0:x} (only sha2-256 is accepted)")]
    UnsupportedHash(u64),

    #[error("block hash mismatch: expected {expected}, computed {actual}")]
    HashMismatch { expected: String, actual: String },

    #[error("malformed CAR container: {0}")]
    Car(String),

    #[error("DAG-CBOR encode failed: {0}")]
    Encode(String),

    #[error("DAG-CBOR decode failed: {0}")]
    Decode(String),

    #[error("{variant} metadata is missing required field '{field}'")]
    MissingField {
        variant: &'static str,
        field: &'static str,
    },

    #[error("multihash error: {0}")]
    Multihash(String),
}
