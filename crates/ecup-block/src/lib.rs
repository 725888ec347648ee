//! ecup-block: content-addressed blocks for encrypted-upload metadata
//!
//! # Overview
//! - `cid`: sha2-256 CIDs for blocks and streamed files, and block verification
//! - `car`: CARv1 container with a single root, the only file format ecup owns
//! - `metadata`: the tagged `EncryptedMetadata` record describing how a
//!   ciphertext's key can be recovered

pub mod car;
pub mod cid;
pub mod error;
pub mod metadata;

pub use crate::car::{Block, CarFile};
pub use crate::cid::{cid_for, parse_cid, verify_block, CidHasher, DAG_CBOR, RAW, SHA2_256};
pub use crate::error::{BlockError, BlockResult};
pub use crate::metadata::{
    AccessControlCondition, ArchivedMetadata, EncryptedMetadata, KmsKeyInfo, KmsMetadata,
    ReturnValueTest, ThresholdMetadata, KMS_TAG, THRESHOLD_TAG,
};

/// Re-exported so dependents name the same `Cid` type.
pub use ::cid::Cid;
