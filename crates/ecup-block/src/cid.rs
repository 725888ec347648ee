//! Content identifiers for blocks and streamed files
//!
//! Every CID ecup produces is CIDv1 over a sha2-256 multihash. Metadata
//! records use the DAG-CBOR codec; ciphertext is addressed with the raw codec.

use ::cid::multihash::Multihash;
use ::cid::{Cid, Version};
use sha2::{Digest, Sha256};

use crate::error::{BlockError, BlockResult};

/// Multicodec code for DAG-CBOR.
pub const DAG_CBOR: u64 = 0x71;
/// Multicodec code for raw bytes.
pub const RAW: u64 = 0x55;
/// Multihash code for sha2-256.
pub const SHA2_256: u64 = 0x12;

fn sha256_multihash(digest: &[u8]) -> BlockResult<Multihash<64>> {
    Multihash::<64>::wrap(SHA2_256, digest).map_err(|e| BlockError::Multihash(e.to_string()))
}

/// CIDv1 of `data` under `codec`.
pub fn cid_for(codec: u64, data: &[u8]) -> BlockResult<Cid> {
    let digest = Sha256::digest(data);
    Ok(Cid::new_v1(codec, sha256_multihash(&digest)?))
}

/// Parse a textual CID (any multibase, v0 or v1).
pub fn parse_cid(input: &str) -> BlockResult<Cid> {
    input.trim().parse::<Cid>().map_err(|e| BlockError::InvalidCid {
        input: input.to_string(),
        reason: e.to_string(),
    })
}

/// Check that `data` hashes to the digest recorded in `cid`.
///
/// Only sha2-256 multihashes are accepted. The comparison is over the full
/// binary CID, so version and codec must match as well as the digest.
pub fn verify_block(cid: &Cid, data: &[u8]) -> BlockResult<()> {
    let code = cid.hash().code();
    if code != SHA2_256 {
        return Err(BlockError::UnsupportedHash(code));
    }

    let mh = sha256_multihash(&Sha256::digest(data))?;
    let recomputed = match cid.version() {
        Version::V0 => Cid::new_v0(mh).map_err(|e| BlockError::Multihash(e.to_string()))?,
        Version::V1 => Cid::new_v1(cid.codec(), mh),
    };

    if recomputed.to_bytes() != cid.to_bytes() {
        return Err(BlockError::HashMismatch {
            expected: cid.to_string(),
            actual: recomputed.to_string(),
        });
    }
    Ok(())
}

/// Incremental CID computation for data that arrives in chunks.
#[derive(Clone)]
pub struct CidHasher {
    codec: u64,
    hasher: Sha256,
    len: u64,
}

impl CidHasher {
    pub fn new(codec: u64) -> Self {
        Self {
            codec,
            hasher: Sha256::new(),
            len: 0,
        }
    }

    pub fn update(&mut self, chunk: &[u8]) {
        self.hasher.update(chunk);
        self.len += chunk.len() as u64;
    }

    /// Bytes hashed so far.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn finalize(self) -> BlockResult<Cid> {
        let digest = self.hasher.finalize();
        Ok(Cid::new_v1(self.codec, sha256_multihash(&digest)?))
    }
}
