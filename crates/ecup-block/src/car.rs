//! CARv1 containers
//!
//! Layout: `varint(len) header` followed by `varint(len) cid data` sections,
//! where the header is the DAG-CBOR map `{ roots: [cid], version: 1 }`.
//! ecup always writes exactly one root and reads only single-root archives.

use ::cid::Cid;
use serde::{Deserialize, Serialize};

use crate::cid::verify_block;
use crate::error::{BlockError, BlockResult};

const CAR_VERSION: u64 = 1;
const MAX_VARINT_LEN: usize = 10;

#[derive(Debug, Serialize, Deserialize)]
struct CarHeader {
    roots: Vec<Cid>,
    version: u64,
}

/// One content-addressed block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub cid: Cid,
    pub data: Vec<u8>,
}

/// A decoded single-root CAR archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CarFile {
    pub root: Cid,
    pub blocks: Vec<Block>,
}

impl CarFile {
    pub fn new(root: Cid, blocks: Vec<Block>) -> Self {
        Self { root, blocks }
    }

    pub fn get(&self, cid: &Cid) -> Option<&Block> {
        self.blocks.iter().find(|b| &b.cid == cid)
    }

    /// The block named by the header root, if the archive carries it.
    pub fn root_block(&self) -> Option<&Block> {
        self.get(&self.root)
    }

    /// Root block after checking its bytes against the root CID.
    pub fn verified_root(&self) -> BlockResult<&Block> {
        let block = self
            .root_block()
            .ok_or_else(|| BlockError::Car(format!("root block {} not present", self.root)))?;
        verify_block(&block.cid, &block.data)?;
        Ok(block)
    }

    pub fn encode(&self) -> BlockResult<Vec<u8>> {
        let header = serde_ipld_dagcbor::to_vec(&CarHeader {
            roots: vec![self.root],
            version: CAR_VERSION,
        })
        .map_err(|e| BlockError::Encode(e.to_string()))?;

        let mut out = Vec::with_capacity(
            header.len() + self.blocks.iter().map(|b| b.data.len() + 48).sum::<usize>(),
        );
        write_varint(&mut out, header.len() as u64);
        out.extend_from_slice(&header);

        for block in &self.blocks {
            let cid = block.cid.to_bytes();
            write_varint(&mut out, (cid.len() + block.data.len()) as u64);
            out.extend_from_slice(&cid);
            out.extend_from_slice(&block.data);
        }
        Ok(out)
    }

    /// Parse an archive. Block bytes are not hashed here; see [`verify_block`].
    pub fn decode(bytes: &[u8]) -> BlockResult<Self> {
        let mut rest = bytes;

        let header_bytes = read_section(&mut rest)?
            .ok_or_else(|| BlockError::Car("empty archive".into()))?;
        let header: CarHeader = serde_ipld_dagcbor::from_slice(header_bytes)
            .map_err(|e| BlockError::Car(format!("header: {e}")))?;
        if header.version != CAR_VERSION {
            return Err(BlockError::Car(format!(
                "unsupported CAR version {}",
                header.version
            )));
        }
        let root = match header.roots.as_slice() {
            [root] => *root,
            roots => {
                return Err(BlockError::Car(format!(
                    "expected exactly one root, found {}",
                    roots.len()
                )))
            }
        };

        let mut blocks = Vec::new();
        while let Some(section) = read_section(&mut rest)? {
            let mut cursor = std::io::Cursor::new(section);
            let cid = Cid::read_bytes(&mut cursor)
                .map_err(|e| BlockError::Car(format!("block CID: {e}")))?;
            let offset = cursor.position() as usize;
            blocks.push(Block {
                cid,
                data: section[offset..].to_vec(),
            });
        }

        Ok(Self { root, blocks })
    }
}

fn write_varint(out: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        out.push((value as u8 & 0x7f) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

/// Unsigned LEB128; `None` at end of input.
fn read_varint(input: &mut &[u8]) -> BlockResult<Option<u64>> {
    if input.is_empty() {
        return Ok(None);
    }
    let mut value = 0u64;
    for (i, byte) in input.iter().enumerate().take(MAX_VARINT_LEN) {
        let bits = u64::from(byte & 0x7f);
        if i == MAX_VARINT_LEN - 1 && bits > 1 {
            return Err(BlockError::Car("varint overflows u64".into()));
        }
        value |= bits << (7 * i);
        if byte & 0x80 == 0 {
            *input = &input[i + 1..];
            return Ok(Some(value));
        }
    }
    Err(BlockError::Car("truncated varint".into()))
}

fn read_section<'a>(input: &mut &'a [u8]) -> BlockResult<Option<&'a [u8]>> {
    let Some(len) = read_varint(input)? else {
        return Ok(None);
    };
    let len = usize::try_from(len).map_err(|_| BlockError::Car("section too large".into()))?;
    if len == 0 {
        return Err(BlockError::Car("zero-length section".into()));
    }
    if len > input.len() {
        return Err(BlockError::Car(format!(
            "section of {len} bytes exceeds remaining {} bytes",
            input.len()
        )));
    }
    let (section, tail) = input.split_at(len);
    *input = tail;
    Ok(Some(section))
}
