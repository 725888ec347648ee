//! Encrypted metadata records
//!
//! A record tells a reader which key-custody strategy wrapped the content key
//! and where the ciphertext lives. Records are DAG-CBOR maps keyed by a
//! version tag, addressed by CIDv1 (dag-cbor, sha2-256), and shipped as a
//! single-root CAR archive.
//!
//! ```text
//! { "encrypted-metadata@0.1": { encryptedDataCID, identityBoundCiphertext,
//!                               plaintextKeyHash, accessControlConditions } }
//! { "encrypted-metadata@0.2": { encryptedDataCID, encryptedSymmetricKey,
//!                               space, kms: { provider, keyId, algorithm } } }
//! ```

use ::cid::Cid;
use ecup_core::KeyCustody;
use serde::{Deserialize, Serialize};

use crate::car::{Block, CarFile};
use crate::cid::{cid_for, DAG_CBOR};
use crate::error::{BlockError, BlockResult};

pub const THRESHOLD_TAG: &str = "encrypted-metadata@0.1";
pub const KMS_TAG: &str = "encrypted-metadata@0.2";

/// Comparison the threshold network evaluates before releasing a key share.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnValueTest {
    pub comparator: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessControlCondition {
    pub contract_address: String,
    pub standard_contract_type: String,
    pub chain: String,
    pub method: String,
    pub parameters: Vec<String>,
    pub return_value_test: ReturnValueTest,
}

impl AccessControlCondition {
    /// Release the key only to a caller that proves authority over `space_did`.
    pub fn space_authority(space_did: &str) -> Self {
        Self {
            contract_address: String::new(),
            standard_contract_type: String::new(),
            chain: "ethereum".into(),
            method: String::new(),
            parameters: vec![":currentActionIpfsId".into(), space_did.into()],
            return_value_test: ReturnValueTest {
                comparator: "=".into(),
                value: space_did.into(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KmsKeyInfo {
    pub provider: String,
    pub key_id: String,
    pub algorithm: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KmsMetadata {
    #[serde(rename = "encryptedDataCID")]
    pub encrypted_data_cid: Cid,
    pub encrypted_symmetric_key: String,
    pub space: String,
    pub kms: KmsKeyInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdMetadata {
    #[serde(rename = "encryptedDataCID")]
    pub encrypted_data_cid: Cid,
    /// The wrapped key material, decryptable only by the network.
    pub identity_bound_ciphertext: String,
    pub plaintext_key_hash: String,
    pub access_control_conditions: Vec<AccessControlCondition>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EncryptedMetadata {
    #[serde(rename = "encrypted-metadata@0.1")]
    ThresholdNetwork(ThresholdMetadata),
    #[serde(rename = "encrypted-metadata@0.2")]
    Kms(KmsMetadata),
}

/// A metadata record encoded as a CAR archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivedMetadata {
    pub cid: Cid,
    pub bytes: Vec<u8>,
}

fn require(variant: &'static str, field: &'static str, value: &str) -> BlockResult<()> {
    if value.trim().is_empty() {
        return Err(BlockError::MissingField { variant, field });
    }
    Ok(())
}

impl EncryptedMetadata {
    /// Build a validated KMS record.
    pub fn kms(fields: KmsMetadata) -> BlockResult<Self> {
        let record = Self::Kms(fields);
        record.validate()?;
        Ok(record)
    }

    /// Build a validated threshold-network record.
    pub fn threshold_network(fields: ThresholdMetadata) -> BlockResult<Self> {
        let record = Self::ThresholdNetwork(fields);
        record.validate()?;
        Ok(record)
    }

    pub fn validate(&self) -> BlockResult<()> {
        match self {
            Self::Kms(m) => {
                require(KMS_TAG, "encryptedSymmetricKey", &m.encrypted_symmetric_key)?;
                require(KMS_TAG, "space", &m.space)?;
                require(KMS_TAG, "kms.provider", &m.kms.provider)?;
                require(KMS_TAG, "kms.keyId", &m.kms.key_id)?;
                require(KMS_TAG, "kms.algorithm", &m.kms.algorithm)
            }
            Self::ThresholdNetwork(m) => {
                require(
                    THRESHOLD_TAG,
                    "identityBoundCiphertext",
                    &m.identity_bound_ciphertext,
                )?;
                require(THRESHOLD_TAG, "plaintextKeyHash", &m.plaintext_key_hash)?;
                if m.access_control_conditions.is_empty() {
                    return Err(BlockError::MissingField {
                        variant: THRESHOLD_TAG,
                        field: "accessControlConditions",
                    });
                }
                Ok(())
            }
        }
    }

    pub fn strategy(&self) -> KeyCustody {
        match self {
            Self::Kms(_) => KeyCustody::Kms,
            Self::ThresholdNetwork(_) => KeyCustody::ThresholdNetwork,
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Self::Kms(_) => KMS_TAG,
            Self::ThresholdNetwork(_) => THRESHOLD_TAG,
        }
    }

    pub fn encrypted_data_cid(&self) -> &Cid {
        match self {
            Self::Kms(m) => &m.encrypted_data_cid,
            Self::ThresholdNetwork(m) => &m.encrypted_data_cid,
        }
    }

    /// The wrapped key material in its strategy-specific transport encoding.
    pub fn encrypted_symmetric_key(&self) -> &str {
        match self {
            Self::Kms(m) => &m.encrypted_symmetric_key,
            Self::ThresholdNetwork(m) => &m.identity_bound_ciphertext,
        }
    }

    /// Canonical DAG-CBOR block for this record.
    pub fn to_block(&self) -> BlockResult<Block> {
        let data = serde_ipld_dagcbor::to_vec(self).map_err(|e| BlockError::Encode(e.to_string()))?;
        let cid = cid_for(DAG_CBOR, &data)?;
        Ok(Block { cid, data })
    }

    /// Encode as a single-root CAR. Identical records yield identical CIDs and bytes.
    pub fn archive(&self) -> BlockResult<ArchivedMetadata> {
        self.validate()?;
        let block = self.to_block()?;
        let cid = block.cid;
        let bytes = CarFile::new(cid, vec![block]).encode()?;
        tracing::debug!(%cid, tag = self.tag(), size = bytes.len(), "archived metadata");
        Ok(ArchivedMetadata { cid, bytes })
    }

    /// Decode a record from the CAR produced by [`archive`](Self::archive).
    ///
    /// The root block must be present and hash to the root CID.
    pub fn extract(car_bytes: &[u8]) -> BlockResult<Self> {
        let car = CarFile::decode(car_bytes)?;
        let block = car.verified_root()?;
        Self::from_block(&block.data)
    }

    /// Decode a record from raw DAG-CBOR block bytes.
    pub fn from_block(data: &[u8]) -> BlockResult<Self> {
        let record: Self =
            serde_ipld_dagcbor::from_slice(data).map_err(|e| BlockError::Decode(e.to_string()))?;
        record.validate()?;
        Ok(record)
    }

    /// Human-readable view with CIDs rendered as strings.
    pub fn to_json(&self) -> serde_json::Value {
        let body = match self {
            Self::Kms(m) => serde_json::json!({
                "encryptedDataCID": m.encrypted_data_cid.to_string(),
                "encryptedSymmetricKey": m.encrypted_symmetric_key,
                "space": m.space,
                "kms": {
                    "provider": m.kms.provider,
                    "keyId": m.kms.key_id,
                    "algorithm": m.kms.algorithm,
                },
            }),
            Self::ThresholdNetwork(m) => serde_json::json!({
                "encryptedDataCID": m.encrypted_data_cid.to_string(),
                "identityBoundCiphertext": m.identity_bound_ciphertext,
                "plaintextKeyHash": m.plaintext_key_hash,
                "accessControlConditions": m.access_control_conditions,
            }),
        };
        serde_json::json!({ self.tag(): body })
    }
}
