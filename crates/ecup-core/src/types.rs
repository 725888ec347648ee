use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::EcupError;

/// Symmetric cipher used for the content stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CipherAlgorithm {
    /// AES-256-CTR, the current default
    #[default]
    #[serde(rename = "aes-ctr")]
    AesCtr,
    /// AES-256-CBC with PKCS#7 padding, kept to read previously issued ciphertexts
    #[serde(rename = "aes-cbc")]
    AesCbc,
}

impl CipherAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            CipherAlgorithm::AesCtr => "aes-ctr",
            CipherAlgorithm::AesCbc => "aes-cbc",
        }
    }
}

impl fmt::Display for CipherAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CipherAlgorithm {
    type Err = EcupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "aes-ctr" => Ok(CipherAlgorithm::AesCtr),
            "aes-cbc" => Ok(CipherAlgorithm::AesCbc),
            other => Err(EcupError::UnknownVariant {
                kind: "cipher algorithm",
                value: other.to_string(),
            }),
        }
    }
}

/// Which key-custody strategy wrapped a symmetric key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyCustody {
    /// Remote key-management service reached through signed capability requests
    #[serde(rename = "kms")]
    Kms,
    /// External threshold-decryption network (legacy "lit")
    #[serde(rename = "threshold-network", alias = "lit")]
    ThresholdNetwork,
}

impl KeyCustody {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyCustody::Kms => "kms",
            KeyCustody::ThresholdNetwork => "threshold-network",
        }
    }
}

impl fmt::Display for KeyCustody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyCustody {
    type Err = EcupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "kms" => Ok(KeyCustody::Kms),
            "threshold-network" | "lit" => Ok(KeyCustody::ThresholdNetwork),
            other => Err(EcupError::UnknownVariant {
                kind: "key custody strategy",
                value: other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cipher_algorithm_parse() {
        assert_eq!("aes-ctr".parse::<CipherAlgorithm>().unwrap(), CipherAlgorithm::AesCtr);
        assert_eq!("aes-cbc".parse::<CipherAlgorithm>().unwrap(), CipherAlgorithm::AesCbc);
        assert!("aes-gcm".parse::<CipherAlgorithm>().is_err());
    }

    #[test]
    fn key_custody_accepts_legacy_name() {
        assert_eq!("lit".parse::<KeyCustody>().unwrap(), KeyCustody::ThresholdNetwork);
        assert_eq!(KeyCustody::ThresholdNetwork.to_string(), "threshold-network");
    }
}
