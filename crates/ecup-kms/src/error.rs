use ecup_core::KeyCustody;
use thiserror::Error;

pub type KeyWrapResult<T> = Result<T, KeyWrapError>;

#[derive(Debug, Error)]
pub enum KeyWrapError {
    #[error(
        "key-custody URL must use HTTPS, got '{url}'. \
         Plain HTTP is only permitted with allow_insecure_http in test environments."
    )]
    HttpsRequired { url: String },

    #[error("invalid key-custody URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("missing required parameters: {}", .0.join(", "))]
    MissingRequiredParameters(Vec<&'static str>),

    #[error("metadata uses the {found} strategy but this adapter implements {expected}")]
    StrategyMismatch {
        expected: KeyCustody,
        found: KeyCustody,
    },

    #[error("{name}: {message}")]
    Remote { name: String, message: String },

    #[error("unsupported key-wrap algorithm '{0}'")]
    UnsupportedAlgorithm(String),

    #[error("invalid response from key-custody service: {0}")]
    InvalidResponse(String),

    #[error("invocation signature error: {0}")]
    Signature(String),

    #[error("key wrap failed: {0}")]
    Wrap(String),

    #[error("invalid key reference: {0}")]
    InvalidKeyReference(String),

    #[error(transparent)]
    Crypto(#[from] ecup_crypto::CryptoError),

    #[error(transparent)]
    Block(#[from] ecup_block::BlockError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}
