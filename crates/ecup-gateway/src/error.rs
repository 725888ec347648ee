use thiserror::Error;

pub type GatewayResult<T> = Result<T, GatewayError>;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("invalid CID: {0}")]
    InvalidCid(String),

    #[error("invalid gateway URL '{url}': {reason}")]
    InvalidGatewayUrl { url: String, reason: String },

    #[error(
        "gateway uses plaintext HTTP ({0}), but enforce_tls is enabled. \
         Use an HTTPS gateway or set gateway.enforce_tls = false for local development."
    )]
    InsecureGateway(String),

    #[error("gateway fetch of {url} failed with HTTP status {status}")]
    FetchFailed { url: String, status: u16 },

    #[error("gateway response exceeds {limit} bytes (received {size})")]
    ResponseTooLarge { size: u64, limit: u64 },

    #[error("CID verification failed for {expected}: {reason}")]
    CidVerificationFailed { expected: String, reason: String },

    #[error("gateway returned an invalid metadata record: {0}")]
    InvalidMetadata(#[source] ecup_block::BlockError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}
