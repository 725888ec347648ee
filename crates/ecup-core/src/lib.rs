pub mod config;
pub mod error;
pub mod types;

pub use error::{EcupError, EcupResult};
pub use types::{CipherAlgorithm, KeyCustody};
