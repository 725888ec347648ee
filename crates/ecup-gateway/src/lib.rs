//! ecup-gateway: retrieval of content-addressed blocks from untrusted HTTP gateways
//!
//! Nothing a gateway returns is trusted until its hash has been recomputed
//! and matched against the CID that was asked for.

pub mod client;
pub mod error;
pub mod fetch;

pub use client::GatewayClient;
pub use error::{GatewayError, GatewayResult};
pub use fetch::{fetch_and_verify, verify_car};
