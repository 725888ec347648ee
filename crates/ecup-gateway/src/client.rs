use std::time::Duration;

use ecup_block::{Cid, EncryptedMetadata};
use ecup_core::config::GatewayConfig;
use url::Url;

use crate::error::{GatewayError, GatewayResult};
use crate::fetch;

/// HTTP client bound to one gateway.
///
/// Holds only immutable configuration, so one instance can serve any number
/// of concurrent fetches.
#[derive(Debug, Clone)]
pub struct GatewayClient {
    base: Url,
    http: reqwest::Client,
    max_response_bytes: u64,
}

impl GatewayClient {
    /// Build a client from the `[gateway]` config section.
    ///
    /// Plaintext HTTP gateways are rejected when `enforce_tls` is set and
    /// logged as a warning otherwise.
    pub fn new(config: &GatewayConfig) -> GatewayResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Self::with_client(config, http)
    }

    /// Like [`new`](Self::new) but with a caller-supplied `reqwest::Client`.
    pub fn with_client(config: &GatewayConfig, http: reqwest::Client) -> GatewayResult<Self> {
        let base = Url::parse(&config.url).map_err(|e| GatewayError::InvalidGatewayUrl {
            url: config.url.clone(),
            reason: e.to_string(),
        })?;

        match base.scheme() {
            "https" => {}
            "http" => {
                if config.enforce_tls {
                    return Err(GatewayError::InsecureGateway(config.url.clone()));
                }
                tracing::warn!(
                    gateway = %config.url,
                    "gateway uses plaintext HTTP. Content is still hash-verified, but \
                     set gateway.enforce_tls = true and use HTTPS in production."
                );
            }
            other => {
                return Err(GatewayError::InvalidGatewayUrl {
                    url: config.url.clone(),
                    reason: format!("unsupported scheme '{other}'"),
                })
            }
        }

        Ok(Self {
            base,
            http,
            max_response_bytes: config.max_response_bytes,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// `{gateway}/ipfs/{cid}?format=car`
    pub fn block_url(&self, cid: &Cid) -> String {
        format!(
            "{}/ipfs/{cid}?format=car",
            self.base.as_str().trim_end_matches('/')
        )
    }

    /// Fetch the CAR for `expected_cid` and return its bytes once verified.
    ///
    /// The CID is parsed before any request is made.
    pub async fn fetch_and_verify(&self, expected_cid: &str) -> GatewayResult<Vec<u8>> {
        let expected = ecup_block::parse_cid(expected_cid)
            .map_err(|e| GatewayError::InvalidCid(e.to_string()))?;

        let url = self.block_url(&expected);
        tracing::info!(%url, "fetching block from gateway");

        let response = self.http.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::FetchFailed {
                url,
                status: status.as_u16(),
            });
        }

        let bytes = fetch::download_with_limit(response, self.max_response_bytes).await?;
        fetch::verify_car(&expected, &bytes)?;
        tracing::debug!(cid = %expected, size = bytes.len(), "gateway block verified");
        Ok(bytes)
    }

    /// Fetch, verify, and decode an encrypted metadata record.
    pub async fn fetch_metadata(&self, expected_cid: &str) -> GatewayResult<EncryptedMetadata> {
        let bytes = self.fetch_and_verify(expected_cid).await?;
        EncryptedMetadata::extract(&bytes).map_err(GatewayError::InvalidMetadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(url: &str, enforce_tls: bool) -> GatewayConfig {
        GatewayConfig {
            url: url.into(),
            enforce_tls,
            ..Default::default()
        }
    }

    #[test]
    fn test_https_gateway_accepted() {
        let client = GatewayClient::new(&config("https://w3s.link", true)).unwrap();
        let cid = ecup_block::cid_for(ecup_block::RAW, b"x").unwrap();
        assert_eq!(
            client.block_url(&cid),
            format!("https://w3s.link/ipfs/{cid}?format=car")
        );
    }

    #[test]
    fn test_http_gateway_warns_without_enforce_tls() {
        assert!(GatewayClient::new(&config("http://localhost:8080", false)).is_ok());
    }

    #[test]
    fn test_http_gateway_rejected_with_enforce_tls() {
        let err = GatewayClient::new(&config("http://insecure:8080", true)).unwrap_err();
        assert!(matches!(err, GatewayError::InsecureGateway(_)));
        assert!(err.to_string().contains("enforce_tls"));
    }

    #[test]
    fn test_bad_gateway_urls() {
        for url in ["not a url", "ftp://files.example", "file:///etc/passwd"] {
            let err = GatewayClient::new(&config(url, false)).unwrap_err();
            assert!(
                matches!(err, GatewayError::InvalidGatewayUrl { .. }),
                "{url} should be rejected"
            );
        }
    }

    #[test]
    fn test_trailing_slash_is_normalized() {
        let client = GatewayClient::new(&config("https://gw.example/", false)).unwrap();
        let cid = ecup_block::cid_for(ecup_block::RAW, b"y").unwrap();
        assert!(client
            .block_url(&cid)
            .starts_with("https://gw.example/ipfs/"));
    }
}
