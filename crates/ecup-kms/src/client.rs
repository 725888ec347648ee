//! Transport to the key-custody service

use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use crate::error::{KeyWrapError, KeyWrapResult};
use crate::invocation::{Receipt, SignedInvocation};

/// Sends signed invocations and returns the `ok` payload of the receipt.
#[async_trait]
pub trait KeyCustodyClient: Send + Sync {
    async fn invoke(&self, invocation: &SignedInvocation) -> KeyWrapResult<serde_json::Value>;
}

/// Parse a key-custody endpoint and enforce HTTPS.
///
/// `http` is accepted only when `allow_insecure_http` is set; every other
/// scheme (`ftp`, `ws`, `file`, `data`, ...) is always refused.
pub fn validate_endpoint(url: &str, allow_insecure_http: bool) -> KeyWrapResult<Url> {
    let parsed = Url::parse(url).map_err(|e| KeyWrapError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;

    match parsed.scheme() {
        "https" => Ok(parsed),
        "http" if allow_insecure_http => {
            tracing::warn!(
                endpoint = %url,
                "key-custody endpoint uses plaintext HTTP (allow_insecure_http is set). \
                 Never enable this outside test environments."
            );
            Ok(parsed)
        }
        _ => Err(KeyWrapError::HttpsRequired {
            url: url.to_string(),
        }),
    }
}

/// JSON-over-HTTPS client: one POST per invocation.
#[derive(Debug, Clone)]
pub struct HttpKeyCustodyClient {
    endpoint: Url,
    http: reqwest::Client,
}

impl HttpKeyCustodyClient {
    pub fn new(endpoint: Url, timeout: Duration) -> KeyWrapResult<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { endpoint, http })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl KeyCustodyClient for HttpKeyCustodyClient {
    async fn invoke(&self, invocation: &SignedInvocation) -> KeyWrapResult<serde_json::Value> {
        tracing::info!(
            endpoint = %self.endpoint,
            ability = %invocation.invocation.can,
            resource = %invocation.invocation.with,
            "invoking key-custody service"
        );

        let response = self
            .http
            .post(self.endpoint.clone())
            .json(invocation)
            .send()
            .await?;
        let status = response.status();
        let body = response.bytes().await?;

        // Services report refusals as error receipts, often with a 4xx status
        match serde_json::from_slice::<Receipt<serde_json::Value>>(&body) {
            Ok(receipt) => receipt.into_result(),
            Err(_) if !status.is_success() => Err(KeyWrapError::Remote {
                name: "HTTPError".into(),
                message: format!("key-custody service returned HTTP {status}"),
            }),
            Err(e) => Err(KeyWrapError::InvalidResponse(format!("receipt: {e}"))),
        }
    }
}
