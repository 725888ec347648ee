//! Download limits and CAR verification

use ecup_block::{CarFile, Cid};
use ecup_core::config::GatewayConfig;

use crate::client::GatewayClient;
use crate::error::{GatewayError, GatewayResult};

/// One-shot fetch against `gateway_url` with default limits and timeouts.
pub async fn fetch_and_verify(gateway_url: &str, expected_cid: &str) -> GatewayResult<Vec<u8>> {
    let config = GatewayConfig {
        url: gateway_url.to_string(),
        ..Default::default()
    };
    GatewayClient::new(&config)?
        .fetch_and_verify(expected_cid)
        .await
}

/// Buffer a response body, failing as soon as it grows past `max_size`.
pub(crate) async fn download_with_limit(
    response: reqwest::Response,
    max_size: u64,
) -> GatewayResult<Vec<u8>> {
    use futures::StreamExt;

    if let Some(declared) = response.content_length() {
        if declared > max_size {
            return Err(GatewayError::ResponseTooLarge {
                size: declared,
                limit: max_size,
            });
        }
    }

    let capacity =
        usize::try_from(response.content_length().unwrap_or(0).min(max_size)).unwrap_or(0);
    let mut bytes = Vec::with_capacity(capacity);
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        bytes.extend_from_slice(&chunk?);
        let current_size = u64::try_from(bytes.len()).unwrap_or(u64::MAX);
        if current_size > max_size {
            return Err(GatewayError::ResponseTooLarge {
                size: current_size,
                limit: max_size,
            });
        }
    }

    Ok(bytes)
}

/// Prove that `bytes` is a CAR whose root is `expected` and whose only block
/// hashes to `expected`.
///
/// A gateway that serves a different but well-formed archive fails here just
/// like one that serves garbage.
pub fn verify_car(expected: &Cid, bytes: &[u8]) -> GatewayResult<()> {
    let fail = |reason: String| GatewayError::CidVerificationFailed {
        expected: expected.to_string(),
        reason,
    };

    let car = CarFile::decode(bytes).map_err(|e| fail(e.to_string()))?;
    if car.root.to_bytes() != expected.to_bytes() {
        return Err(fail(format!("archive root is {}", car.root)));
    }
    // A metadata archive carries its root block and nothing else
    let block = match car.blocks.as_slice() {
        [only] if only.cid.to_bytes() == expected.to_bytes() => only,
        [] | [_] => return Err(fail("archive does not contain the requested block".into())),
        blocks => {
            return Err(fail(format!(
                "archive holds {} blocks, expected only the root",
                blocks.len()
            )))
        }
    };
    ecup_block::verify_block(expected, &block.data).map_err(|e| fail(e.to_string()))?;
    Ok(())
}
