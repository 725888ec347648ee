//! In-process key-custody peers shared by the integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use ecup_block::AccessControlCondition;
use ecup_crypto::stream::from_chunks;
use ecup_crypto::ByteStream;
use ecup_kms::{
    decode_key_reference, sanitize_space_did_for_kms_key_id, Delegation, Issuer, KeyWrapError,
    KeyWrapResult, SignedInvocation, ThresholdDecryptRequest, ThresholdNetwork, AGE_X25519,
    CONTENT_DECRYPT, ENCRYPTION_SETUP, KEY_DECRYPT,
};
use ed25519_dalek::{SigningKey, VerifyingKey};
use serde_json::{json, Value};

pub const SPACE: &str = "did:key:z6MkhaXgBZDvotDkL5257faiztiGiC2QtKLGpbnnEGta2doK";
pub const SERVICE_DID: &str = "did:web:kms.test";

pub fn issuer() -> Issuer {
    Issuer::new("did:key:z6MkIssuer", SigningKey::from_bytes(&[21u8; 32]))
}

pub fn proofs() -> Vec<Delegation> {
    vec![Delegation::new("bafyreidelegation")]
}

pub fn chunked(data: &[u8], size: usize) -> ByteStream {
    from_chunks(
        data.chunks(size)
            .map(Bytes::copy_from_slice)
            .collect::<Vec<_>>(),
    )
}

#[derive(Clone)]
struct KmsState {
    identity: Arc<age::x25519::Identity>,
    provisioned: Arc<HashSet<String>>,
    issuer_key: VerifyingKey,
    calls: Arc<AtomicUsize>,
}

fn failure(status: StatusCode, name: &str, message: &str) -> (StatusCode, Json<Value>) {
    (
        status,
        Json(json!({ "error": { "name": name, "message": message } })),
    )
}

fn key_reference(space: &str) -> String {
    format!(
        "projects/test/locations/global/keyRings/spaces/cryptoKeys/{}",
        sanitize_space_did_for_kms_key_id(space)
    )
}

async fn handle(
    State(state): State<KmsState>,
    Json(signed): Json<SignedInvocation>,
) -> (StatusCode, Json<Value>) {
    state.calls.fetch_add(1, Ordering::SeqCst);

    if signed.verify(&state.issuer_key).is_err() || signed.is_expired() {
        return failure(StatusCode::UNAUTHORIZED, "Unauthorized", "invalid invocation signature");
    }
    let inv = &signed.invocation;
    if inv.aud != SERVICE_DID {
        return failure(StatusCode::BAD_REQUEST, "WrongAudience", "invocation not addressed to this service");
    }
    if !state.provisioned.contains(&inv.with) {
        return failure(StatusCode::NOT_FOUND, "SpaceNotProvisioned", "space not provisioned");
    }

    match inv.can.as_str() {
        ENCRYPTION_SETUP => (
            StatusCode::OK,
            Json(json!({ "ok": {
                "publicKey": state.identity.to_public().to_string(),
                "algorithm": AGE_X25519,
                "provider": "mock-kms",
                "keyReference": key_reference(&inv.with),
            }})),
        ),
        KEY_DECRYPT => {
            if inv.prf.is_empty() {
                return failure(StatusCode::FORBIDDEN, "Unauthorized", "missing delegation");
            }
            let key_ref = inv.nb["keyId"]
                .as_str()
                .and_then(|k| decode_key_reference(k).ok());
            if key_ref.as_deref() != Some(key_reference(&inv.with).as_str()) {
                return failure(StatusCode::NOT_FOUND, "KeyNotFound", "key not found");
            }
            let Some(wrapped) = inv.nb["encryptedSymmetricKey"]
                .as_str()
                .and_then(|s| STANDARD.decode(s).ok())
            else {
                return failure(StatusCode::BAD_REQUEST, "InvalidRequest", "encryptedSymmetricKey");
            };
            match age::decrypt(state.identity.as_ref(), &wrapped) {
                Ok(combined) => (
                    StatusCode::OK,
                    Json(json!({ "ok": { "decryptedSymmetricKey": STANDARD.encode(combined) } })),
                ),
                Err(e) => failure(StatusCode::BAD_REQUEST, "DecryptionFailed", &e.to_string()),
            }
        }
        other => failure(StatusCode::BAD_REQUEST, "UnknownAbility", other),
    }
}

pub struct MockKms {
    pub url: String,
    pub calls: Arc<AtomicUsize>,
}

impl MockKms {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// A key-custody service over plain HTTP on 127.0.0.1 that knows `spaces`.
pub async fn spawn_kms(spaces: &[&str]) -> MockKms {
    let calls = Arc::new(AtomicUsize::new(0));
    let state = KmsState {
        identity: Arc::new(age::x25519::Identity::generate()),
        provisioned: Arc::new(spaces.iter().map(|s| s.to_string()).collect()),
        issuer_key: issuer().verifying_key(),
        calls: calls.clone(),
    };
    let app = Router::new().route("/", post(handle)).with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    MockKms {
        url: format!("http://{addr}/"),
        calls,
    }
}

/// Threshold network that releases a key only to invocations on the bound space.
#[derive(Default)]
pub struct InMemoryNetwork {
    sealed: Mutex<HashMap<String, (Vec<u8>, Vec<AccessControlCondition>)>>,
    pub decrypts: AtomicUsize,
}

#[async_trait]
impl ThresholdNetwork for InMemoryNetwork {
    fn did(&self) -> &str {
        "did:web:threshold.test"
    }

    async fn encrypt(
        &self,
        plaintext: &[u8],
        conditions: &[AccessControlCondition],
    ) -> KeyWrapResult<String> {
        let mut sealed = self.sealed.lock().unwrap();
        let id = format!("sealed-{}", sealed.len());
        sealed.insert(id.clone(), (plaintext.to_vec(), conditions.to_vec()));
        Ok(id)
    }

    async fn decrypt(&self, request: &ThresholdDecryptRequest) -> KeyWrapResult<Vec<u8>> {
        self.decrypts.fetch_add(1, Ordering::SeqCst);
        let sealed = self.sealed.lock().unwrap();
        let (plaintext, conditions) =
            sealed
                .get(&request.ciphertext)
                .ok_or_else(|| KeyWrapError::Remote {
                    name: "NotFound".into(),
                    message: "unknown ciphertext".into(),
                })?;

        let inv = &request.invocation.invocation;
        let allowed = inv.can == CONTENT_DECRYPT
            && inv.aud == self.did()
            && conditions
                .iter()
                .all(|c| c.return_value_test.value == inv.with);
        if !allowed || request.access_control_conditions != *conditions {
            return Err(KeyWrapError::Remote {
                name: "AccessDenied".into(),
                message: format!("{} may not decrypt this key", inv.with),
            });
        }
        Ok(plaintext.clone())
    }
}
