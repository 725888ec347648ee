//! Threshold-network strategy with an in-memory network peer.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use common::{chunked, issuer, proofs, InMemoryNetwork, SPACE};
use ecup_block::{cid_for, EncryptedMetadata, KmsKeyInfo, KmsMetadata, RAW};
use ecup_core::{CipherAlgorithm, KeyCustody};
use ecup_crypto::cipher_for;
use ecup_crypto::stream::collect;
use ecup_kms::{CryptoAdapter, DecryptionConfig, EncryptionConfig, KeyWrapError, ThresholdKeyWrap};

fn adapter(network: Arc<InMemoryNetwork>) -> CryptoAdapter {
    CryptoAdapter::new(
        cipher_for(CipherAlgorithm::AesCtr),
        Arc::new(ThresholdKeyWrap::new(network)),
    )
}

#[tokio::test]
async fn roundtrip_with_space_bound_conditions() {
    let network = Arc::new(InMemoryNetwork::default());
    let adapter = adapter(network.clone());
    assert_eq!(adapter.strategy(), KeyCustody::ThresholdNetwork);

    let plaintext = b"threshold-bound content key".repeat(40);
    let encrypted = adapter.encrypt_stream(chunked(&plaintext, 15));
    let material = encrypted.key_material;
    let ciphertext = collect(encrypted.ciphertext).await.unwrap();

    let wrapped = adapter
        .encrypt_symmetric_key(
            &material,
            &EncryptionConfig {
                space: Some(SPACE.into()),
                issuer: Some(issuer()),
                proofs: proofs(),
            },
        )
        .await
        .unwrap();
    let archived = wrapped
        .into_metadata(cid_for(RAW, &ciphertext).unwrap())
        .unwrap()
        .archive()
        .unwrap();
    let metadata = EncryptedMetadata::extract(&archived.bytes).unwrap();
    assert_eq!(metadata.strategy(), KeyCustody::ThresholdNetwork);

    let config = DecryptionConfig {
        space: Some(SPACE.into()),
        issuer: Some(issuer()),
        proofs: proofs(),
        metadata,
    };
    let decrypted = adapter
        .decrypt_with_metadata(chunked(&ciphertext, 65), &config)
        .await
        .unwrap();
    assert_eq!(collect(decrypted).await.unwrap(), plaintext);
    assert_eq!(network.decrypts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn other_space_is_denied() {
    let network = Arc::new(InMemoryNetwork::default());
    let adapter = adapter(network);

    let material = ecup_crypto::generate_key_material();
    let wrapped = adapter
        .encrypt_symmetric_key(
            &material,
            &EncryptionConfig {
                space: Some(SPACE.into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let key = wrapped.encrypted_key.clone();
    let metadata = wrapped
        .into_metadata(cid_for(RAW, b"ct").unwrap())
        .unwrap();

    let config = DecryptionConfig {
        space: Some("did:key:z6MkSomeoneElse".into()),
        issuer: Some(issuer()),
        proofs: proofs(),
        metadata,
    };
    let err = adapter.decrypt_symmetric_key(&key, &config).await.unwrap_err();
    assert!(matches!(err, KeyWrapError::Remote { ref name, .. } if name == "AccessDenied"));
}

#[tokio::test]
async fn kms_metadata_is_rejected_by_threshold_adapter() {
    let network = Arc::new(InMemoryNetwork::default());
    let adapter = adapter(network.clone());

    let metadata = EncryptedMetadata::kms(KmsMetadata {
        encrypted_data_cid: cid_for(RAW, b"ct").unwrap(),
        encrypted_symmetric_key: "d3JhcHBlZA".into(),
        space: SPACE.into(),
        kms: KmsKeyInfo {
            provider: "mock-kms".into(),
            key_id: "a2V5".into(),
            algorithm: "age-x25519".into(),
        },
    })
    .unwrap();
    let config = DecryptionConfig {
        space: Some(SPACE.into()),
        issuer: Some(issuer()),
        proofs: proofs(),
        metadata,
    };

    let err = adapter
        .decrypt_symmetric_key("d3JhcHBlZA", &config)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        KeyWrapError::StrategyMismatch {
            expected: KeyCustody::ThresholdNetwork,
            found: KeyCustody::Kms,
        }
    ));
    assert_eq!(network.decrypts.load(Ordering::SeqCst), 0);
}
