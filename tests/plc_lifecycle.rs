// tests/plc_lifecycle.rs
//! Create / update / deactivate against the in-memory directory.

mod common;

use common::{public_only, MemoryDirectory};
use did_plc::models::identity::latest_valid;
use did_plc::utils::crypto::is_did_plc;
use did_plc::wallet::signer::verify_operation;
use did_plc::{
    Curve, IdentityState, KeyHandle, Lifecycle, PlcClient, PlcError, RetryPolicy, Service,
};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

fn client() -> PlcClient<MemoryDirectory> {
    PlcClient::new(MemoryDirectory::new(), RetryPolicy::immediate(3, 2))
}

async fn created(client: &PlcClient<MemoryDirectory>, keys: Vec<KeyHandle>) -> IdentityState {
    let mut state = IdentityState::new(keys);
    client.create(&mut state).await.unwrap();
    state
}

#[tokio::test]
async fn test_create_single_key() {
    let client = client();
    let mut state = IdentityState::new(vec![KeyHandle::generate(Curve::P256)]);

    let did = client.create(&mut state).await.unwrap();
    assert!(is_did_plc(&did), "{did}");
    assert_eq!(state.did.as_deref(), Some(did.as_str()));

    let log = client.directory().log(&did);
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].operation.prev(), None);
    assert_eq!(state.log, log);
    assert_eq!(state.lifecycle(), Lifecycle::Active);
    client.verify(&state).await.unwrap();
}

#[tokio::test]
async fn test_update_chains_to_genesis() {
    let client = client();
    let mut state = created(
        &client,
        vec![KeyHandle::generate(Curve::P256), KeyHandle::generate(Curve::Secp256k1)],
    )
    .await;
    let did = state.did.clone().unwrap();

    let signing = KeyHandle::generate(Curve::Secp256k1);
    state
        .verification_methods
        .insert("atproto".into(), signing.clone());
    state.also_known_as.push("at://alice.test".into());
    state.services.insert(
        "atproto_pds".into(),
        Service::new("AtprotoPersonalDataServer", "https://pds.test"),
    );
    client.update(&mut state).await.unwrap();

    let log = client.directory().log(&did);
    assert_eq!(log.len(), 2);
    assert_eq!(log[1].operation.prev(), Some(log[0].cid.as_str()));
    assert_eq!(latest_valid(&state.log).unwrap().cid, log[1].cid);
    client.verify(&state).await.unwrap();

    let mut fetched = IdentityState::for_did(did.clone());
    client.fetch_data(&mut fetched).await.unwrap();
    assert_eq!(fetched.also_known_as, vec!["at://alice.test".to_string()]);
    assert_eq!(fetched.services["atproto_pds"].endpoint, "https://pds.test");
    assert_eq!(fetched.rotation_keys.len(), 2);
    assert_eq!(
        fetched.verification_methods["atproto"].to_did_string(),
        signing.to_did_string()
    );
}

#[tokio::test]
async fn test_deactivate_then_update_fails() {
    let client = client();
    let mut state = created(&client, vec![KeyHandle::generate(Curve::P256)]).await;
    let did = state.did.clone().unwrap();

    client.deactivate(&mut state).await.unwrap();
    let head = latest_valid(&state.log).unwrap();
    assert!(head.operation.is_tombstone());
    assert_eq!(state.lifecycle(), Lifecycle::Tombstoned);

    let before = client.directory().submissions();
    assert!(matches!(
        client.update(&mut state).await,
        Err(PlcError::NoPriorOperation)
    ));
    assert!(matches!(
        client.deactivate(&mut state).await,
        Err(PlcError::NoPriorOperation)
    ));
    assert_eq!(client.directory().submissions(), before);
    assert_eq!(client.directory().log(&did).len(), 2);
}

#[tokio::test]
async fn test_update_unknown_did_submits_nothing() {
    let client = client();
    let mut state = IdentityState::new(vec![KeyHandle::generate(Curve::P256)]);
    state.did = Some("did:plc:abcdefghijklmnopqrstuvwx".into());

    assert!(matches!(
        client.update(&mut state).await,
        Err(PlcError::NoPriorOperation)
    ));
    assert_eq!(client.directory().submissions(), 0);
    assert!(state.log.is_empty());
}

#[tokio::test]
async fn test_create_is_deterministic_and_detects_existing() {
    let client = client();
    let key = KeyHandle::generate(Curve::Secp256k1);
    let first = created(&client, vec![key.clone()]).await;

    let mut again = IdentityState::new(vec![key]);
    match client.create(&mut again).await {
        Err(PlcError::AlreadyExists(did)) => assert_eq!(Some(did), first.did),
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(client.directory().submissions(), 1);
}

#[tokio::test]
async fn test_create_retries_same_operation() {
    let client = client();
    client.directory().fail_next(2);
    let mut state = IdentityState::new(vec![KeyHandle::generate(Curve::P256)]);

    let did = client.create(&mut state).await.unwrap();
    assert_eq!(client.directory().submissions(), 3);
    assert_eq!(client.directory().log(&did).len(), 1);
}

#[tokio::test]
async fn test_create_retries_exceeded() {
    let client = client();
    client.directory().fail_next(10);
    let mut state = IdentityState::new(vec![KeyHandle::generate(Curve::P256)]);

    match client.create(&mut state).await {
        Err(PlcError::CreateRetriesExceeded { attempts }) => {
            assert_eq!(attempts.len(), 3);
            assert!(attempts[0].reason.contains("503"));
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(client.directory().submissions(), 3);
}

#[tokio::test]
async fn test_update_falls_back_to_next_key() {
    let client = client();
    let k1 = KeyHandle::generate(Curve::P256);
    let k2 = KeyHandle::generate(Curve::Secp256k1);
    let mut state = created(&client, vec![k1.clone(), k2.clone()]).await;

    client.directory().fail_next(1);
    state.also_known_as.push("at://bob.test".into());
    client.update(&mut state).await.unwrap();

    let head = latest_valid(&state.log).unwrap();
    assert!(verify_operation(&head.operation, &k2).unwrap());
    assert!(!verify_operation(&head.operation, &k1).unwrap());
}

#[tokio::test]
async fn test_update_skips_keys_that_cannot_sign() {
    let client = client();
    let signer = KeyHandle::generate(Curve::P256);
    let mut state = created(&client, vec![public_only(Curve::P256), signer.clone()]).await;
    let submitted = client.directory().submissions();

    state.also_known_as.push("at://carol.test".into());
    client.update(&mut state).await.unwrap();

    // the public-only key never reaches the directory
    assert_eq!(client.directory().submissions(), submitted + 1);
    let head = latest_valid(&state.log).unwrap();
    assert!(verify_operation(&head.operation, &signer).unwrap());
}

#[tokio::test]
async fn test_update_retries_exceeded_lists_every_attempt() {
    let client = client();
    let mut state = created(
        &client,
        vec![KeyHandle::generate(Curve::P256), KeyHandle::generate(Curve::P256)],
    )
    .await;

    client.directory().fail_next(100);
    match client.update(&mut state).await {
        Err(PlcError::UpdateRetriesExceeded { attempts }) => {
            let keys: Vec<_> = attempts.iter().map(|a| a.key_index).collect();
            assert_eq!(keys, vec![Some(0), Some(1), Some(0), Some(1)]);
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn test_deactivate_retries_exceeded() {
    let client = client();
    let mut state = created(&client, vec![KeyHandle::generate(Curve::Secp256k1)]).await;

    client.directory().fail_next(100);
    match client.deactivate(&mut state).await {
        Err(PlcError::DeactivateRetriesExceeded { attempts }) => assert_eq!(attempts.len(), 2),
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(state.lifecycle(), Lifecycle::Active);
}

#[tokio::test]
async fn test_cancelled_before_submission() {
    let token = CancellationToken::new();
    let client = PlcClient::new(MemoryDirectory::new(), RetryPolicy::immediate(3, 2))
        .with_cancellation(token.clone());
    token.cancel();

    let mut state = IdentityState::new(vec![KeyHandle::generate(Curve::P256)]);
    assert!(matches!(client.create(&mut state).await, Err(PlcError::Cancelled)));
    assert_eq!(client.directory().submissions(), 0);
}

#[tokio::test]
async fn test_cancelled_during_backoff() {
    let token = CancellationToken::new();
    let policy = RetryPolicy {
        initial_backoff: Duration::from_secs(60),
        max_backoff: Duration::from_secs(60),
        ..RetryPolicy::immediate(3, 2)
    };
    let client = PlcClient::new(MemoryDirectory::new(), policy).with_cancellation(token.clone());
    let mut state = created(&client, vec![KeyHandle::generate(Curve::P256)]).await;
    let before = state.log.clone();
    let submitted = client.directory().submissions();

    client.directory().fail_next(100);
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let started = Instant::now();
    assert!(matches!(client.update(&mut state).await, Err(PlcError::Cancelled)));
    assert!(started.elapsed() < Duration::from_secs(5), "{:?}", started.elapsed());
    assert_eq!(state.log, before);
    assert_eq!(client.directory().submissions(), submitted + 1);
}

#[tokio::test]
async fn test_forged_history_is_rejected() {
    let client = client();
    let mut state = created(&client, vec![KeyHandle::generate(Curve::P256)]).await;
    let did = state.did.clone().unwrap();

    // swap in another identity's log under this DID
    let other = created(&client, vec![KeyHandle::generate(Curve::P256)]).await;
    client
        .directory()
        .insert_raw(&did, client.directory().log(other.did.as_deref().unwrap()));

    assert!(matches!(client.update(&mut state).await, Err(PlcError::Audit(_))));
}

#[tokio::test]
async fn test_resolve_yields_public_keys() {
    let client = client();
    let key = KeyHandle::generate(Curve::P256);
    let state = created(&client, vec![key.clone()]).await;

    let resolved = client.resolve(state.did.as_deref().unwrap()).await.unwrap();
    assert_eq!(resolved.rotation_keys[0].to_did_string(), key.to_did_string());
    assert!(!resolved.rotation_keys[0].can_sign());
    assert_eq!(resolved.log.len(), 1);
}
