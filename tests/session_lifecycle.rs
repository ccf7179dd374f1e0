mod common;

use chrono::Utc;
use common::*;
use r2_session_vault::error::AppError;
use r2_session_vault::models::session::SessionRecord;
use r2_session_vault::store::kv::session_key;
use r2_session_vault::{Credentials, SessionStore};

#[tokio::test]
async fn login_then_validate_returns_the_credentials() {
    let (state, _) = memory_state(&test_config());

    let issued = state.sessions.login(&CREDENTIALS).await.unwrap();
    assert!(issued.expires_at > Utc::now());
    assert!(!issued.token.is_empty());

    let session = state.sessions.validate(&issued.token).await.unwrap();
    assert_eq!(session.credentials.account_id, "a1b2c3d4e5f678901234567890123456");
    assert_eq!(session.credentials.access_key_id, "12345678901234567890");
    assert_eq!(session.credentials.secret_access_key, "1234567890123456789012345678901234567890");
    assert_eq!(session.credentials.bucket_name, "test-bucket");
    assert_eq!(session.expires_at, issued.expires_at);
    assert!(session.created_at < session.expires_at);

    let claims = state.sessions.inspect_token(&issued.token).unwrap();
    assert_eq!(session.user_id, claims.sub);
}

#[tokio::test]
async fn login_writes_one_encrypted_record_with_ttl() {
    let (state, store) = memory_state(&test_config());
    let issued = state.sessions.login(&CREDENTIALS).await.unwrap();

    let sessions = store.keys_with_prefix("session:").await;
    assert_eq!(sessions.len(), 1);

    let claims = state.sessions.inspect_token(&issued.token).unwrap();
    assert_eq!(sessions[0], session_key(&claims.sid));

    let raw = store.get(&sessions[0]).await.unwrap().unwrap();
    let text = String::from_utf8(raw.clone()).unwrap();
    assert!(!text.contains(&CREDENTIALS.secret_access_key));
    assert!(!text.contains(&CREDENTIALS.access_key_id));

    let record: SessionRecord = sonic_rs::from_slice(&raw).unwrap();
    assert_eq!(record.ttl_seconds(), 24 * 3600);
    assert_eq!(record.encrypted_credentials.key_version, 1);
}

#[tokio::test]
async fn login_rejects_blank_credentials() {
    let (state, store) = memory_state(&test_config());
    let blank = Credentials::new("acct", "", "secret", "bucket");

    assert!(matches!(
        state.sessions.login(&blank).await,
        Err(AppError::Validation(_))
    ));
    assert!(store.keys_with_prefix("session:").await.is_empty());
}

#[tokio::test]
async fn login_fails_when_store_is_down() {
    let (state, store) = flaky_state(&test_config());
    state.registry.current_key().await.unwrap();
    store.fail_sessions(true);

    let err = state.sessions.login(&CREDENTIALS).await.unwrap_err();
    assert!(matches!(err, AppError::SessionCreationFailed(_)));
}

#[tokio::test]
async fn invalid_tokens_are_rejected_without_touching_the_store() {
    let (state, store) = flaky_state(&test_config());
    let reads = store.reads();

    assert!(state.sessions.validate("garbage").await.is_none());
    assert!(state.sessions.validate("").await.is_none());
    assert!(matches!(
        state.sessions.authenticate("a.b.c").await,
        Err(AppError::InvalidToken)
    ));
    assert_eq!(store.reads(), reads);
}

#[tokio::test]
async fn tokens_from_another_deployment_are_rejected() {
    let (state, _) = memory_state(&test_config());
    let foreign = test_config().with_token_signing_secret("a-completely-different-signing-secret!");
    let (other, _) = memory_state(&foreign);

    let issued = other.sessions.login(&CREDENTIALS).await.unwrap();
    assert!(state.sessions.validate(&issued.token).await.is_none());
}

#[tokio::test]
async fn store_outage_during_validate_denies() {
    let (state, store) = flaky_state(&test_config());
    let issued = state.sessions.login(&CREDENTIALS).await.unwrap();

    store.fail_sessions(true);
    assert!(state.sessions.validate(&issued.token).await.is_none());
    assert!(state.sessions.authenticate(&issued.token).await.unwrap_err().is_retryable());

    // The session survives the outage.
    store.fail_sessions(false);
    assert!(state.sessions.validate(&issued.token).await.is_some());
}

#[tokio::test]
async fn key_metadata_outage_still_validates_primary_key_sessions() {
    let (state, store) = flaky_state(&test_config());
    let issued = state.sessions.login(&CREDENTIALS).await.unwrap();

    store.fail_reads_of(Some("key_metadata:"));
    let session = state.sessions.validate(&issued.token).await.unwrap();
    assert_eq!(session.credentials, *CREDENTIALS);
}

#[tokio::test]
async fn key_metadata_outage_does_not_purge_rotated_sessions() {
    let (state, store) = flaky_state(&test_config());
    state.registry.rotate_key(SECOND_KEY).await.unwrap();
    let issued = state.sessions.login(&CREDENTIALS).await.unwrap();
    let sid = state.sessions.inspect_token(&issued.token).unwrap().sid;

    // Only the primary key is known during the outage; it cannot open a v2 payload.
    store.fail_reads_of(Some("key_metadata:"));
    let err = state.sessions.authenticate(&issued.token).await.unwrap_err();
    assert!(matches!(err, AppError::RegistryUnavailable(_)));
    assert!(err.is_retryable());
    assert!(store.inner.get(&session_key(&sid)).await.unwrap().is_some());

    store.fail_reads_of(None);
    assert!(state.sessions.validate(&issued.token).await.is_some());
}

#[tokio::test]
async fn expired_record_is_rejected_and_deleted() {
    let (state, store) = memory_state(&test_config());
    let issued = state.sessions.login(&CREDENTIALS).await.unwrap();
    let claims = state.sessions.inspect_token(&issued.token).unwrap();
    let key = session_key(&claims.sid);

    // The store has not evicted it yet, but the record says it is expired.
    let mut record: SessionRecord = sonic_rs::from_slice(&store.get(&key).await.unwrap().unwrap()).unwrap();
    record.expires_at = Utc::now() - chrono::Duration::hours(1);
    store.put(&key, sonic_rs::to_vec(&record).unwrap(), 3600).await.unwrap();

    assert!(state.sessions.validate(&issued.token).await.is_none());
    assert!(store.get(&key).await.unwrap().is_none());
    assert!(state.sessions.validate(&issued.token).await.is_none());
}

#[tokio::test]
async fn undecryptable_session_is_purged() {
    let (state, store) = memory_state(&test_config());
    let issued = state.sessions.login(&CREDENTIALS).await.unwrap();
    let claims = state.sessions.inspect_token(&issued.token).unwrap();
    let key = session_key(&claims.sid);

    let mut record: SessionRecord = sonic_rs::from_slice(&store.get(&key).await.unwrap().unwrap()).unwrap();
    record.encrypted_credentials.ciphertext[0] ^= 0xff;
    store.put(&key, sonic_rs::to_vec(&record).unwrap(), 3600).await.unwrap();

    assert!(matches!(
        state.sessions.authenticate(&issued.token).await,
        Err(AppError::DecryptionFailed)
    ));
    assert!(store.get(&key).await.unwrap().is_none());
}

#[tokio::test]
async fn record_owned_by_another_user_is_rejected() {
    let (state, store) = memory_state(&test_config());
    let issued = state.sessions.login(&CREDENTIALS).await.unwrap();
    let claims = state.sessions.inspect_token(&issued.token).unwrap();
    let key = session_key(&claims.sid);

    let mut record: SessionRecord = sonic_rs::from_slice(&store.get(&key).await.unwrap().unwrap()).unwrap();
    record.user_id = uuid::Uuid::new_v4();
    store.put(&key, sonic_rs::to_vec(&record).unwrap(), 3600).await.unwrap();

    assert!(state.sessions.validate(&issued.token).await.is_none());
}

#[tokio::test]
async fn revoke_is_idempotent() {
    let (state, _) = memory_state(&test_config());
    let issued = state.sessions.login(&CREDENTIALS).await.unwrap();

    assert!(state.sessions.revoke(&issued.token).await.unwrap());
    assert!(state.sessions.validate(&issued.token).await.is_none());
    assert!(state.sessions.revoke(&issued.token).await.unwrap());

    assert!(!state.sessions.revoke("not-a-token").await.unwrap());
}

#[tokio::test]
async fn revoke_surfaces_store_failures() {
    let (state, store) = flaky_state(&test_config());
    let issued = state.sessions.login(&CREDENTIALS).await.unwrap();

    store.fail_sessions(true);
    let err = state.sessions.revoke(&issued.token).await.unwrap_err();
    assert!(matches!(err, AppError::Store(_)));
}

#[tokio::test]
async fn refresh_replaces_the_session() {
    let (state, store) = memory_state(&test_config());
    let issued = state.sessions.login(&CREDENTIALS).await.unwrap();
    let old_claims = state.sessions.inspect_token(&issued.token).unwrap();

    let refreshed = state.sessions.refresh(&issued.token).await.unwrap().unwrap();
    assert_ne!(refreshed.token, issued.token);

    let new_claims = state.sessions.inspect_token(&refreshed.token).unwrap();
    assert_ne!(new_claims.sid, old_claims.sid);

    assert!(state.sessions.validate(&issued.token).await.is_none());
    let session = state.sessions.validate(&refreshed.token).await.unwrap();
    assert_eq!(session.credentials, *CREDENTIALS);

    assert_eq!(store.keys_with_prefix("session:").await, vec![session_key(&new_claims.sid)]);
}

#[tokio::test]
async fn refresh_of_dead_token_is_none() {
    let (state, _) = memory_state(&test_config());
    let issued = state.sessions.login(&CREDENTIALS).await.unwrap();
    state.sessions.revoke(&issued.token).await.unwrap();

    assert!(state.sessions.refresh(&issued.token).await.unwrap().is_none());
    assert!(state.sessions.refresh("garbage").await.unwrap().is_none());
}

#[tokio::test]
async fn sessions_survive_key_rotation() {
    let (state, store) = memory_state(&test_config());
    let before = state.sessions.login(&CREDENTIALS).await.unwrap();

    state.registry.rotate_key(SECOND_KEY).await.unwrap();

    let after = state.sessions.login(&CREDENTIALS).await.unwrap();
    let after_sid = state.sessions.inspect_token(&after.token).unwrap().sid;
    let raw = store.get(&session_key(&after_sid)).await.unwrap().unwrap();
    let record: SessionRecord = sonic_rs::from_slice(&raw).unwrap();
    assert_eq!(record.encrypted_credentials.key_version, 2);

    assert_eq!(state.sessions.validate(&before.token).await.unwrap().credentials, *CREDENTIALS);
    assert_eq!(state.sessions.validate(&after.token).await.unwrap().credentials, *CREDENTIALS);
}

#[tokio::test]
async fn revoking_a_key_invalidates_its_sessions() {
    let (state, store) = memory_state(&test_config());
    let issued = state.sessions.login(&CREDENTIALS).await.unwrap();
    let sid = state.sessions.inspect_token(&issued.token).unwrap().sid;

    state.registry.rotate_key(SECOND_KEY).await.unwrap();
    state.registry.revoke_key(1).await.unwrap();

    assert!(state.sessions.validate(&issued.token).await.is_none());
    assert!(store.get(&session_key(&sid)).await.unwrap().is_none());
}

#[tokio::test]
async fn concurrent_logins_are_independent() {
    let (state, _) = memory_state(&test_config());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let sessions = state.sessions.clone();
            tokio::spawn(async move { sessions.login(&CREDENTIALS).await })
        })
        .collect();

    let mut tokens = Vec::new();
    for handle in handles {
        tokens.push(handle.await.unwrap().unwrap().token);
    }

    tokens.sort();
    tokens.dedup();
    assert_eq!(tokens.len(), 8);

    for token in &tokens {
        assert!(state.sessions.validate(token).await.is_some());
    }
}
