mod common;

use common::{Harness, PASSWORD};
use time::OffsetDateTime;
use uuid::Uuid;
use warden_auth::token::opaque::hash_token;
use warden_auth::{
    AuthError, ClientOrigin, PersistentSessionRepository, RefreshTokenRecord,
    UnauthenticatedReason,
};

async fn login(h: &Harness) -> warden_auth::LoginResult {
    h.orchestrator
        .login("alice", PASSWORD, ClientOrigin::default())
        .await
        .unwrap()
}

#[tokio::test]
async fn immediate_refresh_yields_strictly_later_expiry() {
    let h = Harness::new();
    let login = login(&h).await;

    let refreshed = h.orchestrator.refresh(&login.refresh_token).await.unwrap();
    assert!(refreshed.expires_at > login.expires_at);
    assert!(h.orchestrator.issuer().validate_token(&refreshed.access_token).is_valid());

    let next = refreshed.refresh_token.expect("single-use rotation issues a new token");
    assert_ne!(next, login.refresh_token);
}

#[tokio::test]
async fn rotation_links_records_and_keeps_expiry() {
    let h = Harness::new();
    let login = login(&h).await;
    let refreshed = h.orchestrator.refresh(&login.refresh_token).await.unwrap();

    let old = h.repository.token(&hash_token(&login.refresh_token)).unwrap();
    let new_hash = hash_token(refreshed.refresh_token.as_deref().unwrap());
    let new = h.repository.token(&new_hash).unwrap();

    assert!(old.revoked_at.is_some());
    assert_eq!(old.replaced_by.as_deref(), Some(new_hash.as_str()));
    assert_eq!(new.session_id, old.session_id);
    assert_eq!(new.expires_at, old.expires_at);
    assert!(new.revoked_at.is_none());

    let session = h.repository.session(old.session_id).unwrap();
    assert_eq!(session.current_token_hash, new_hash);
}

#[tokio::test]
async fn replaying_rotated_token_fails() {
    let h = Harness::new();
    let login = login(&h).await;

    h.orchestrator.refresh(&login.refresh_token).await.unwrap();
    let err = h.orchestrator.refresh(&login.refresh_token).await.unwrap_err();
    assert_eq!(
        err.unauthenticated_reason(),
        Some(UnauthenticatedReason::RevokedToken)
    );
}

#[tokio::test]
async fn replay_is_rejected_by_repository_when_cache_forgot() {
    let h = Harness::new();
    let login = login(&h).await;
    h.orchestrator.refresh(&login.refresh_token).await.unwrap();

    // Cache loses the tombstone
    h.cache
        .remove(&h.orchestrator.keys().refresh(&hash_token(&login.refresh_token)))
        .await;

    let err = h.orchestrator.refresh(&login.refresh_token).await.unwrap_err();
    assert!(err.is_unauthenticated());
}

#[tokio::test]
async fn concurrent_refreshes_have_single_winner() {
    let h = Harness::new();
    let login = login(&h).await;

    let a = h.orchestrator.clone();
    let b = h.orchestrator.clone();
    let token_a = login.refresh_token.clone();
    let token_b = login.refresh_token.clone();
    let (first, second) = tokio::join!(
        tokio::spawn(async move { a.refresh(&token_a).await }),
        tokio::spawn(async move { b.refresh(&token_b).await }),
    );
    let results = [first.unwrap(), second.unwrap()];

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results.iter().any(|r| matches!(r, Err(e) if e.is_unauthenticated())));
}

#[tokio::test]
async fn concurrent_refreshes_of_revoked_token_all_fail() {
    let h = Harness::new();
    let login = login(&h).await;
    h.orchestrator.logout(&login.refresh_token).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..4 {
        let orchestrator = h.orchestrator.clone();
        let token = login.refresh_token.clone();
        handles.push(tokio::spawn(async move { orchestrator.refresh(&token).await }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().is_err());
    }
}

#[tokio::test]
async fn unknown_token_is_unauthenticated() {
    let h = Harness::new();
    let err = h.orchestrator.refresh("not-a-real-token").await.unwrap_err();
    assert_eq!(
        err.unauthenticated_reason(),
        Some(UnauthenticatedReason::UnknownToken)
    );
}

#[tokio::test]
async fn expired_token_is_unauthenticated() {
    let h = Harness::new();
    let now = OffsetDateTime::now_utc();
    let record = RefreshTokenRecord::new(
        hash_token("stale-token"),
        h.alice.user_id,
        "alice",
        Uuid::new_v4(),
        "jti",
        now - time::Duration::days(8),
        now - time::Duration::days(1),
        ClientOrigin::default(),
    );
    h.repository.create_refresh_token(&record).await.unwrap();

    let err = h.orchestrator.refresh("stale-token").await.unwrap_err();
    assert_eq!(
        err.unauthenticated_reason(),
        Some(UnauthenticatedReason::ExpiredToken)
    );
}

#[tokio::test]
async fn refresh_falls_back_to_repository_when_cache_down() {
    let h = Harness::new();
    let login = login(&h).await;
    h.cache_down().await;

    let refreshed = h.orchestrator.refresh(&login.refresh_token).await.unwrap();
    assert!(refreshed.refresh_token.is_some());

    // Replay still rejected with the cache gone
    assert!(h.orchestrator.refresh(&login.refresh_token).await.is_err());
}

#[tokio::test]
async fn refresh_with_repository_down_is_retryable() {
    let h = Harness::new();
    let login = login(&h).await;
    h.repository_down(true);

    // The cache still holds the record, but only the repository may revoke it
    let err = h.orchestrator.refresh(&login.refresh_token).await.unwrap_err();
    assert!(matches!(err, AuthError::ServiceUnavailable { .. }));
    assert!(err.is_retryable());

    h.repository_down(false);
    let refreshed = h.orchestrator.refresh(&login.refresh_token).await.unwrap();
    assert!(refreshed.refresh_token.is_some());
    assert!(h.orchestrator.refresh(&login.refresh_token).await.is_err());
}

#[tokio::test]
async fn repository_data_errors_are_not_reported_as_outages() {
    let h = Harness::new();
    let login = login(&h).await;
    h.repository
        .corrupt
        .store(true, std::sync::atomic::Ordering::SeqCst);

    let err = h.orchestrator.refresh(&login.refresh_token).await.unwrap_err();
    assert!(matches!(err, AuthError::Internal { .. }));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn cache_only_login_is_backfilled_on_refresh() {
    let h = Harness::new();
    h.repository_down(true);
    let login = login(&h).await;
    assert!(h.repository.token(&hash_token(&login.refresh_token)).is_none());

    h.repository_down(false);
    let refreshed = h.orchestrator.refresh(&login.refresh_token).await.unwrap();
    assert!(refreshed.refresh_token.is_some());

    let backfilled = h.repository.token(&hash_token(&login.refresh_token)).unwrap();
    assert!(backfilled.revoked_at.is_some());
}

#[tokio::test]
async fn refresh_with_both_stores_down_is_retryable() {
    let h = Harness::new();
    let login = login(&h).await;
    h.cache_down().await;
    h.repository_down(true);

    let err = h.orchestrator.refresh(&login.refresh_token).await.unwrap_err();
    assert!(matches!(err, AuthError::ServiceUnavailable { .. }));
    assert!(!err.is_unauthenticated());

    // Nothing was consumed: the token works once a store is back
    h.repository_down(false);
    assert!(h.orchestrator.refresh(&login.refresh_token).await.is_ok());
}

#[tokio::test]
async fn access_expired_but_refresh_succeeds_later() {
    let h = Harness::new();
    let issuer = h.orchestrator.issuer();
    let t0 = OffsetDateTime::now_utc();
    let access = issuer.generate_access_token_at(&h.alice, t0).unwrap();
    assert_eq!(
        access.expires_at.unix_timestamp(),
        (t0 + time::Duration::minutes(15)).unix_timestamp()
    );

    let t16 = t0 + time::Duration::minutes(16);
    assert!(!issuer.validate_token_at(&access.token, t16).is_valid());
    assert!(issuer.is_expired_at(&access.token, t16));

    let next = issuer.generate_access_token_at(&h.alice, t16).unwrap();
    assert_eq!(
        next.expires_at.unix_timestamp(),
        (t16 + time::Duration::minutes(15)).unix_timestamp()
    );
}
