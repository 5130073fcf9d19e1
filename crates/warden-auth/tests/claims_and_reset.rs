mod common;

use common::{Harness, PASSWORD};
use uuid::Uuid;
use warden_auth::{AuthError, ClientOrigin, UnauthenticatedReason};

#[tokio::test]
async fn get_claims_loads_and_caches_principal() {
    let h = Harness::new();
    let key = h.orchestrator.keys().principal(h.alice.user_id);
    assert!(!h.cache.exists(&key).await);

    let principal = h.orchestrator.get_claims(h.alice.user_id).await.unwrap();
    assert_eq!(principal, h.alice);
    assert!(h.cache.exists(&key).await);
}

#[tokio::test]
async fn get_claims_serves_cache_while_principal_store_down() {
    let h = Harness::new();
    h.orchestrator.get_claims(h.alice.user_id).await.unwrap();
    h.principals_down(true);

    let principal = h.orchestrator.get_claims(h.alice.user_id).await.unwrap();
    assert_eq!(principal.username, "alice");
}

#[tokio::test]
async fn get_claims_falls_back_to_store_while_cache_down() {
    let h = Harness::new();
    h.cache_down().await;

    let principal = h.orchestrator.get_claims(h.alice.user_id).await.unwrap();
    assert_eq!(principal.roles, vec!["employee", "hr"]);
}

#[tokio::test]
async fn get_claims_with_both_down_is_retryable() {
    let h = Harness::new();
    h.cache_down().await;
    h.principals_down(true);

    let err = h.orchestrator.get_claims(h.alice.user_id).await.unwrap_err();
    assert!(matches!(err, AuthError::ServiceUnavailable { .. }));
}

#[tokio::test]
async fn get_claims_for_unknown_user() {
    let h = Harness::new();
    let err = h.orchestrator.get_claims(Uuid::new_v4()).await.unwrap_err();
    assert_eq!(
        err.unauthenticated_reason(),
        Some(UnauthenticatedReason::UnknownPrincipal)
    );
}

#[tokio::test]
async fn refresh_fails_once_user_is_deleted() {
    let h = Harness::new();
    let login = h
        .orchestrator
        .login("alice", PASSWORD, ClientOrigin::default())
        .await
        .unwrap();
    h.principals.remove("alice");
    h.cache
        .remove(&h.orchestrator.keys().principal(h.alice.user_id))
        .await;

    let err = h.orchestrator.refresh(&login.refresh_token).await.unwrap_err();
    assert!(err.is_unauthenticated());

    // The token was not consumed by the failed attempt
    let hash = warden_auth::token::opaque::hash_token(&login.refresh_token);
    assert!(h.repository.token(&hash).unwrap().revoked_at.is_none());
}

#[tokio::test]
async fn password_reset_is_single_use() {
    let h = Harness::new();
    let token = h
        .orchestrator
        .request_password_reset("alice")
        .await
        .unwrap()
        .expect("known user gets a token");

    assert_eq!(
        h.orchestrator.redeem_password_reset(&token).await.unwrap(),
        h.alice.user_id
    );
    let err = h.orchestrator.redeem_password_reset(&token).await.unwrap_err();
    assert!(err.is_unauthenticated());

    // Stored hashed
    assert!(!h.repository.resets.read().unwrap().contains_key(&token));
}

#[tokio::test]
async fn password_reset_for_unknown_user_returns_none() {
    let h = Harness::new();
    assert!(
        h.orchestrator
            .request_password_reset("mallory")
            .await
            .unwrap()
            .is_none()
    );
    assert!(h.repository.resets.read().unwrap().is_empty());
}

#[tokio::test]
async fn password_reset_needs_repository() {
    let h = Harness::new();
    h.repository_down(true);
    let err = h
        .orchestrator
        .request_password_reset("alice")
        .await
        .unwrap_err();
    assert!(err.is_retryable());
}
