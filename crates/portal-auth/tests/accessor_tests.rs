//! Server-token accessor and top-level wiring tests.
//!
//! Covers: cookie strategy, database strategy, best-effort expired tokens,
//! errored sessions, and the signed cookie round trip through `PortalAuth`.

use std::sync::Arc;

use chrono::{Duration, Utc};
use portal_auth::{IdentityAssertion, NewUser, PortalAuth, RequestContext, SessionAdapter};
use portal_auth_core::{
    AdapterAccount, AdapterSession, PortalAuthOptions, ProviderKind, ProviderSettings,
    SessionError, SessionStrategy,
};
use portal_auth_oidc::IdentityProvider;
use portal_auth_test_utils::fixtures::{grant, seed_session, stale_record};
use portal_auth_test_utils::{RecordingStore, StubIdentityProvider};

fn options(strategy: SessionStrategy) -> PortalAuthOptions {
    let mut options = PortalAuthOptions {
        secret: "integration-test-cookie-secret".into(),
        session_strategy: strategy,
        secure_cookies: false,
        ..Default::default()
    };
    options.providers.insert(
        ProviderKind::PrimaryOidc,
        ProviderSettings {
            client_id: "client-1".into(),
            client_secret: "secret-1".into(),
            tenant_id: Some("tenant-1".into()),
            issuer: None,
            scopes: Vec::new(),
        },
    );
    options
}

fn auth(strategy: SessionStrategy, store: &RecordingStore) -> PortalAuth {
    let idp: Arc<dyn IdentityProvider> = Arc::new(StubIdentityProvider::new(ProviderKind::PrimaryOidc));
    PortalAuth::new(options(strategy), Arc::new(store.clone()), vec![idp]).unwrap()
}

/// Turn a `Set-Cookie` value into the `Cookie` header a browser sends back.
fn request_for(set_cookie: &str) -> RequestContext {
    RequestContext::new(set_cookie.split(';').next().unwrap_or_default())
}

// ── Cookie strategy ─────────────────────────────────────────────

#[tokio::test]
async fn cookie_session_yields_access_token() {
    let store = RecordingStore::new();
    let auth = auth(SessionStrategy::Cookie, &store);
    let sign_in = auth
        .broker()
        .begin_session(
            IdentityAssertion::new(ProviderKind::PrimaryOidc, grant("at-1", Some("rt-1"), 3600))
                .with_subject("sub-1"),
        )
        .await
        .unwrap();

    let set_cookie = auth.cookie().issue(&sign_in.handle.session_id).unwrap();
    assert!(!set_cookie.contains("at-1"));
    assert!(!set_cookie.contains("rt-1"));

    let token = auth
        .accessor(ProviderKind::PrimaryOidc)
        .get_access_token(&request_for(&set_cookie))
        .await;
    assert_eq!(token.as_deref(), Some("at-1"));
}

#[tokio::test]
async fn expired_token_is_returned_without_refresh() {
    let store = RecordingStore::new();
    let auth = auth(SessionStrategy::Cookie, &store);
    seed_session(&store, "s-old", &stale_record(ProviderKind::PrimaryOidc))
        .await
        .unwrap();
    store.clear_writes();

    let set_cookie = auth.cookie().issue("s-old").unwrap();
    let token = auth
        .accessor(ProviderKind::PrimaryOidc)
        .get_access_token(&request_for(&set_cookie))
        .await;

    assert_eq!(token.as_deref(), Some("at-cached"));
    assert!(store.writes().is_empty());
}

#[tokio::test]
async fn errored_session_yields_nothing() {
    let store = RecordingStore::new();
    let auth = auth(SessionStrategy::Cookie, &store);
    let mut record = stale_record(ProviderKind::PrimaryOidc);
    record.error = Some(SessionError::RefreshAccessTokenError);
    seed_session(&store, "s-err", &record).await.unwrap();

    let set_cookie = auth.cookie().issue("s-err").unwrap();
    let token = auth
        .accessor(ProviderKind::PrimaryOidc)
        .get_access_token(&request_for(&set_cookie))
        .await;
    assert!(token.is_none());
}

#[tokio::test]
async fn tampered_cookie_yields_nothing() {
    let store = RecordingStore::new();
    let auth = auth(SessionStrategy::Cookie, &store);
    seed_session(&store, "s-1", &stale_record(ProviderKind::PrimaryOidc))
        .await
        .unwrap();

    let forged = RequestContext::new("portal.session-token=s-1.forged-signature");
    assert!(auth
        .accessor(ProviderKind::PrimaryOidc)
        .get_access_token(&forged)
        .await
        .is_none());
}

// ── Database strategy ───────────────────────────────────────────

#[tokio::test]
async fn database_session_reads_linked_account_token() {
    let store = RecordingStore::new();
    let auth = auth(SessionStrategy::Database, &store);
    let adapter = auth.adapter();

    let user = adapter
        .create_user(NewUser {
            email: "jo@example.com".into(),
            ..Default::default()
        })
        .await
        .unwrap();
    let mut account = AdapterAccount::new("primary-oidc", "sub-1", &user.id);
    account.access_token = Some("at-db".into());
    adapter.link_account(account).await.unwrap();
    adapter
        .create_session(AdapterSession {
            session_token: "st-1".into(),
            user_id: user.id.clone(),
            expires: Utc::now() + Duration::days(30),
        })
        .await
        .unwrap();

    let set_cookie = auth.cookie().issue("st-1").unwrap();
    assert!(set_cookie.contains("Max-Age=2592000"));
    let token = auth
        .accessor(ProviderKind::PrimaryOidc)
        .get_access_token(&request_for(&set_cookie))
        .await;
    assert_eq!(token.as_deref(), Some("at-db"));

    adapter.delete_session("st-1").await.unwrap();
    let token = auth
        .accessor(ProviderKind::PrimaryOidc)
        .get_access_token(&request_for(&set_cookie))
        .await;
    assert!(token.is_none());
}

// ── Lifecycle ───────────────────────────────────────────────────

#[tokio::test]
async fn sign_out_clears_cookie_and_session() {
    let store = RecordingStore::new();
    let auth = auth(SessionStrategy::Cookie, &store);
    let sign_in = auth
        .broker()
        .begin_session(IdentityAssertion::new(
            ProviderKind::PrimaryOidc,
            grant("at-1", Some("rt-1"), 3600),
        ))
        .await
        .unwrap();
    let id = sign_in.handle.session_id.clone();

    auth.broker().teardown(&id).await.unwrap();
    assert!(auth.cookie().clear().contains("Max-Age=0"));
    assert!(auth.broker().resolve(&id).await.unwrap().is_none());
    auth.close().await;
}
