// Session broker — sign-in, lookup and refresh-on-demand.
//
// Token lifecycle per session:
//
//   FRESH ──(time passes)──▶ STALE ──(refresh ok)──▶ FRESH
//                              │
//                              └──(refresh fails)──▶ ERRORED (terminal)
//
// The broker holds no per-session state in process. Every decision is made
// from the record read out of the cache store, and every outcome is written
// back to it.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use portal_auth_core::options::{DEFAULT_REFRESH_MARGIN_MS, DEFAULT_SESSION_TTL_SECS};
use portal_auth_core::utils::{generate_id_with_length, now_ms};
use portal_auth_core::{
    ErrorCode, ErrorReporter, ProviderKind, ReportedError, SessionError, SessionHandle,
    TokenRecord, TokenState, TracingErrorReporter,
};
use portal_auth_oidc::{IdentityProvider, RefreshError, TokenGrant};
use portal_auth_redis::keys::session_key;
use portal_auth_redis::CacheStore;

use crate::error::BrokerError;
use crate::notify::{self, SignInEvent, SignInNotifier};

/// Length of generated session ids when the provider gives no subject.
const SESSION_ID_LENGTH: usize = 32;

// ─── Types ───────────────────────────────────────────────────────

/// What the sign-in callback knows after a successful code exchange.
#[derive(Debug, Clone)]
pub struct IdentityAssertion {
    pub provider: ProviderKind,
    /// The provider's subject identifier (`sub` / `oid`), when available.
    pub subject: Option<String>,
    pub grant: TokenGrant,
    pub email: Option<String>,
    pub name: Option<String>,
    /// Local user id, when the caller has already resolved one.
    pub user_id: Option<String>,
}

impl IdentityAssertion {
    pub fn new(provider: ProviderKind, grant: TokenGrant) -> Self {
        Self {
            provider,
            subject: None,
            grant,
            email: None,
            name: None,
            user_id: None,
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}

/// Whether this sign-in replaced a record already stored under the same id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignInStatus {
    New,
    Existing { previous: TokenRecord },
}

/// Result of `begin_session`. Only `handle` may leave the server.
#[derive(Debug, Clone)]
pub struct SignIn {
    pub handle: SessionHandle,
    pub status: SignInStatus,
}

impl SignIn {
    pub fn is_new(&self) -> bool {
        matches!(self.status, SignInStatus::New)
    }

    /// Browser-safe view of the freshly created session.
    pub fn client_session(&self) -> ClientSession {
        ClientSession {
            session_id: self.handle.session_id.clone(),
            user: ClientUser {
                id: self.handle.user_id.clone(),
                email: self.handle.user_email.clone(),
            },
            provider: self.handle.provider,
            expires: self.handle.expires,
            error: None,
        }
    }
}

/// Outcome of `ensure_fresh`.
///
/// An errored session is a state, not an `Err`: the caller treats it as
/// signed out and sends the user back to sign-in.
#[derive(Clone, PartialEq, Eq)]
pub enum AccessTokenState {
    Valid(String),
    Errored(SessionError),
}

impl AccessTokenState {
    pub fn access_token(&self) -> Option<&str> {
        match self {
            Self::Valid(token) => Some(token),
            Self::Errored(_) => None,
        }
    }

    pub fn is_errored(&self) -> bool {
        matches!(self, Self::Errored(_))
    }
}

impl std::fmt::Debug for AccessTokenState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Valid(_) => f.write_str("Valid([redacted])"),
            Self::Errored(e) => write!(f, "Errored({e})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientUser {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Session as the browser-facing layer sees it. Never carries provider tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientSession {
    pub session_id: String,
    pub user: ClientUser,
    pub provider: ProviderKind,
    pub expires: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorCode>,
}

// ─── Broker ──────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SessionBroker {
    store: Arc<dyn CacheStore>,
    providers: BTreeMap<ProviderKind, Arc<dyn IdentityProvider>>,
    notifier: Option<Arc<dyn SignInNotifier>>,
    reporter: Arc<dyn ErrorReporter>,
    session_ttl_secs: u64,
    refresh_margin_ms: i64,
}

impl SessionBroker {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            store,
            providers: BTreeMap::new(),
            notifier: None,
            reporter: Arc::new(TracingErrorReporter),
            session_ttl_secs: DEFAULT_SESSION_TTL_SECS,
            refresh_margin_ms: DEFAULT_REFRESH_MARGIN_MS,
        }
    }

    /// Register a provider under its own `kind()`, replacing any previous one.
    pub fn with_provider(mut self, provider: Arc<dyn IdentityProvider>) -> Self {
        self.providers.insert(provider.kind(), provider);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn SignInNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_session_ttl(mut self, ttl_secs: u64) -> Self {
        self.session_ttl_secs = ttl_secs;
        self
    }

    pub fn with_refresh_margin_ms(mut self, margin_ms: i64) -> Self {
        self.refresh_margin_ms = margin_ms;
        self
    }

    pub fn provider(&self, kind: ProviderKind) -> Option<&Arc<dyn IdentityProvider>> {
        self.providers.get(&kind)
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    /// Store the grant from a successful sign-in and hand back the opaque handle.
    ///
    /// The session id is the provider subject when one is asserted, so a user
    /// signing in again replaces their previous record; otherwise it is random.
    pub async fn begin_session(&self, assertion: IdentityAssertion) -> Result<SignIn, BrokerError> {
        let now = now_ms();
        let session_id = assertion
            .subject
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .unwrap_or_else(|| generate_id_with_length(SESSION_ID_LENGTH));
        let key = session_key(&session_id);

        let previous = match self.store.get(&key).await? {
            Some(raw) => match TokenRecord::from_cache_value(&raw) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!(session = %short_id(&session_id), error = %e, "replacing unreadable session record");
                    None
                }
            },
            None => None,
        };

        let deadline = now.saturating_add(ttl_ms(self.session_ttl_secs));
        let record = TokenRecord {
            access_token: assertion.grant.access_token.clone(),
            refresh_token: assertion.grant.refresh_token.clone().unwrap_or_default(),
            access_token_expiry_time: assertion.grant.expiry_time_ms(now),
            provider: assertion.provider,
            user_email: assertion.email.clone(),
            user_id: assertion.user_id.clone(),
            error: None,
            session_expires_at: Some(deadline),
        };
        if record.refresh_token.is_empty() {
            tracing::warn!(provider = %assertion.provider, "provider issued no refresh token; session cannot be refreshed");
        }

        self.store
            .set(&key, &record.to_cache_value()?, self.session_ttl_secs)
            .await?;

        if let Some(notifier) = &self.notifier {
            let event = SignInEvent {
                provider: assertion.provider,
                user_id: assertion.user_id.clone(),
                email: assertion.email.clone(),
                name: assertion.name.clone(),
                access_token: assertion.grant.access_token.clone(),
            };
            // Detached: the sign-in result never waits on it.
            drop(notify::dispatch(notifier.clone(), event, self.reporter.clone()));
        }

        let status = match previous {
            Some(previous) => SignInStatus::Existing { previous },
            None => SignInStatus::New,
        };
        tracing::info!(
            session = %short_id(&session_id),
            provider = %assertion.provider,
            new = matches!(status, SignInStatus::New),
            "session started"
        );

        Ok(SignIn {
            handle: SessionHandle {
                session_id,
                provider: assertion.provider,
                user_id: assertion.user_id,
                user_email: assertion.email,
                expires: datetime_from_ms(deadline),
            },
            status,
        })
    }

    /// Plain lookup. Store failures surface as `CacheUnavailable`.
    pub async fn resolve(&self, session_id: &str) -> Result<Option<TokenRecord>, BrokerError> {
        match self.store.get(&session_key(session_id)).await? {
            Some(raw) => Ok(Some(TokenRecord::from_cache_value(&raw)?)),
            None => Ok(None),
        }
    }

    /// Return a usable access token, refreshing it first when it is within
    /// the refresh margin of expiry.
    ///
    /// Concurrent callers are not serialized. Two requests that both see a
    /// stale record each call the provider, and the record written last wins.
    pub async fn ensure_fresh(&self, session_id: &str) -> Result<AccessTokenState, BrokerError> {
        let record = self
            .resolve(session_id)
            .await?
            .ok_or(BrokerError::SessionNotFound)?;
        let now = now_ms();

        match record.state_at(now, self.refresh_margin_ms) {
            TokenState::Errored => Ok(AccessTokenState::Errored(
                record.error.unwrap_or(SessionError::RefreshAccessTokenError),
            )),
            TokenState::Fresh => {
                tracing::debug!(session = %short_id(session_id), "access token fresh");
                Ok(AccessTokenState::Valid(record.access_token))
            }
            TokenState::Stale => self.refresh(session_id, record, now).await,
        }
    }

    async fn refresh(
        &self,
        session_id: &str,
        record: TokenRecord,
        now: i64,
    ) -> Result<AccessTokenState, BrokerError> {
        let Some(provider) = self.providers.get(&record.provider) else {
            self.report_refresh_failure(session_id, &record, "provider not configured", None);
            return self.mark_errored(session_id, record, now).await;
        };
        if record.refresh_token.is_empty() {
            self.report_refresh_failure(session_id, &record, "no refresh token stored", None);
            return self.mark_errored(session_id, record, now).await;
        }

        match provider.refresh(&record.refresh_token).await {
            Ok(grant) => {
                let refreshed = TokenRecord {
                    access_token: grant.access_token.clone(),
                    access_token_expiry_time: grant.expiry_time_ms(now),
                    refresh_token: grant
                        .refresh_token
                        .clone()
                        .unwrap_or_else(|| record.refresh_token.clone()),
                    ..record
                };
                self.write_back(session_id, &refreshed, now).await?;
                tracing::info!(
                    session = %short_id(session_id),
                    provider = %refreshed.provider,
                    rotated = grant.refresh_token.is_some(),
                    "access token refreshed"
                );
                Ok(AccessTokenState::Valid(refreshed.access_token))
            }
            Err(e) => {
                self.report_refresh_failure(session_id, &record, &e.to_string(), Some(&e));
                self.mark_errored(session_id, record, now).await
            }
        }
    }

    async fn mark_errored(
        &self,
        session_id: &str,
        mut record: TokenRecord,
        now: i64,
    ) -> Result<AccessTokenState, BrokerError> {
        record.error = Some(SessionError::RefreshAccessTokenError);
        self.write_back(session_id, &record, now).await?;
        Ok(AccessTokenState::Errored(SessionError::RefreshAccessTokenError))
    }

    /// Rewrite a record without moving the session deadline.
    async fn write_back(&self, session_id: &str, record: &TokenRecord, now: i64) -> Result<(), BrokerError> {
        let key = session_key(session_id);
        let ttl = record
            .remaining_session_secs(now)
            .unwrap_or(self.session_ttl_secs);
        if ttl == 0 {
            self.store.delete(&key).await?;
            return Err(BrokerError::SessionNotFound);
        }
        self.store.set(&key, &record.to_cache_value()?, ttl).await?;
        Ok(())
    }

    fn report_refresh_failure(
        &self,
        session_id: &str,
        record: &TokenRecord,
        message: &str,
        error: Option<&RefreshError>,
    ) {
        tracing::warn!(session = %short_id(session_id), provider = %record.provider, "{message}");
        let mut event = ReportedError::new("refresh_failed", message)
            .with_tag("has_session_id", !session_id.is_empty())
            .with_tag("provider", record.provider);
        if let Some(RefreshError::Rejected { status, .. }) = error {
            event = event.with_tag("status", status);
        }
        if let Some(code) = error.and_then(RefreshError::provider_error_code) {
            event = event.with_tag("provider_error", code);
        }
        self.reporter.report(&event);
    }

    /// Delete the session. Deleting an absent session is not an error.
    pub async fn teardown(&self, session_id: &str) -> Result<(), BrokerError> {
        let existed = self.store.delete(&session_key(session_id)).await?;
        tracing::info!(session = %short_id(session_id), existed, "session ended");
        Ok(())
    }

    /// Browser-safe view of a stored session.
    pub async fn client_session(&self, session_id: &str) -> Result<ClientSession, BrokerError> {
        let record = self
            .resolve(session_id)
            .await?
            .ok_or(BrokerError::SessionNotFound)?;
        let expires = match record.session_expires_at {
            Some(deadline) => datetime_from_ms(deadline),
            None => datetime_from_ms(now_ms().saturating_add(ttl_ms(self.session_ttl_secs))),
        };
        Ok(ClientSession {
            session_id: session_id.to_string(),
            user: ClientUser {
                id: record.user_id,
                email: record.user_email,
            },
            provider: record.provider,
            expires,
            error: record.error.map(|_| ErrorCode::RefreshAccessTokenError),
        })
    }
}

fn datetime_from_ms(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn ttl_ms(ttl_secs: u64) -> i64 {
    i64::try_from(ttl_secs).unwrap_or(i64::MAX).saturating_mul(1000)
}

/// First characters of a session id, enough to correlate log lines.
fn short_id(session_id: &str) -> &str {
    session_id.get(..6).unwrap_or(session_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use portal_auth_redis::InMemoryCacheStore;

    fn grant(access: &str, refresh: Option<&str>, expires_in: i64) -> TokenGrant {
        TokenGrant {
            access_token: access.into(),
            refresh_token: refresh.map(String::from),
            expires_in_secs: expires_in,
            id_token: None,
            token_type: Some("Bearer".into()),
            scope: None,
        }
    }

    fn broker() -> SessionBroker {
        SessionBroker::new(Arc::new(InMemoryCacheStore::new()))
    }

    #[tokio::test]
    async fn test_subject_becomes_session_id() {
        let b = broker();
        let assertion = IdentityAssertion::new(ProviderKind::PrimaryOidc, grant("at", Some("rt"), 3600))
            .with_subject("sub-1")
            .with_email("jo@example.com");
        let first = b.begin_session(assertion.clone()).await.unwrap();
        assert_eq!(first.handle.session_id, "sub-1");
        assert!(first.is_new());

        let second = b.begin_session(assertion).await.unwrap();
        match second.status {
            SignInStatus::Existing { previous } => assert_eq!(previous.access_token, "at"),
            SignInStatus::New => panic!("expected existing session"),
        }
    }

    #[tokio::test]
    async fn test_random_session_id_without_subject() {
        let b = broker();
        let sign_in = b
            .begin_session(IdentityAssertion::new(ProviderKind::PrimaryOidc, grant("at", None, 3600)).with_subject("  "))
            .await
            .unwrap();
        assert_eq!(sign_in.handle.session_id.len(), SESSION_ID_LENGTH);
    }

    #[tokio::test]
    async fn test_fresh_token_returned_without_provider() {
        let b = broker();
        let sign_in = b
            .begin_session(IdentityAssertion::new(ProviderKind::PrimaryOidc, grant("at", Some("rt"), 3600)))
            .await
            .unwrap();
        let state = b.ensure_fresh(&sign_in.handle.session_id).await.unwrap();
        assert_eq!(state.access_token(), Some("at"));
    }

    #[tokio::test]
    async fn test_stale_token_without_provider_errors() {
        let b = broker();
        let sign_in = b
            .begin_session(IdentityAssertion::new(ProviderKind::SecondaryOidc, grant("at", Some("rt"), 30)))
            .await
            .unwrap();
        let id = sign_in.handle.session_id;
        assert!(b.ensure_fresh(&id).await.unwrap().is_errored());
        assert!(b.resolve(&id).await.unwrap().unwrap().error.is_some());

        let view = b.client_session(&id).await.unwrap();
        assert_eq!(view.error, Some(ErrorCode::RefreshAccessTokenError));
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let b = broker();
        assert!(b.resolve("nope").await.unwrap().is_none());
        assert!(matches!(b.ensure_fresh("nope").await, Err(BrokerError::SessionNotFound)));
        assert!(matches!(b.client_session("nope").await, Err(BrokerError::SessionNotFound)));
    }

    #[tokio::test]
    async fn test_teardown_is_idempotent() {
        let b = broker();
        let sign_in = b
            .begin_session(IdentityAssertion::new(ProviderKind::PrimaryOidc, grant("at", Some("rt"), 3600)))
            .await
            .unwrap();
        let id = sign_in.handle.session_id;
        b.teardown(&id).await.unwrap();
        b.teardown(&id).await.unwrap();
        assert!(b.resolve(&id).await.unwrap().is_none());
    }

    #[test]
    fn test_short_id() {
        assert_eq!(short_id("abcdefghij"), "abcdef");
        assert_eq!(short_id("abc"), "abc");
    }

    #[test]
    fn test_access_token_state_debug_redacts() {
        assert_eq!(format!("{:?}", AccessTokenState::Valid("secret".into())), "Valid([redacted])");
    }
}
