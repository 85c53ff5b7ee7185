// Records held in the token cache store.
//
// `TokenRecord` is the broker's view of one identity-provider grant. The
// adapter records (`AdapterUser`, `AdapterSession`, `AdapterAccount`,
// `VerificationToken`) back the database session strategy.
//
// Cache values are JSON. Every record accepts both camelCase and PascalCase
// keys on read so older writers stay readable; writes are always camelCase.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ─── Provider ────────────────────────────────────────────────────

/// The configured identity providers a token record can come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProviderKind {
    #[serde(rename = "primary-oidc", alias = "PrimaryOidc", alias = "primaryOidc")]
    PrimaryOidc,
    #[serde(rename = "secondary-oidc", alias = "SecondaryOidc", alias = "secondaryOidc")]
    SecondaryOidc,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 2] = [ProviderKind::PrimaryOidc, ProviderKind::SecondaryOidc];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PrimaryOidc => "primary-oidc",
            Self::SecondaryOidc => "secondary-oidc",
        }
    }

    /// Environment variable prefix for this provider's settings.
    pub fn env_prefix(&self) -> &'static str {
        match self {
            Self::PrimaryOidc => "PORTAL_PRIMARY",
            Self::SecondaryOidc => "PORTAL_SECONDARY",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Token Record ────────────────────────────────────────────────

/// Terminal error state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionError {
    /// The provider refused (or could not be asked) to refresh the token.
    RefreshAccessTokenError,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RefreshAccessTokenError => f.write_str("RefreshAccessTokenError"),
        }
    }
}

/// Lifecycle state of a token record at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    Fresh,
    Stale,
    Errored,
}

/// One identity-provider grant, keyed in the cache by session id.
///
/// `access_token_expiry_time` is always the expiry the provider reported for
/// `access_token`, in milliseconds since the Unix epoch.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRecord {
    #[serde(alias = "AccessToken", alias = "access_token")]
    pub access_token: String,
    #[serde(alias = "RefreshToken", alias = "refresh_token")]
    pub refresh_token: String,
    #[serde(alias = "AccessTokenExpiryTime", alias = "access_token_expiry_time")]
    pub access_token_expiry_time: i64,
    #[serde(alias = "Provider")]
    pub provider: ProviderKind,
    #[serde(default, alias = "UserEmail", skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,
    #[serde(default, alias = "UserId", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, alias = "Error", skip_serializing_if = "Option::is_none")]
    pub error: Option<SessionError>,
    /// Fixed end of the browser session, ms since the epoch. Rewrites of the
    /// record keep this deadline instead of extending it.
    #[serde(default, alias = "SessionExpiresAt", skip_serializing_if = "Option::is_none")]
    pub session_expires_at: Option<i64>,
}

impl TokenRecord {
    pub fn new(
        provider: ProviderKind,
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        access_token_expiry_time: i64,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            access_token_expiry_time,
            provider,
            user_email: None,
            user_id: None,
            error: None,
            session_expires_at: None,
        }
    }

    /// Classify the record at `now_ms`, treating tokens that expire within
    /// `margin_ms` as stale.
    pub fn state_at(&self, now_ms: i64, margin_ms: i64) -> TokenState {
        if self.error.is_some() {
            TokenState::Errored
        } else if now_ms < self.access_token_expiry_time.saturating_sub(margin_ms) {
            TokenState::Fresh
        } else {
            TokenState::Stale
        }
    }

    /// Whole seconds left before the session deadline, if one is recorded.
    pub fn remaining_session_secs(&self, now_ms: i64) -> Option<u64> {
        self.session_expires_at
            .map(|deadline| deadline.saturating_sub(now_ms).max(0) as u64 / 1000)
    }

    /// Parse a cache value into the canonical record.
    pub fn from_cache_value(value: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(value)
    }

    pub fn to_cache_value(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl fmt::Debug for TokenRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenRecord")
            .field("access_token", &"[redacted]")
            .field("refresh_token", &"[redacted]")
            .field("access_token_expiry_time", &self.access_token_expiry_time)
            .field("provider", &self.provider)
            .field("user_email", &self.user_email)
            .field("user_id", &self.user_id)
            .field("error", &self.error)
            .field("session_expires_at", &self.session_expires_at)
            .finish()
    }
}

/// Server-side handle for one signed-in browser.
///
/// Carries the opaque `session_id` that goes into the session cookie and
/// nothing the provider issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionHandle {
    pub session_id: String,
    pub provider: ProviderKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,
    pub expires: DateTime<Utc>,
}

// ─── Adapter Records ─────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdapterUser {
    #[serde(alias = "Id")]
    pub id: String,
    #[serde(alias = "Email")]
    pub email: String,
    #[serde(default, alias = "Name", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, alias = "EmailVerified", skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdapterSession {
    #[serde(alias = "SessionToken")]
    pub session_token: String,
    #[serde(alias = "UserId")]
    pub user_id: String,
    #[serde(alias = "Expires")]
    pub expires: DateTime<Utc>,
}

/// Provider-account linkage. Token fields use the OAuth wire names.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdapterAccount {
    #[serde(alias = "Provider")]
    pub provider: String,
    #[serde(alias = "ProviderAccountId")]
    pub provider_account_id: String,
    #[serde(alias = "UserId")]
    pub user_id: String,
    #[serde(rename = "type", default = "default_account_type")]
    pub account_type: String,
    #[serde(rename = "access_token", alias = "accessToken", default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(rename = "refresh_token", alias = "refreshToken", default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Expiry of `access_token` in seconds since the Unix epoch.
    #[serde(rename = "expires_at", alias = "expiresAt", default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    #[serde(rename = "token_type", alias = "tokenType", default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(rename = "id_token", alias = "idToken", default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
}

fn default_account_type() -> String {
    "oidc".to_string()
}

impl AdapterAccount {
    pub fn new(
        provider: impl Into<String>,
        provider_account_id: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            provider_account_id: provider_account_id.into(),
            user_id: user_id.into(),
            account_type: default_account_type(),
            access_token: None,
            refresh_token: None,
            expires_at: None,
            token_type: None,
            scope: None,
            id_token: None,
        }
    }
}

impl fmt::Debug for AdapterAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterAccount")
            .field("provider", &self.provider)
            .field("provider_account_id", &self.provider_account_id)
            .field("user_id", &self.user_id)
            .field("account_type", &self.account_type)
            .field("access_token", &self.access_token.as_ref().map(|_| "[redacted]"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[redacted]"))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Single-use verification token (e.g. email sign-in link).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationToken {
    #[serde(alias = "Identifier")]
    pub identifier: String,
    #[serde(alias = "Token")]
    pub token: String,
    #[serde(alias = "Expires")]
    pub expires: DateTime<Utc>,
}
