// Fixtures for grants, records and seeded sessions.

use chrono::Utc;
use serde_json::json;

use portal_auth_core::options::DEFAULT_SESSION_TTL_SECS;
use portal_auth_core::{ProviderKind, TokenRecord};
use portal_auth_oidc::{RefreshError, TokenGrant};
use portal_auth_redis::keys::session_key;
use portal_auth_redis::{CacheStore, StoreError};

pub fn grant(access_token: &str, refresh_token: Option<&str>, expires_in_secs: i64) -> TokenGrant {
    TokenGrant {
        access_token: access_token.to_string(),
        refresh_token: refresh_token.map(String::from),
        expires_in_secs,
        id_token: None,
        token_type: Some("Bearer".to_string()),
        scope: Some("openid profile email offline_access".to_string()),
    }
}

/// `400 invalid_grant`, the usual answer for a revoked or expired refresh token.
pub fn invalid_grant() -> RefreshError {
    RefreshError::Rejected {
        status: 400,
        body: json!({
            "error": "invalid_grant",
            "error_description": "AADSTS700082: The refresh token has expired due to inactivity."
        }),
    }
}

/// Record whose access token is good for another hour.
pub fn fresh_record(provider: ProviderKind) -> TokenRecord {
    record_expiring_in(provider, 3_600_000)
}

/// Record whose access token expired a minute ago.
pub fn stale_record(provider: ProviderKind) -> TokenRecord {
    record_expiring_in(provider, -60_000)
}

pub fn record_expiring_in(provider: ProviderKind, offset_ms: i64) -> TokenRecord {
    let now = Utc::now().timestamp_millis();
    let mut record = TokenRecord::new(provider, "at-cached", "rt-cached", now + offset_ms);
    record.user_email = Some("jo@example.com".to_string());
    record.user_id = Some("user-1".to_string());
    record.session_expires_at = Some(now + (DEFAULT_SESSION_TTL_SECS as i64) * 1000);
    record
}

/// Write `record` under `session_id` as the broker would.
pub async fn seed_session(
    store: &dyn CacheStore,
    session_id: &str,
    record: &TokenRecord,
) -> Result<(), StoreError> {
    let value = record
        .to_cache_value()
        .map_err(|e| StoreError::Other(e.to_string()))?;
    store
        .set(&session_key(session_id), &value, DEFAULT_SESSION_TTL_SECS)
        .await
}
