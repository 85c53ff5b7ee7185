// PortalAuthOptions — configuration for the broker, adapter and accessor.
//
// Options can be built in code (struct update syntax over `Default`),
// deserialized from any serde format, or loaded from environment variables.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::db::models::ProviderKind;
use crate::error::{PortalAuthError, Result};

/// Seven days.
pub const DEFAULT_SESSION_TTL_SECS: u64 = 7 * 24 * 60 * 60;
/// Thirty days.
pub const DEFAULT_ADAPTER_TTL_SECS: u64 = 30 * 24 * 60 * 60;
/// Twenty-four hours.
pub const DEFAULT_VERIFICATION_TTL_SECS: u64 = 24 * 60 * 60;
pub const DEFAULT_REFRESH_MARGIN_MS: i64 = 60_000;

/// Which session mechanism the web layer runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStrategy {
    /// Signed cookie carrying the broker's opaque session id.
    #[default]
    Cookie,
    /// Adapter-backed sessions keyed by a session token.
    Database,
}

impl SessionStrategy {
    fn parse(value: &str) -> Result<Self> {
        match value.to_lowercase().as_str() {
            "cookie" | "jwt" => Ok(Self::Cookie),
            "database" | "db" => Ok(Self::Database),
            other => Err(PortalAuthError::Config(format!(
                "unknown session strategy '{other}'"
            ))),
        }
    }
}

/// Settings for one OIDC provider.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSettings {
    pub client_id: String,
    pub client_secret: String,
    /// Directory tenant; used to build the issuer when `issuer` is unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    /// Full issuer base URL, e.g. `https://login.microsoftonline.com/<tenant>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl ProviderSettings {
    /// Issuer base URL without a trailing slash.
    pub fn issuer_url(&self) -> String {
        match &self.issuer {
            Some(issuer) => issuer.trim_end_matches('/').to_string(),
            None => format!(
                "https://login.microsoftonline.com/{}",
                self.tenant_id.as_deref().unwrap_or("common")
            ),
        }
    }
}

impl std::fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[redacted]")
            .field("tenant_id", &self.tenant_id)
            .field("issuer", &self.issuer)
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// Top-level configuration.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PortalAuthOptions {
    /// Cookie-signing secret.
    pub secret: String,
    pub cookie_name: String,
    pub secure_cookies: bool,
    pub session_strategy: SessionStrategy,
    /// Cache store connection URL (`redis://` or `rediss://`).
    pub cache_url: String,
    pub cache_prefix: String,
    /// Lifetime of a broker session handle, independent of access-token lifetime.
    pub session_ttl_secs: u64,
    /// TTL applied to adapter users, accounts and sessions on every write.
    pub adapter_ttl_secs: u64,
    pub verification_ttl_secs: u64,
    /// Tokens expiring within this window are refreshed before use.
    pub refresh_margin_ms: i64,
    pub providers: BTreeMap<ProviderKind, ProviderSettings>,
    /// Downstream profile service notified (best effort) on sign-in.
    pub profile_sync_url: Option<String>,
}

impl Default for PortalAuthOptions {
    fn default() -> Self {
        Self {
            secret: String::new(),
            cookie_name: "portal.session-token".to_string(),
            secure_cookies: true,
            session_strategy: SessionStrategy::Cookie,
            cache_url: "redis://127.0.0.1:6379".to_string(),
            cache_prefix: "portal:".to_string(),
            session_ttl_secs: DEFAULT_SESSION_TTL_SECS,
            adapter_ttl_secs: DEFAULT_ADAPTER_TTL_SECS,
            verification_ttl_secs: DEFAULT_VERIFICATION_TTL_SECS,
            refresh_margin_ms: DEFAULT_REFRESH_MARGIN_MS,
            providers: BTreeMap::new(),
            profile_sync_url: None,
        }
    }
}

impl std::fmt::Debug for PortalAuthOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortalAuthOptions")
            .field("cookie_name", &self.cookie_name)
            .field("session_strategy", &self.session_strategy)
            .field("cache_prefix", &self.cache_prefix)
            .field("session_ttl_secs", &self.session_ttl_secs)
            .field("providers", &self.providers)
            .finish_non_exhaustive()
    }
}

impl PortalAuthOptions {
    /// Load options from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(crate::env::var)
    }

    /// Load options through an arbitrary variable lookup.
    ///
    /// Required: `PORTAL_AUTH_SECRET`, `PORTAL_REDIS_URL` and the primary
    /// provider's `PORTAL_PRIMARY_CLIENT_ID` / `PORTAL_PRIMARY_CLIENT_SECRET`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &str| {
            lookup(name).ok_or_else(|| PortalAuthError::Config(format!("{name} is not set")))
        };

        let mut options = Self {
            secret: required("PORTAL_AUTH_SECRET")?,
            cache_url: required("PORTAL_REDIS_URL")?,
            profile_sync_url: lookup("PORTAL_PROFILE_SYNC_URL"),
            ..Self::default()
        };

        if let Some(strategy) = lookup("PORTAL_SESSION_STRATEGY") {
            options.session_strategy = SessionStrategy::parse(&strategy)?;
        }
        if let Some(prefix) = lookup("PORTAL_CACHE_PREFIX") {
            options.cache_prefix = prefix;
        }
        if let Some(secure) = lookup("PORTAL_SECURE_COOKIES") {
            options.secure_cookies = !matches!(secure.as_str(), "0" | "false" | "no");
        }

        for kind in ProviderKind::ALL {
            let prefix = kind.env_prefix();
            let Some(client_id) = lookup(&format!("{prefix}_CLIENT_ID")) else {
                continue;
            };
            let client_secret = required(&format!("{prefix}_CLIENT_SECRET"))?;
            let scopes = lookup(&format!("{prefix}_SCOPES"))
                .map(|s| s.split_whitespace().map(String::from).collect())
                .unwrap_or_default();
            options.providers.insert(
                kind,
                ProviderSettings {
                    client_id,
                    client_secret,
                    tenant_id: lookup(&format!("{prefix}_TENANT_ID")),
                    issuer: lookup(&format!("{prefix}_ISSUER")),
                    scopes,
                },
            );
        }

        options.validate()?;
        Ok(options)
    }

    /// Check the options the broker cannot run without.
    pub fn validate(&self) -> Result<()> {
        if self.secret.len() < 16 {
            return Err(PortalAuthError::Config(
                "cookie secret must be at least 16 characters".into(),
            ));
        }
        if !self.providers.contains_key(&ProviderKind::PrimaryOidc) {
            return Err(PortalAuthError::Config(
                "the primary OIDC provider is not configured".into(),
            ));
        }
        if self.session_ttl_secs == 0 || self.adapter_ttl_secs == 0 || self.verification_ttl_secs == 0 {
            return Err(PortalAuthError::Config("TTLs must be non-zero".into()));
        }
        Ok(())
    }
}
