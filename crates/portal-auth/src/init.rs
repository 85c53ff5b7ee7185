// PortalAuth — wires options, the cache store and providers together.
//
// The store connection is an explicit object owned here rather than process
// state; `close()` drops its cached handle.

use std::sync::Arc;

use portal_auth_core::{
    ErrorReporter, PortalAuthError, PortalAuthOptions, ProviderKind, Result, SessionStrategy,
    TracingErrorReporter,
};
use portal_auth_oidc::{IdentityProvider, OidcClient, OidcProviderConfig};
use portal_auth_redis::{CacheStore, RedisCacheStore, RedisConnection};

use crate::accessor::ServerTokenAccessor;
use crate::adapter::{CacheAdapter, SessionAdapter};
use crate::broker::SessionBroker;
use crate::cookies::SessionCookie;
use crate::notify::{HttpProfileNotifier, SignInNotifier};

#[derive(Debug, Clone)]
pub struct PortalAuth {
    options: PortalAuthOptions,
    store: Arc<dyn CacheStore>,
    broker: SessionBroker,
    adapter: Arc<CacheAdapter>,
    cookie: SessionCookie,
}

impl PortalAuth {
    /// Build from already-constructed parts. Options are validated first.
    pub fn new(
        options: PortalAuthOptions,
        store: Arc<dyn CacheStore>,
        providers: Vec<Arc<dyn IdentityProvider>>,
    ) -> Result<Self> {
        Self::with_reporter(options, store, providers, Arc::new(TracingErrorReporter))
    }

    pub fn with_reporter(
        options: PortalAuthOptions,
        store: Arc<dyn CacheStore>,
        providers: Vec<Arc<dyn IdentityProvider>>,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Result<Self> {
        options.validate()?;

        let mut broker = SessionBroker::new(store.clone())
            .with_reporter(reporter)
            .with_session_ttl(options.session_ttl_secs)
            .with_refresh_margin_ms(options.refresh_margin_ms);
        for provider in providers {
            broker = broker.with_provider(provider);
        }
        if let Some(url) = &options.profile_sync_url {
            let notifier = HttpProfileNotifier::new(url.clone())
                .map_err(|e| PortalAuthError::Config(e.to_string()))?;
            broker = broker.with_notifier(Arc::new(notifier) as Arc<dyn SignInNotifier>);
        }

        let adapter = CacheAdapter::new(store.clone())
            .with_ttl(options.adapter_ttl_secs)
            .with_verification_ttl(options.verification_ttl_secs);
        let cookie = SessionCookie::from_options(&options);

        tracing::info!(
            strategy = ?options.session_strategy,
            providers = options.providers.len(),
            "portal auth initialized"
        );

        Ok(Self {
            options,
            store,
            broker,
            adapter: Arc::new(adapter),
            cookie,
        })
    }

    /// Connect to the configured Redis store and build an OIDC client for
    /// every configured provider.
    pub fn connect(options: PortalAuthOptions) -> Result<Self> {
        let reporter: Arc<dyn ErrorReporter> = Arc::new(TracingErrorReporter);
        let conn = RedisConnection::with_reporter(&options.cache_url, reporter.clone())
            .map_err(|e| PortalAuthError::Config(e.to_string()))?;
        let store: Arc<dyn CacheStore> =
            Arc::new(RedisCacheStore::with_prefix(conn, options.cache_prefix.clone()));

        let providers = options
            .providers
            .iter()
            .map(|(kind, settings)| {
                OidcClient::new(OidcProviderConfig::from_settings(*kind, settings))
                    .map(|client| Arc::new(client) as Arc<dyn IdentityProvider>)
                    .map_err(|e| PortalAuthError::Config(format!("{kind}: {e}")))
            })
            .collect::<Result<Vec<_>>>()?;

        Self::with_reporter(options, store, providers, reporter)
    }

    pub fn options(&self) -> &PortalAuthOptions {
        &self.options
    }

    pub fn broker(&self) -> &SessionBroker {
        &self.broker
    }

    pub fn adapter(&self) -> Arc<dyn SessionAdapter> {
        self.adapter.clone()
    }

    pub fn cookie(&self) -> &SessionCookie {
        &self.cookie
    }

    /// Accessor for the configured strategy. In database mode the token is
    /// read from the account linked for `provider`.
    pub fn accessor(&self, provider: ProviderKind) -> ServerTokenAccessor {
        match self.options.session_strategy {
            SessionStrategy::Cookie => {
                ServerTokenAccessor::for_broker(self.cookie.clone(), self.broker.clone())
            }
            SessionStrategy::Database => {
                ServerTokenAccessor::for_adapter(self.cookie.clone(), self.adapter(), provider)
            }
        }
    }

    pub async fn close(&self) {
        self.store.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portal_auth_core::ProviderSettings;
    use portal_auth_redis::InMemoryCacheStore;

    fn options() -> PortalAuthOptions {
        let mut options = PortalAuthOptions {
            secret: "a-sufficiently-long-secret".into(),
            ..Default::default()
        };
        options.providers.insert(
            ProviderKind::PrimaryOidc,
            ProviderSettings {
                client_id: "c".into(),
                client_secret: "s".into(),
                tenant_id: Some("t".into()),
                issuer: None,
                scopes: Vec::new(),
            },
        );
        options
    }

    #[test]
    fn test_new_rejects_invalid_options() {
        let err = PortalAuth::new(PortalAuthOptions::default(), Arc::new(InMemoryCacheStore::new()), Vec::new())
            .unwrap_err();
        assert!(matches!(err, PortalAuthError::Config(_)));
    }

    #[test]
    fn test_connect_builds_clients_without_network() {
        let auth = PortalAuth::connect(options()).unwrap();
        assert!(auth.broker().provider(ProviderKind::PrimaryOidc).is_some());
        assert!(auth.broker().provider(ProviderKind::SecondaryOidc).is_none());
    }
}
