// Server-token accessor — the read path for backend-facing handlers.
//
// Never fails: anything short of a usable token is `None`, and the caller
// decides whether that means 401 or a re-login prompt. Expired tokens are
// still returned; the downstream API is left to reject them.

use std::sync::Arc;

use portal_auth_core::ProviderKind;

use crate::adapter::SessionAdapter;
use crate::broker::SessionBroker;
use crate::cookies::SessionCookie;
use crate::error::AdapterError;

/// The parts of an inbound request the accessor reads.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Raw `Cookie` header, if any.
    pub cookie_header: Option<String>,
}

impl RequestContext {
    pub fn new(cookie_header: impl Into<String>) -> Self {
        Self {
            cookie_header: Some(cookie_header.into()),
        }
    }
}

#[derive(Debug, Clone)]
enum Backend {
    /// Cookie carries the broker's session id.
    Broker(SessionBroker),
    /// Cookie carries an adapter session token; tokens live on the linked account.
    Adapter {
        adapter: Arc<dyn SessionAdapter>,
        provider: ProviderKind,
    },
}

#[derive(Debug, Clone)]
pub struct ServerTokenAccessor {
    cookie: SessionCookie,
    backend: Backend,
}

impl ServerTokenAccessor {
    pub fn for_broker(cookie: SessionCookie, broker: SessionBroker) -> Self {
        Self {
            cookie,
            backend: Backend::Broker(broker),
        }
    }

    pub fn for_adapter(
        cookie: SessionCookie,
        adapter: Arc<dyn SessionAdapter>,
        provider: ProviderKind,
    ) -> Self {
        Self {
            cookie,
            backend: Backend::Adapter { adapter, provider },
        }
    }

    /// Current provider access token for the caller's session, best-effort.
    pub async fn get_access_token(&self, ctx: &RequestContext) -> Option<String> {
        let opaque_id = self.cookie.read(ctx.cookie_header.as_deref()?)?;

        match &self.backend {
            Backend::Broker(broker) => match broker.resolve(&opaque_id).await {
                Ok(Some(record)) if record.error.is_none() => Some(record.access_token),
                Ok(_) => None,
                Err(e) => {
                    tracing::warn!(error = %e, "access token lookup failed");
                    None
                }
            },
            Backend::Adapter { adapter, provider } => {
                match account_token(adapter.as_ref(), &opaque_id, *provider).await {
                    Ok(token) => token,
                    Err(e) => {
                        tracing::warn!(error = %e, "access token lookup failed");
                        None
                    }
                }
            }
        }
    }
}

/// Session token → user → (user, provider) account → stored access token.
async fn account_token(
    adapter: &dyn SessionAdapter,
    session_token: &str,
    provider: ProviderKind,
) -> Result<Option<String>, AdapterError> {
    let Some((session, _user)) = adapter.get_session_and_user(session_token).await? else {
        return Ok(None);
    };
    let account = adapter
        .get_user_account(&session.user_id, provider.as_str())
        .await?;
    Ok(account.and_then(|a| a.access_token))
}
