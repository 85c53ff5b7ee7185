// Best-effort sign-in notification.
//
// After a successful sign-in the broker tells the downstream profile service
// about the user. The call is spawned and never awaited by the sign-in path;
// failures go to the error reporter and nowhere else.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::task::JoinHandle;

use portal_auth_core::{ErrorReporter, ProviderKind, ReportedError};

/// Profile upsert payload. `access_token` authorizes the call and is never
/// part of the JSON body.
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInEvent {
    pub provider: ProviderKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip)]
    pub access_token: String,
}

impl std::fmt::Debug for SignInEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignInEvent")
            .field("provider", &self.provider)
            .field("user_id", &self.user_id)
            .field("email", &self.email)
            .field("name", &self.name)
            .field("access_token", &"[redacted]")
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("profile service request failed: {0}")]
    Transport(String),
    #[error("profile service returned HTTP {0}")]
    Rejected(u16),
}

#[async_trait]
pub trait SignInNotifier: Send + Sync + std::fmt::Debug {
    async fn notify(&self, event: &SignInEvent) -> Result<(), NotifyError>;
}

/// Posts the sign-in profile to an HTTP endpoint with the user's bearer token.
#[derive(Debug, Clone)]
pub struct HttpProfileNotifier {
    endpoint: String,
    http: reqwest::Client,
}

impl HttpProfileNotifier {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, NotifyError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| NotifyError::Transport(e.to_string()))?;
        Ok(Self::with_http_client(endpoint, http))
    }

    pub fn with_http_client(endpoint: impl Into<String>, http: reqwest::Client) -> Self {
        Self {
            endpoint: endpoint.into(),
            http,
        }
    }
}

#[async_trait]
impl SignInNotifier for HttpProfileNotifier {
    async fn notify(&self, event: &SignInEvent) -> Result<(), NotifyError> {
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&event.access_token)
            .json(event)
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Rejected(status.as_u16()));
        }
        tracing::debug!(provider = %event.provider, "profile sync delivered");
        Ok(())
    }
}

/// Fire the notification on a background task.
///
/// The handle is returned for tests; production callers drop it.
pub fn dispatch(
    notifier: Arc<dyn SignInNotifier>,
    event: SignInEvent,
    reporter: Arc<dyn ErrorReporter>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = notifier.notify(&event).await {
            tracing::warn!(provider = %event.provider, error = %e, "profile sync failed");
            reporter.report(
                &ReportedError::new("profile_sync_failed", e.to_string())
                    .with_tag("provider", event.provider),
            );
        }
    })
}
