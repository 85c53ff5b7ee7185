// Scripted identity provider.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use portal_auth_core::ProviderKind;
use portal_auth_oidc::{IdentityProvider, RefreshError, TokenEndpointError, TokenGrant};

/// Answers `refresh` from a queue of scripted results and counts calls.
///
/// An empty queue answers with a transport error.
#[derive(Debug)]
pub struct StubIdentityProvider {
    kind: ProviderKind,
    responses: Mutex<VecDeque<Result<TokenGrant, RefreshError>>>,
    refresh_calls: AtomicUsize,
    seen_refresh_tokens: Mutex<Vec<String>>,
}

impl StubIdentityProvider {
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            responses: Mutex::new(VecDeque::new()),
            refresh_calls: AtomicUsize::new(0),
            seen_refresh_tokens: Mutex::new(Vec::new()),
        }
    }

    pub fn respond_with(self, grant: TokenGrant) -> Self {
        self.push(Ok(grant));
        self
    }

    pub fn fail_with(self, error: RefreshError) -> Self {
        self.push(Err(error));
        self
    }

    fn push(&self, result: Result<TokenGrant, RefreshError>) {
        if let Ok(mut queue) = self.responses.lock() {
            queue.push_back(result);
        }
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    /// Refresh tokens presented so far, oldest first.
    pub fn seen_refresh_tokens(&self) -> Vec<String> {
        self.seen_refresh_tokens
            .lock()
            .map(|seen| seen.clone())
            .unwrap_or_default()
    }

    fn next(&self) -> Result<TokenGrant, TokenEndpointError> {
        self.responses
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front())
            .unwrap_or_else(|| Err(TokenEndpointError::Transport("no scripted response".into())))
    }
}

#[async_trait]
impl IdentityProvider for StubIdentityProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, RefreshError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut seen) = self.seen_refresh_tokens.lock() {
            seen.push(refresh_token.to_string());
        }
        tracing::debug!(provider = %self.kind, "stub refresh");
        self.next()
    }

    async fn exchange_code(
        &self,
        _code: &str,
        _redirect_uri: &str,
        _code_verifier: Option<&str>,
    ) -> Result<TokenGrant, TokenEndpointError> {
        self.next()
    }
}
