// Error-reporting sink.
//
// Store outages, refresh failures and failed best-effort side effects are
// reported here with contextual tags. Reporters must never fail the caller.

use std::collections::BTreeMap;
use std::fmt;

/// One event for the error-tracking sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportedError {
    /// Short machine-readable kind, e.g. `cache_connection` or `refresh_failed`.
    pub kind: &'static str,
    pub message: String,
    pub tags: BTreeMap<&'static str, String>,
}

impl ReportedError {
    pub fn new(kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            tags: BTreeMap::new(),
        }
    }

    pub fn with_tag(mut self, key: &'static str, value: impl ToString) -> Self {
        self.tags.insert(key, value.to_string());
        self
    }
}

impl fmt::Display for ReportedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

pub trait ErrorReporter: Send + Sync + fmt::Debug {
    fn report(&self, error: &ReportedError);
}

/// Default reporter: emits the event through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingErrorReporter;

impl ErrorReporter for TracingErrorReporter {
    fn report(&self, error: &ReportedError) {
        tracing::error!(kind = error.kind, tags = ?error.tags, "{}", error.message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_are_recorded() {
        let e = ReportedError::new("refresh_failed", "provider said no")
            .with_tag("has_session_id", true)
            .with_tag("provider", "primary-oidc");
        assert_eq!(e.tags["has_session_id"], "true");
        assert_eq!(e.to_string(), "[refresh_failed] provider said no");
    }
}
