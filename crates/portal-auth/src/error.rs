// Broker and adapter errors.
//
// Store failures of any kind fail closed: callers see `CacheUnavailable`
// (broker) or `AdapterError::Store` (adapter), never a silent fallback.

use portal_auth_core::ErrorCode;
use portal_auth_redis::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// Unknown or expired session id.
    #[error("session not found")]
    SessionNotFound,

    #[error("cache store unavailable: {0}")]
    CacheUnavailable(String),

    /// A cached record could not be decoded or encoded.
    #[error("session record serialization failed: {0}")]
    Serialization(String),
}

impl BrokerError {
    /// Code safe to show the browser.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::SessionNotFound => ErrorCode::SessionNotFound,
            Self::CacheUnavailable(_) => ErrorCode::CacheUnavailable,
            Self::Serialization(_) => ErrorCode::InternalServerError,
        }
    }
}

impl From<StoreError> for BrokerError {
    fn from(e: StoreError) -> Self {
        Self::CacheUnavailable(e.to_string())
    }
}

impl From<serde_json::Error> for BrokerError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("adapter record serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("user not found")]
    UserNotFound,
}

impl AdapterError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Store(_) => ErrorCode::CacheUnavailable,
            Self::Serialization(_) => ErrorCode::InternalServerError,
            Self::UserNotFound => ErrorCode::Unauthorized,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_fail_closed() {
        let e: BrokerError = StoreError::Other("WRONGTYPE".into()).into();
        assert_eq!(e.code(), ErrorCode::CacheUnavailable);
        let e: BrokerError = StoreError::Unavailable("refused".into()).into();
        assert_eq!(e.code(), ErrorCode::CacheUnavailable);
    }
}
