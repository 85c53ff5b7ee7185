// Error codes and the core error type.
//
// `ErrorCode` is the only error information that may reach the browser.
// Provider error bodies, token values and store diagnostics stay server-side.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable error codes exposed to the browser-facing layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    SessionNotFound,
    RefreshAccessTokenError,
    CacheUnavailable,
    Unauthorized,
    InternalServerError,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::SessionNotFound => "Session not found",
            Self::RefreshAccessTokenError => "Could not refresh access token",
            Self::CacheUnavailable => "Session store unavailable",
            Self::Unauthorized => "Unauthorized",
            Self::InternalServerError => "Internal server error",
        };
        write!(f, "{msg}")
    }
}

impl ErrorCode {
    /// HTTP status a web layer should answer with for this code.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::SessionNotFound | Self::RefreshAccessTokenError | Self::Unauthorized => 401,
            Self::CacheUnavailable => 503,
            Self::InternalServerError => 500,
        }
    }

    /// JSON body for an error response.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "code": self,
            "message": self.to_string(),
        })
    }
}

/// Internal (non-HTTP) error for configuration and wiring failures.
#[derive(Debug, thiserror::Error)]
pub enum PortalAuthError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// Unified result type for portal-auth setup operations.
pub type Result<T> = std::result::Result<T, PortalAuthError>;
