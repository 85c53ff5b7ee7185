// Token endpoint responses and errors.
//
// Providers and proxies in front of them disagree on key casing
// (`access_token`, `accessToken`, `AccessToken`) and on whether `expires_in`
// is a number or a numeric string. `normalize_token_response` is the single
// place those shapes are accepted; everything past it sees `TokenGrant`.

use std::fmt;

use serde_json::Value;

/// Upper bound accepted for `expires_in`. Anything larger is a broken or
/// hostile response, not a real token lifetime.
pub const MAX_EXPIRES_IN_SECS: i64 = 10 * 365 * 24 * 60 * 60;

/// Canonical token grant returned by the token endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    /// Present only when the provider rotated (or first issued) the refresh token.
    pub refresh_token: Option<String>,
    pub expires_in_secs: i64,
    pub id_token: Option<String>,
    pub token_type: Option<String>,
    pub scope: Option<String>,
}

impl TokenGrant {
    /// Absolute expiry of the access token, in ms since the epoch.
    pub fn expiry_time_ms(&self, now_ms: i64) -> i64 {
        now_ms.saturating_add(self.expires_in_secs.saturating_mul(1000))
    }
}

impl fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenGrant")
            .field("access_token", &"[redacted]")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[redacted]"))
            .field("expires_in_secs", &self.expires_in_secs)
            .field("id_token", &self.id_token.as_ref().map(|_| "[redacted]"))
            .field("token_type", &self.token_type)
            .field("scope", &self.scope)
            .finish()
    }
}

/// Failure talking to a provider's token endpoint.
///
/// `Display` never includes the provider's response body; it is kept in
/// `Rejected::body` for diagnostics only.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TokenEndpointError {
    #[error("token endpoint returned HTTP {status}")]
    Rejected { status: u16, body: Value },
    #[error("token endpoint request failed: {0}")]
    Transport(String),
    #[error("malformed token response: {0}")]
    MalformedResponse(String),
}

/// Error from a `grant_type=refresh_token` call.
pub type RefreshError = TokenEndpointError;

impl TokenEndpointError {
    /// OAuth2 `error` code from a rejection body, e.g. `invalid_grant`.
    pub fn provider_error_code(&self) -> Option<&str> {
        match self {
            Self::Rejected { body, .. } => body.get("error").and_then(Value::as_str),
            _ => None,
        }
    }
}

fn field<'a>(data: &'a Value, snake: &str, camel: &str, pascal: &str) -> Option<&'a Value> {
    data.get(snake)
        .or_else(|| data.get(camel))
        .or_else(|| data.get(pascal))
        .filter(|v| !v.is_null())
}

fn string_field(data: &Value, snake: &str, camel: &str, pascal: &str) -> Option<String> {
    field(data, snake, camel, pascal)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

fn seconds(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Map any accepted token-endpoint response shape to a `TokenGrant`.
pub fn normalize_token_response(data: &Value) -> Result<TokenGrant, TokenEndpointError> {
    if !data.is_object() {
        return Err(TokenEndpointError::MalformedResponse(
            "response is not a JSON object".into(),
        ));
    }

    let access_token = string_field(data, "access_token", "accessToken", "AccessToken")
        .ok_or_else(|| TokenEndpointError::MalformedResponse("missing access_token".into()))?;

    let expires_in_secs = field(data, "expires_in", "expiresIn", "ExpiresIn")
        .ok_or_else(|| TokenEndpointError::MalformedResponse("missing expires_in".into()))
        .and_then(|v| {
            seconds(v).ok_or_else(|| {
                TokenEndpointError::MalformedResponse("expires_in is not a number".into())
            })
        })?;

    if expires_in_secs < 0 {
        return Err(TokenEndpointError::MalformedResponse(
            "expires_in is negative".into(),
        ));
    }
    if expires_in_secs > MAX_EXPIRES_IN_SECS {
        return Err(TokenEndpointError::MalformedResponse(
            "expires_in is out of range".into(),
        ));
    }

    Ok(TokenGrant {
        access_token,
        refresh_token: string_field(data, "refresh_token", "refreshToken", "RefreshToken"),
        expires_in_secs,
        id_token: string_field(data, "id_token", "idToken", "IdToken"),
        token_type: string_field(data, "token_type", "tokenType", "TokenType"),
        scope: string_field(data, "scope", "scope", "Scope"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_snake_case_response() {
        let grant = normalize_token_response(&json!({
            "access_token": "eyJ0.abc",
            "token_type": "Bearer",
            "expires_in": 3599,
            "refresh_token": "0.AVY",
            "scope": "openid profile email offline_access",
            "id_token": "eyJ0.id"
        }))
        .unwrap();
        assert_eq!(grant.access_token, "eyJ0.abc");
        assert_eq!(grant.refresh_token.as_deref(), Some("0.AVY"));
        assert_eq!(grant.expires_in_secs, 3599);
        assert_eq!(grant.token_type.as_deref(), Some("Bearer"));
        assert_eq!(grant.id_token.as_deref(), Some("eyJ0.id"));
    }

    #[test]
    fn test_pascal_and_camel_case_responses() {
        let pascal = normalize_token_response(&json!({
            "AccessToken": "a", "RefreshToken": "r", "ExpiresIn": "3600"
        }))
        .unwrap();
        let camel = normalize_token_response(&json!({
            "accessToken": "a", "refreshToken": "r", "expiresIn": 3600
        }))
        .unwrap();
        assert_eq!(pascal, camel);
        assert_eq!(pascal.expires_in_secs, 3600);
    }

    #[test]
    fn test_missing_refresh_token_is_none() {
        let grant = normalize_token_response(&json!({
            "access_token": "a", "expires_in": 60, "refresh_token": ""
        }))
        .unwrap();
        assert!(grant.refresh_token.is_none());
    }

    #[test]
    fn test_malformed_responses() {
        for bad in [
            json!("nope"),
            json!({ "expires_in": 60 }),
            json!({ "access_token": "a" }),
            json!({ "access_token": "a", "expires_in": "soon" }),
            json!({ "access_token": "a", "expires_in": -5 }),
            json!({ "access_token": "a", "expires_in": 1e300 }),
            json!({ "access_token": "a", "expires_in": i64::MAX / 10 }),
            json!({ "access_token": "a", "expires_in": "99999999999999" }),
        ] {
            assert!(matches!(
                normalize_token_response(&bad),
                Err(TokenEndpointError::MalformedResponse(_))
            ));
        }
    }

    #[test]
    fn test_rejection_display_hides_body() {
        let err = TokenEndpointError::Rejected {
            status: 400,
            body: json!({ "error": "invalid_grant", "error_description": "AADSTS70008 secret detail" }),
        };
        assert_eq!(err.to_string(), "token endpoint returned HTTP 400");
        assert_eq!(err.provider_error_code(), Some("invalid_grant"));
    }

    #[test]
    fn test_expiry_time() {
        let grant = normalize_token_response(&json!({ "access_token": "a", "expires_in": 10 })).unwrap();
        assert_eq!(grant.expiry_time_ms(1_000), 11_000);
    }

    #[test]
    fn test_expiry_time_saturates() {
        let mut grant = normalize_token_response(&json!({ "access_token": "a", "expires_in": 10 })).unwrap();
        grant.expires_in_secs = i64::MAX / 10;
        assert_eq!(grant.expiry_time_ms(1_000), i64::MAX);
    }

    #[test]
    fn test_largest_accepted_lifetime() {
        let grant = normalize_token_response(&json!({
            "access_token": "a", "expires_in": MAX_EXPIRES_IN_SECS
        }))
        .unwrap();
        assert_eq!(grant.expires_in_secs, MAX_EXPIRES_IN_SECS);
    }
}
