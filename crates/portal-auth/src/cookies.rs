// Session cookie — the only artifact the browser holds.
//
// The value is `<opaque id>.<signature>`: either the broker's session id
// (cookie strategy) or the adapter's session token (database strategy).
// Provider tokens are never written here.

use std::collections::HashMap;

use portal_auth_core::PortalAuthOptions;

use crate::crypto::{make_signature, verify_signature, SignatureError};

pub const SECURE_COOKIE_PREFIX: &str = "__Secure-";

#[derive(Clone)]
pub struct SessionCookie {
    name: String,
    secret: String,
    secure: bool,
    max_age_secs: u64,
}

impl std::fmt::Debug for SessionCookie {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCookie")
            .field("name", &self.name)
            .field("secure", &self.secure)
            .field("max_age_secs", &self.max_age_secs)
            .finish_non_exhaustive()
    }
}

impl SessionCookie {
    pub fn new(name: impl Into<String>, secret: impl Into<String>, secure: bool, max_age_secs: u64) -> Self {
        Self {
            name: name.into(),
            secret: secret.into(),
            secure,
            max_age_secs,
        }
    }

    /// Cookie for the configured strategy: broker sessions live for the
    /// session TTL, adapter sessions for the adapter TTL.
    pub fn from_options(options: &PortalAuthOptions) -> Self {
        let max_age = match options.session_strategy {
            portal_auth_core::SessionStrategy::Cookie => options.session_ttl_secs,
            portal_auth_core::SessionStrategy::Database => options.adapter_ttl_secs,
        };
        Self::new(
            options.cookie_name.clone(),
            options.secret.clone(),
            options.secure_cookies,
            max_age,
        )
    }

    /// Full cookie name, with `__Secure-` when secure cookies are on.
    pub fn name(&self) -> String {
        if self.secure {
            format!("{SECURE_COOKIE_PREFIX}{}", self.name)
        } else {
            self.name.clone()
        }
    }

    /// `Set-Cookie` header value carrying the signed opaque id.
    pub fn issue(&self, opaque_id: &str) -> Result<String, SignatureError> {
        let signature = make_signature(opaque_id, &self.secret)?;
        Ok(self.serialize(&format!("{opaque_id}.{signature}"), self.max_age_secs))
    }

    /// `Set-Cookie` header value that deletes the cookie.
    pub fn clear(&self) -> String {
        self.serialize("", 0)
    }

    /// Extract and verify the opaque id from a `Cookie` request header.
    ///
    /// Returns `None` for a missing cookie or a bad signature.
    pub fn read(&self, cookie_header: &str) -> Option<String> {
        let cookies = parse_cookies(cookie_header);
        let raw = cookies.get(&self.name())?;
        let (value, signature) = raw.rsplit_once('.')?;
        if value.is_empty() || !verify_signature(value, &self.secret, signature) {
            return None;
        }
        Some(value.to_string())
    }

    fn serialize(&self, value: &str, max_age: u64) -> String {
        let mut cookie = format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
            self.name(),
            value,
            max_age
        );
        if self.secure {
            cookie.push_str("; Secure");
        }
        cookie
    }
}

/// Parse a `Cookie` header string into a map of name → value.
pub fn parse_cookies(cookie_header: &str) -> HashMap<String, String> {
    cookie_header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cookie() -> SessionCookie {
        SessionCookie::new("portal.session-token", "a-very-long-cookie-secret", true, 604_800)
    }

    fn request_header(set_cookie: &str) -> String {
        set_cookie.split(';').next().unwrap().to_string()
    }

    #[test]
    fn test_issue_and_read() {
        let c = cookie();
        let set_cookie = c.issue("sess-123").unwrap();
        assert!(set_cookie.starts_with("__Secure-portal.session-token=sess-123."));
        assert!(set_cookie.contains("HttpOnly"));
        assert!(set_cookie.contains("Max-Age=604800"));
        assert!(set_cookie.ends_with("; Secure"));

        let header = format!("theme=dark; {}", request_header(&set_cookie));
        assert_eq!(c.read(&header).as_deref(), Some("sess-123"));
    }

    #[test]
    fn test_tampered_value_rejected() {
        let c = cookie();
        let header = request_header(&c.issue("sess-123").unwrap()).replace("sess-123", "sess-999");
        assert!(c.read(&header).is_none());
    }

    #[test]
    fn test_other_secret_rejected() {
        let header = request_header(&cookie().issue("sess-123").unwrap());
        let other = SessionCookie::new("portal.session-token", "another-cookie-secret-value", true, 1);
        assert!(other.read(&header).is_none());
    }

    #[test]
    fn test_missing_or_unsigned_cookie() {
        let c = cookie();
        assert!(c.read("").is_none());
        assert!(c.read("__Secure-portal.session-token=plain").is_none());
    }

    #[test]
    fn test_clear_expires_cookie() {
        let cleared = SessionCookie::new("sid", "a-very-long-cookie-secret", false, 10).clear();
        assert_eq!(cleared, "sid=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    }

    #[test]
    fn test_parse_cookies() {
        let map = parse_cookies("a=1; b=2;c=x=y");
        assert_eq!(map["a"], "1");
        assert_eq!(map["b"], "2");
        assert_eq!(map["c"], "x=y");
    }
}
