// Cache key layout. Every logical entity has its own key; no two entities share one.
//
// Caller-supplied components are escaped (`%` → `%25`, `:` → `%3A`) so that
// `:` only ever separates components.

/// Escape one key component.
fn part(component: &str) -> String {
    if !component.contains([':', '%']) {
        return component.to_string();
    }
    let mut out = String::with_capacity(component.len() + 4);
    for c in component.chars() {
        match c {
            '%' => out.push_str("%25"),
            ':' => out.push_str("%3A"),
            c => out.push(c),
        }
    }
    out
}

/// Lowercased, trimmed email. The index key and lookups both go through this.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Broker token record for one session.
pub fn session_key(session_id: &str) -> String {
    format!("session:{}", part(session_id))
}

pub fn user_key(user_id: &str) -> String {
    format!("user:{}", part(user_id))
}

/// Email → user id index. Emails are compared case-insensitively.
pub fn user_email_key(email: &str) -> String {
    format!("user-email:{}", part(&normalize_email(email)))
}

/// Providers linked to a user, as a JSON array.
pub fn user_accounts_key(user_id: &str) -> String {
    format!("user-accounts:{}", part(user_id))
}

pub fn account_key(provider: &str, provider_account_id: &str) -> String {
    format!("account:{}:{}", part(provider), part(provider_account_id))
}

/// (user id, provider) → account key index.
pub fn account_by_user_key(user_id: &str, provider: &str) -> String {
    format!("account-by-user:{}:{}", part(user_id), part(provider))
}

pub fn adapter_session_key(session_token: &str) -> String {
    format!("adapter-session:{}", part(session_token))
}

pub fn verification_key(identifier: &str, token: &str) -> String {
    format!("verification:{}:{}", part(identifier), part(token))
}
