// Cache-backed session adapter.
//
// Implements the user / account / session / verification-token contract the
// web session layer needs in database mode, using nothing but the cache
// store's get / set / delete / take.
//
// Key layout (see `portal_auth_redis::keys`):
//
//   user:{id}                          → AdapterUser
//   user-email:{email}                 → user id
//   user-accounts:{id}                 → [provider, ...]
//   account:{provider}:{accountId}     → AdapterAccount
//   account-by-user:{id}:{provider}    → account key
//   adapter-session:{token}            → AdapterSession
//   verification:{identifier}:{token}  → VerificationToken
//
// Every write sets the record's full TTL again. Nothing inherits a TTL from
// an earlier write. An account record belongs to the user named in it; the
// by-user index of anyone else is stale and never followed.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use portal_auth_core::options::{DEFAULT_ADAPTER_TTL_SECS, DEFAULT_VERIFICATION_TTL_SECS};
use portal_auth_core::utils::generate_id;
use portal_auth_core::{AdapterAccount, AdapterSession, AdapterUser, VerificationToken};
use portal_auth_redis::keys::{
    account_by_user_key, account_key, adapter_session_key, normalize_email, user_accounts_key,
    user_email_key, user_key, verification_key,
};
use portal_auth_redis::CacheStore;

use crate::error::AdapterError;

// ─── Inputs ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email_verified: Option<DateTime<Utc>>,
}

/// Partial user update. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPatch {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email_verified: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPatch {
    pub session_token: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub expires: Option<DateTime<Utc>>,
}

// ─── Contract ────────────────────────────────────────────────────

#[async_trait]
pub trait SessionAdapter: Send + Sync + std::fmt::Debug {
    async fn create_user(&self, user: NewUser) -> Result<AdapterUser, AdapterError>;
    async fn get_user(&self, id: &str) -> Result<Option<AdapterUser>, AdapterError>;
    async fn get_user_by_email(&self, email: &str) -> Result<Option<AdapterUser>, AdapterError>;
    async fn get_user_by_account(
        &self,
        provider: &str,
        provider_account_id: &str,
    ) -> Result<Option<AdapterUser>, AdapterError>;
    async fn update_user(&self, patch: UserPatch) -> Result<AdapterUser, AdapterError>;
    async fn delete_user(&self, id: &str) -> Result<(), AdapterError>;

    async fn link_account(&self, account: AdapterAccount) -> Result<AdapterAccount, AdapterError>;
    async fn unlink_account(&self, provider: &str, provider_account_id: &str) -> Result<(), AdapterError>;
    async fn get_user_account(
        &self,
        user_id: &str,
        provider: &str,
    ) -> Result<Option<AdapterAccount>, AdapterError>;

    async fn create_session(&self, session: AdapterSession) -> Result<AdapterSession, AdapterError>;
    async fn get_session_and_user(
        &self,
        session_token: &str,
    ) -> Result<Option<(AdapterSession, AdapterUser)>, AdapterError>;
    async fn update_session(&self, patch: SessionPatch) -> Result<Option<AdapterSession>, AdapterError>;
    async fn delete_session(&self, session_token: &str) -> Result<(), AdapterError>;

    async fn create_verification_token(
        &self,
        token: VerificationToken,
    ) -> Result<VerificationToken, AdapterError>;
    /// Destructive read: a second call for the same token returns `None`.
    async fn use_verification_token(
        &self,
        identifier: &str,
        token: &str,
    ) -> Result<Option<VerificationToken>, AdapterError>;
}

// ─── Cache Implementation ────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct CacheAdapter {
    store: Arc<dyn CacheStore>,
    ttl_secs: u64,
    verification_ttl_secs: u64,
}

impl CacheAdapter {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            store,
            ttl_secs: DEFAULT_ADAPTER_TTL_SECS,
            verification_ttl_secs: DEFAULT_VERIFICATION_TTL_SECS,
        }
    }

    /// TTL for users, accounts and sessions.
    pub fn with_ttl(mut self, ttl_secs: u64) -> Self {
        self.ttl_secs = ttl_secs;
        self
    }

    pub fn with_verification_ttl(mut self, ttl_secs: u64) -> Self {
        self.verification_ttl_secs = ttl_secs;
        self
    }

    async fn read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, AdapterError> {
        match self.store.get(key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn write<T: Serialize + Sync>(&self, key: &str, value: &T, ttl_secs: u64) -> Result<(), AdapterError> {
        let raw = serde_json::to_string(value)?;
        self.store.set(key, &raw, ttl_secs).await?;
        Ok(())
    }

    async fn write_user(&self, user: &AdapterUser) -> Result<(), AdapterError> {
        self.write(&user_key(&user.id), user, self.ttl_secs).await?;
        self.store
            .set(&user_email_key(&user.email), &user.id, self.ttl_secs)
            .await?;
        Ok(())
    }

    async fn linked_providers(&self, user_id: &str) -> Result<Vec<String>, AdapterError> {
        Ok(self
            .read::<Vec<String>>(&user_accounts_key(user_id))
            .await?
            .unwrap_or_default())
    }

    async fn write_linked_providers(&self, user_id: &str, providers: &[String]) -> Result<(), AdapterError> {
        let key = user_accounts_key(user_id);
        if providers.is_empty() {
            self.store.delete(&key).await?;
            Ok(())
        } else {
            self.write(&key, &providers, self.ttl_secs).await
        }
    }

    /// Drop `user_id`'s link to `provider` if it points at `account_key`.
    async fn unlink_from_user(&self, user_id: &str, provider: &str, account_key: &str) -> Result<(), AdapterError> {
        let index = account_by_user_key(user_id, provider);
        if self.store.get(&index).await?.as_deref() != Some(account_key) {
            return Ok(());
        }
        self.store.delete(&index).await?;

        let mut providers = self.linked_providers(user_id).await?;
        providers.retain(|p| p != provider);
        self.write_linked_providers(user_id, &providers).await
    }
}

#[async_trait]
impl SessionAdapter for CacheAdapter {
    async fn create_user(&self, user: NewUser) -> Result<AdapterUser, AdapterError> {
        let user = AdapterUser {
            id: generate_id(),
            email: user.email,
            name: user.name,
            email_verified: user.email_verified,
        };
        self.write_user(&user).await?;
        tracing::debug!(user_id = %user.id, "adapter user created");
        Ok(user)
    }

    async fn get_user(&self, id: &str) -> Result<Option<AdapterUser>, AdapterError> {
        self.read(&user_key(id)).await
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<AdapterUser>, AdapterError> {
        let Some(user_id) = self.store.get(&user_email_key(email)).await? else {
            return Ok(None);
        };
        // An index entry pointing at a user whose email moved on is ignored.
        Ok(self
            .get_user(&user_id)
            .await?
            .filter(|u| normalize_email(&u.email) == normalize_email(email)))
    }

    async fn get_user_by_account(
        &self,
        provider: &str,
        provider_account_id: &str,
    ) -> Result<Option<AdapterUser>, AdapterError> {
        let Some(account) = self
            .read::<AdapterAccount>(&account_key(provider, provider_account_id))
            .await?
        else {
            return Ok(None);
        };
        self.get_user(&account.user_id).await
    }

    async fn update_user(&self, patch: UserPatch) -> Result<AdapterUser, AdapterError> {
        let mut user = self.get_user(&patch.id).await?.ok_or(AdapterError::UserNotFound)?;

        if let Some(email) = patch.email {
            if normalize_email(&email) != normalize_email(&user.email) {
                self.store.delete(&user_email_key(&user.email)).await?;
            }
            user.email = email;
        }
        if let Some(name) = patch.name {
            user.name = Some(name);
        }
        if let Some(verified) = patch.email_verified {
            user.email_verified = Some(verified);
        }

        self.write_user(&user).await?;
        Ok(user)
    }

    async fn delete_user(&self, id: &str) -> Result<(), AdapterError> {
        let Some(user) = self.get_user(id).await? else {
            return Ok(());
        };

        for provider in self.linked_providers(id).await? {
            let index = account_by_user_key(id, &provider);
            if let Some(key) = self.store.get(&index).await? {
                let owned = self
                    .read::<AdapterAccount>(&key)
                    .await?
                    .is_some_and(|account| account.user_id == id);
                if owned {
                    self.store.delete(&key).await?;
                }
            }
            self.store.delete(&index).await?;
        }
        self.store.delete(&user_accounts_key(id)).await?;
        self.store.delete(&user_email_key(&user.email)).await?;
        self.store.delete(&user_key(id)).await?;
        tracing::debug!(user_id = %id, "adapter user deleted");
        Ok(())
    }

    async fn link_account(&self, account: AdapterAccount) -> Result<AdapterAccount, AdapterError> {
        let key = account_key(&account.provider, &account.provider_account_id);
        let index = account_by_user_key(&account.user_id, &account.provider);

        // The provider account moves to this user.
        if let Some(existing) = self.read::<AdapterAccount>(&key).await? {
            if existing.user_id != account.user_id {
                self.unlink_from_user(&existing.user_id, &account.provider, &key).await?;
                tracing::info!(
                    from = %existing.user_id,
                    to = %account.user_id,
                    provider = %account.provider,
                    "account relinked to another user"
                );
            }
        }

        // One account per (user, provider): a different previous link is dropped.
        if let Some(previous) = self.store.get(&index).await? {
            if previous != key {
                let owned = self
                    .read::<AdapterAccount>(&previous)
                    .await?
                    .is_some_and(|old| old.user_id == account.user_id);
                if owned {
                    self.store.delete(&previous).await?;
                }
            }
        }

        self.write(&key, &account, self.ttl_secs).await?;
        self.store.set(&index, &key, self.ttl_secs).await?;

        let mut providers = self.linked_providers(&account.user_id).await?;
        if !providers.contains(&account.provider) {
            providers.push(account.provider.clone());
        }
        self.write_linked_providers(&account.user_id, &providers).await?;

        tracing::debug!(user_id = %account.user_id, provider = %account.provider, "account linked");
        Ok(account)
    }

    async fn unlink_account(&self, provider: &str, provider_account_id: &str) -> Result<(), AdapterError> {
        let key = account_key(provider, provider_account_id);
        let Some(account) = self.read::<AdapterAccount>(&key).await? else {
            return Ok(());
        };
        self.store.delete(&key).await?;
        self.unlink_from_user(&account.user_id, provider, &key).await
    }

    async fn get_user_account(
        &self,
        user_id: &str,
        provider: &str,
    ) -> Result<Option<AdapterAccount>, AdapterError> {
        let Some(key) = self.store.get(&account_by_user_key(user_id, provider)).await? else {
            return Ok(None);
        };
        Ok(self
            .read::<AdapterAccount>(&key)
            .await?
            .filter(|account| account.user_id == user_id && account.provider == provider))
    }

    async fn create_session(&self, session: AdapterSession) -> Result<AdapterSession, AdapterError> {
        self.write(&adapter_session_key(&session.session_token), &session, self.ttl_secs)
            .await?;
        Ok(session)
    }

    async fn get_session_and_user(
        &self,
        session_token: &str,
    ) -> Result<Option<(AdapterSession, AdapterUser)>, AdapterError> {
        let key = adapter_session_key(session_token);
        let Some(session) = self.read::<AdapterSession>(&key).await? else {
            return Ok(None);
        };

        if session.expires <= Utc::now() {
            self.store.delete(&key).await?;
            return Ok(None);
        }

        match self.get_user(&session.user_id).await? {
            Some(user) => Ok(Some((session, user))),
            None => {
                tracing::debug!(user_id = %session.user_id, "dropping session of missing user");
                self.store.delete(&key).await?;
                Ok(None)
            }
        }
    }

    async fn update_session(&self, patch: SessionPatch) -> Result<Option<AdapterSession>, AdapterError> {
        let key = adapter_session_key(&patch.session_token);
        let Some(mut session) = self.read::<AdapterSession>(&key).await? else {
            return Ok(None);
        };
        if let Some(user_id) = patch.user_id {
            session.user_id = user_id;
        }
        if let Some(expires) = patch.expires {
            session.expires = expires;
        }
        self.write(&key, &session, self.ttl_secs).await?;
        Ok(Some(session))
    }

    async fn delete_session(&self, session_token: &str) -> Result<(), AdapterError> {
        self.store.delete(&adapter_session_key(session_token)).await?;
        Ok(())
    }

    async fn create_verification_token(
        &self,
        token: VerificationToken,
    ) -> Result<VerificationToken, AdapterError> {
        self.write(
            &verification_key(&token.identifier, &token.token),
            &token,
            self.verification_ttl_secs,
        )
        .await?;
        Ok(token)
    }

    async fn use_verification_token(
        &self,
        identifier: &str,
        token: &str,
    ) -> Result<Option<VerificationToken>, AdapterError> {
        let Some(raw) = self.store.take(&verification_key(identifier, token)).await? else {
            return Ok(None);
        };
        let record: VerificationToken = serde_json::from_str(&raw)?;
        if record.identifier != identifier || record.token != token {
            tracing::warn!("verification record does not match its key");
            return Ok(None);
        }
        if record.expires <= Utc::now() {
            return Ok(None);
        }
        Ok(Some(record))
    }
}
