//! Per-user and per-installation settings storage.
//!
//! The remote session of a host user lives entirely in this store: the
//! short-lived access token, its expiry, the long-lived `zuid` session cookie
//! and the cached remote identity. Values are plain strings; an empty string
//! reads back as absent.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tokio::sync::RwLock;
use tracing::{instrument, warn};

/// Persistence keys. Names are shared with existing installations and must not change.
pub mod keys {
    pub const URL: &str = "url";
    pub const TOKEN: &str = "token";
    pub const TOKEN_EXPIRES_AT: &str = "token_expires_at";
    pub const COOKIE: &str = "cookie";
    pub const FULL_COOKIE: &str = "full-cookie";
    pub const USER_ID: &str = "user_id";
    pub const USER_NAME: &str = "user_name";
    pub const USER_DISPLAYNAME: &str = "user_displayname";
    pub const NAVIGATION_ENABLED: &str = "navigation_enabled";

    /// Keys a user may set directly through configuration.
    pub const USER_SETTABLE: &[&str] = &[URL, TOKEN, NAVIGATION_ENABLED];
    /// Keys an administrator may set for the whole installation.
    pub const APP_SETTABLE: &[&str] = &[URL];
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get_user_value(&self, user_id: &str, key: &str) -> Result<Option<String>>;
    async fn set_user_value(&self, user_id: &str, key: &str, value: &str) -> Result<()>;
    async fn delete_user_value(&self, user_id: &str, key: &str) -> Result<()>;

    async fn get_app_value(&self, key: &str) -> Result<Option<String>>;
    async fn set_app_value(&self, key: &str, value: &str) -> Result<()>;
    async fn delete_app_value(&self, key: &str) -> Result<()>;
}

/// Token material produced by a login or a refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTokens {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
    /// Short cookie form, sent back as `Cookie: zuid=<cookie>`.
    pub cookie: String,
    /// Raw `Set-Cookie` header the cookie was cut from.
    pub full_cookie: String,
}

/// Typed view of everything the store holds for one host user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserCredential {
    /// The user's own server URL override, if any.
    pub url_override: Option<String>,
    pub access_token: Option<String>,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub session_cookie: Option<String>,
    pub full_session_cookie: Option<String>,
    pub remote_user_id: Option<String>,
    pub remote_user_handle: Option<String>,
    pub remote_user_display_name: Option<String>,
    pub navigation_enabled: bool,
}

impl UserCredential {
    pub async fn load(store: &dyn CredentialStore, user_id: &str) -> Result<Self> {
        let token_expires_at = match store.get_user_value(user_id, keys::TOKEN_EXPIRES_AT).await? {
            Some(raw) => {
                let parsed = parse_unix_timestamp(&raw);
                if parsed.is_none() {
                    warn!("Ignoring malformed token expiration for user {}", user_id);
                }
                parsed
            }
            None => None,
        };

        Ok(Self {
            url_override: store.get_user_value(user_id, keys::URL).await?,
            access_token: store.get_user_value(user_id, keys::TOKEN).await?,
            token_expires_at,
            session_cookie: store.get_user_value(user_id, keys::COOKIE).await?,
            full_session_cookie: store.get_user_value(user_id, keys::FULL_COOKIE).await?,
            remote_user_id: store.get_user_value(user_id, keys::USER_ID).await?,
            remote_user_handle: store.get_user_value(user_id, keys::USER_NAME).await?,
            remote_user_display_name: store
                .get_user_value(user_id, keys::USER_DISPLAYNAME)
                .await?,
            navigation_enabled: store
                .get_user_value(user_id, keys::NAVIGATION_ENABLED)
                .await?
                .as_deref()
                == Some("1"),
        })
    }

    /// True when both halves of a classic login session are present.
    pub fn has_session(&self) -> bool {
        self.access_token.is_some() && self.session_cookie.is_some()
    }

    /// Write token, expiry and cookie together.
    pub async fn store_session(
        store: &dyn CredentialStore,
        user_id: &str,
        tokens: &SessionTokens,
    ) -> Result<()> {
        store
            .set_user_value(user_id, keys::TOKEN, &tokens.access_token)
            .await?;
        store
            .set_user_value(
                user_id,
                keys::TOKEN_EXPIRES_AT,
                &tokens.expires_at.timestamp().to_string(),
            )
            .await?;
        store.set_user_value(user_id, keys::COOKIE, &tokens.cookie).await?;
        store
            .set_user_value(user_id, keys::FULL_COOKIE, &tokens.full_cookie)
            .await?;
        Ok(())
    }

    /// Remove token, expiry and cookie together.
    pub async fn clear_session(store: &dyn CredentialStore, user_id: &str) -> Result<()> {
        for key in [
            keys::TOKEN,
            keys::TOKEN_EXPIRES_AT,
            keys::COOKIE,
            keys::FULL_COOKIE,
        ] {
            store.delete_user_value(user_id, key).await?;
        }
        Ok(())
    }

    pub async fn store_identity(
        store: &dyn CredentialStore,
        user_id: &str,
        remote_id: &str,
        handle: &str,
        display_name: &str,
    ) -> Result<()> {
        store.set_user_value(user_id, keys::USER_ID, remote_id).await?;
        store.set_user_value(user_id, keys::USER_NAME, handle).await?;
        store
            .set_user_value(user_id, keys::USER_DISPLAYNAME, display_name)
            .await?;
        Ok(())
    }

    pub async fn clear_identity(store: &dyn CredentialStore, user_id: &str) -> Result<()> {
        for key in [keys::USER_ID, keys::USER_NAME, keys::USER_DISPLAYNAME] {
            store.delete_user_value(user_id, key).await?;
        }
        Ok(())
    }
}

fn parse_unix_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Process-local store. Used by tests and one-shot tooling.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    user_values: RwLock<HashMap<(String, String), String>>,
    app_values: RwLock<HashMap<String, String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn get_user_value(&self, user_id: &str, key: &str) -> Result<Option<String>> {
        let values = self.user_values.read().await;
        Ok(non_empty(
            values.get(&(user_id.to_string(), key.to_string())).cloned(),
        ))
    }

    async fn set_user_value(&self, user_id: &str, key: &str, value: &str) -> Result<()> {
        self.user_values
            .write()
            .await
            .insert((user_id.to_string(), key.to_string()), value.to_string());
        Ok(())
    }

    async fn delete_user_value(&self, user_id: &str, key: &str) -> Result<()> {
        self.user_values
            .write()
            .await
            .remove(&(user_id.to_string(), key.to_string()));
        Ok(())
    }

    async fn get_app_value(&self, key: &str) -> Result<Option<String>> {
        Ok(non_empty(self.app_values.read().await.get(key).cloned()))
    }

    async fn set_app_value(&self, key: &str, value: &str) -> Result<()> {
        self.app_values
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete_app_value(&self, key: &str) -> Result<()> {
        self.app_values.write().await.remove(key);
        Ok(())
    }
}

/// Store backed by the host SQLite database.
#[derive(Clone)]
pub struct SqliteCredentialStore {
    pool: SqlitePool,
}

impl SqliteCredentialStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for SqliteCredentialStore {
    #[instrument(skip(self))]
    async fn get_user_value(&self, user_id: &str, key: &str) -> Result<Option<String>> {
        let value: Option<String> = sqlx::query_scalar(
            "SELECT value FROM user_values WHERE user_id = ?1 AND key = ?2",
        )
        .bind(user_id)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(non_empty(value))
    }

    #[instrument(skip(self, value))]
    async fn set_user_value(&self, user_id: &str, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO user_values (user_id, key, value) VALUES (?1, ?2, ?3) \
            ON CONFLICT(user_id, key) DO UPDATE SET value = excluded.value",
        )
        .bind(user_id)
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_user_value(&self, user_id: &str, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM user_values WHERE user_id = ?1 AND key = ?2")
            .bind(user_id)
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_app_value(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM app_values WHERE key = ?1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(non_empty(value))
    }

    #[instrument(skip(self, value))]
    async fn set_app_value(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO app_values (key, value) VALUES (?1, ?2) \
            ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_app_value(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM app_values WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HostDatabase;

    fn sample_tokens() -> SessionTokens {
        SessionTokens {
            access_token: "tok-1".to_string(),
            expires_at: DateTime::from_timestamp(1_700_000_900, 0).unwrap(),
            cookie: "ABC123".to_string(),
            full_cookie: "zuid=ABC123; Path=/access; HttpOnly".to_string(),
        }
    }

    #[tokio::test]
    async fn test_empty_values_read_as_absent() {
        let store = MemoryCredentialStore::new();
        store.set_user_value("alice", keys::TOKEN, "").await.unwrap();
        store.set_app_value(keys::URL, "").await.unwrap();

        assert_eq!(store.get_user_value("alice", keys::TOKEN).await.unwrap(), None);
        assert_eq!(store.get_app_value(keys::URL).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_session_stored_and_cleared_as_unit() {
        let store = MemoryCredentialStore::new();
        UserCredential::store_session(&store, "alice", &sample_tokens())
            .await
            .unwrap();

        let cred = UserCredential::load(&store, "alice").await.unwrap();
        assert!(cred.has_session());
        assert_eq!(cred.access_token.as_deref(), Some("tok-1"));
        assert_eq!(cred.session_cookie.as_deref(), Some("ABC123"));
        assert_eq!(cred.token_expires_at.unwrap().timestamp(), 1_700_000_900);

        UserCredential::clear_session(&store, "alice").await.unwrap();
        let cred = UserCredential::load(&store, "alice").await.unwrap();
        assert_eq!(cred.access_token, None);
        assert_eq!(cred.session_cookie, None);
        assert_eq!(cred.full_session_cookie, None);
        assert_eq!(cred.token_expires_at, None);
    }

    #[tokio::test]
    async fn test_malformed_expiry_is_ignored() {
        let store = MemoryCredentialStore::new();
        store
            .set_user_value("bob", keys::TOKEN_EXPIRES_AT, "soon")
            .await
            .unwrap();
        let cred = UserCredential::load(&store, "bob").await.unwrap();
        assert_eq!(cred.token_expires_at, None);
    }

    #[tokio::test]
    async fn test_sqlite_store_upserts_and_deletes() {
        let db = HostDatabase::in_memory().await.unwrap();
        let store = db.credentials();

        store.set_user_value("alice", keys::URL, "https://a").await.unwrap();
        store.set_user_value("alice", keys::URL, "https://b").await.unwrap();
        store.set_user_value("bob", keys::URL, "https://c").await.unwrap();
        assert_eq!(
            store.get_user_value("alice", keys::URL).await.unwrap().as_deref(),
            Some("https://b")
        );

        store.delete_user_value("alice", keys::URL).await.unwrap();
        assert_eq!(store.get_user_value("alice", keys::URL).await.unwrap(), None);
        assert_eq!(
            store.get_user_value("bob", keys::URL).await.unwrap().as_deref(),
            Some("https://c")
        );

        store.set_app_value(keys::URL, "https://admin").await.unwrap();
        assert_eq!(
            store.get_app_value(keys::URL).await.unwrap().as_deref(),
            Some("https://admin")
        );
        store.delete_app_value(keys::URL).await.unwrap();
        assert_eq!(store.get_app_value(keys::URL).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_identity_and_navigation_flag() {
        let store = MemoryCredentialStore::new();
        UserCredential::store_identity(&store, "alice", "u-1", "alice", "Alice A")
            .await
            .unwrap();
        store
            .set_user_value("alice", keys::NAVIGATION_ENABLED, "1")
            .await
            .unwrap();

        let cred = UserCredential::load(&store, "alice").await.unwrap();
        assert_eq!(cred.remote_user_handle.as_deref(), Some("alice"));
        assert!(cred.navigation_enabled);

        UserCredential::clear_identity(&store, "alice").await.unwrap();
        let cred = UserCredential::load(&store, "alice").await.unwrap();
        assert_eq!(cred.remote_user_id, None);
        assert_eq!(cred.remote_user_display_name, None);
    }
}
