//! Access-token lifecycle.
//!
//! A classic login leaves two credentials behind: a short-lived bearer token
//! and the long-lived `zuid` session cookie. Before every authenticated call
//! the gateway asks `SessionManager::ensure_valid`, which trades the cookie for
//! a fresh token once the current one is within the refresh margin of expiry.
//!
//! There is no per-user lock around refresh. Two concurrent calls racing past
//! the expiry boundary may both refresh; the last write wins.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Method;
use serde::Deserialize;
use tracing::{debug, error, info};

use wire_bridge_host::{keys, CredentialStore, UserCredential};

use crate::client::{RemoteClient, RemoteRequest};
use crate::error::ApiResult;

static COOKIE_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^zuid=").unwrap());
static COOKIE_PATH_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"; Path=.*$").unwrap());

/// Session cookie cut out of a `Set-Cookie` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCookie {
    /// Short form, sent back as `Cookie: zuid=<value>`.
    pub value: String,
    /// The header exactly as received.
    pub raw: String,
}

impl SessionCookie {
    pub fn from_set_cookie(header: &str) -> Self {
        let value = COOKIE_PREFIX.replace(header, "");
        let value = COOKIE_PATH_SUFFIX.replace(&value, "");
        Self {
            value: value.into_owned(),
            raw: header.to_string(),
        }
    }
}

/// Body of a successful `/access` or `/login` call.
#[derive(Debug, Clone, Deserialize)]
pub struct AccessResponse {
    pub access_token: Option<String>,
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
}

/// True when `expires_at` falls inside the margin, or has already passed.
pub fn needs_refresh(expires_at: DateTime<Utc>, now: DateTime<Utc>, margin: Duration) -> bool {
    now > expires_at - margin
}

/// Absolute expiry for a token valid `expires_in` seconds from now.
///
/// `None` when the remote value does not fit a timestamp.
pub fn expiry_after(expires_in: i64) -> Option<DateTime<Utc>> {
    Duration::try_seconds(expires_in).and_then(|ttl| Utc::now().checked_add_signed(ttl))
}

pub struct SessionManager {
    client: RemoteClient,
    store: Arc<dyn CredentialStore>,
    refresh_margin: Duration,
}

impl SessionManager {
    pub fn new(
        client: RemoteClient,
        store: Arc<dyn CredentialStore>,
        refresh_margin_secs: i64,
    ) -> Self {
        Self {
            client,
            store,
            refresh_margin: Duration::seconds(refresh_margin_secs),
        }
    }

    /// Refresh the user's token if it is about to expire.
    ///
    /// Users without a session cookie or without a recorded expiry (for
    /// example a manually pasted token) are left alone. A failed refresh is
    /// logged and absorbed; the caller's next request will surface it.
    pub async fn ensure_valid(&self, user_id: &str, server_url: &str) -> ApiResult<()> {
        let credential = UserCredential::load(self.store.as_ref(), user_id).await?;
        let (Some(_), Some(expires_at)) =
            (&credential.session_cookie, credential.token_expires_at)
        else {
            return Ok(());
        };

        if needs_refresh(expires_at, Utc::now(), self.refresh_margin) {
            debug!("Access token for {} expires at {}, refreshing", user_id, expires_at);
            self.refresh(user_id, server_url).await?;
        }
        Ok(())
    }

    /// Trade the session cookie for a new access token.
    ///
    /// Returns whether a new token was stored. Only storage failures are errors.
    pub async fn refresh(&self, user_id: &str, server_url: &str) -> ApiResult<bool> {
        let credential = UserCredential::load(self.store.as_ref(), user_id).await?;
        let Some(cookie) = credential.session_cookie else {
            error!("No session cookie found for {}", user_id);
            return Ok(false);
        };

        let url = format!("{}/access", server_url.trim_end_matches('/'));
        let mut request = RemoteRequest::new(Method::POST, url).session_cookie(cookie);
        if let Some(token) = credential.access_token {
            request = request.bearer(token);
        }

        let response = match self.client.send(request).await {
            Ok(response) => response,
            Err(err) => {
                error!("Access token refresh failed for {}: {}", user_id, err);
                return Ok(false);
            }
        };
        if response.is_error() {
            error!(
                "Access token refresh refused for {} (HTTP {})",
                user_id, response.status
            );
            return Ok(false);
        }

        let parsed = response
            .json()
            .ok()
            .and_then(|body| serde_json::from_value::<AccessResponse>(body).ok());
        let (access_token, expires_in) = match parsed {
            Some(AccessResponse {
                access_token: Some(token),
                expires_in: Some(expires_in),
                ..
            }) => (token, expires_in),
            _ => {
                error!(
                    "Token is not valid anymore. Impossible to refresh it for {}",
                    user_id
                );
                return Ok(false);
            }
        };

        let Some(expires_at) = expiry_after(expires_in) else {
            error!(
                "Refresh for {} returned an unusable expires_in ({})",
                user_id, expires_in
            );
            return Ok(false);
        };
        self.store
            .set_user_value(user_id, keys::TOKEN, &access_token)
            .await?;
        self.store
            .set_user_value(
                user_id,
                keys::TOKEN_EXPIRES_AT,
                &expires_at.timestamp().to_string(),
            )
            .await?;

        // The service may rotate the cookie on refresh.
        if let Some(header) = response.set_cookie() {
            let rotated = SessionCookie::from_set_cookie(header);
            self.store
                .set_user_value(user_id, keys::COOKIE, &rotated.value)
                .await?;
            self.store
                .set_user_value(user_id, keys::FULL_COOKIE, &rotated.raw)
                .await?;
        }

        info!("Access token successfully refreshed for {}", user_id);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;
    use wire_bridge_host::{MemoryCredentialStore, SessionTokens};

    fn manager(store: Arc<MemoryCredentialStore>) -> SessionManager {
        SessionManager::new(
            RemoteClient::new(std::time::Duration::from_secs(5)).unwrap(),
            store,
            60,
        )
    }

    async fn store_with_session(expires_at: DateTime<Utc>) -> Arc<MemoryCredentialStore> {
        let store = Arc::new(MemoryCredentialStore::new());
        UserCredential::store_session(
            store.as_ref(),
            "alice",
            &SessionTokens {
                access_token: "old-token".to_string(),
                expires_at,
                cookie: "old-cookie".to_string(),
                full_cookie: "zuid=old-cookie; Path=/access".to_string(),
            },
        )
        .await
        .unwrap();
        store
    }

    #[test]
    fn test_cookie_extraction() {
        let cookie = SessionCookie::from_set_cookie("zuid=ABC123; Path=/; HttpOnly; Secure");
        assert_eq!(cookie.value, "ABC123");
        assert_eq!(cookie.raw, "zuid=ABC123; Path=/; HttpOnly; Secure");

        let bare = SessionCookie::from_set_cookie("zuid=XYZ");
        assert_eq!(bare.value, "XYZ");
    }

    #[test]
    fn test_refresh_margin_boundary() {
        let now = Utc::now();
        let margin = Duration::seconds(60);
        assert!(needs_refresh(now - Duration::seconds(1), now, margin));
        assert!(needs_refresh(now + Duration::seconds(30), now, margin));
        assert!(!needs_refresh(now + Duration::seconds(60), now, margin));
        assert!(!needs_refresh(now + Duration::seconds(3600), now, margin));
    }

    #[tokio::test]
    async fn test_no_cookie_never_refreshes() {
        let server = MockServer::start();
        let access = server.mock(|when, then| {
            when.method(POST).path("/access");
            then.status(200).json_body(json!({"access_token": "x", "expires_in": 900}));
        });

        let store = Arc::new(MemoryCredentialStore::new());
        store.set_user_value("alice", keys::TOKEN, "pasted").await.unwrap();
        store
            .set_user_value("alice", keys::TOKEN_EXPIRES_AT, "1")
            .await
            .unwrap();

        manager(store.clone())
            .ensure_valid("alice", &server.base_url())
            .await
            .unwrap();
        access.assert_calls(0);
    }

    #[tokio::test]
    async fn test_missing_expiry_never_refreshes() {
        let server = MockServer::start();
        let access = server.mock(|when, then| {
            when.method(POST).path("/access");
            then.status(200);
        });

        let store = Arc::new(MemoryCredentialStore::new());
        store.set_user_value("alice", keys::COOKIE, "c").await.unwrap();

        manager(store)
            .ensure_valid("alice", &server.base_url())
            .await
            .unwrap();
        access.assert_calls(0);
    }

    #[tokio::test]
    async fn test_fresh_token_is_left_alone() {
        let server = MockServer::start();
        let access = server.mock(|when, then| {
            when.method(POST).path("/access");
            then.status(200);
        });

        let store = store_with_session(Utc::now() + Duration::hours(1)).await;
        manager(store)
            .ensure_valid("alice", &server.base_url())
            .await
            .unwrap();
        access.assert_calls(0);
    }

    #[tokio::test]
    async fn test_expired_token_is_refreshed_and_cookie_rotated() {
        let server = MockServer::start();
        let access = server.mock(|when, then| {
            when.method(POST)
                .path("/access")
                .header("authorization", "Bearer old-token")
                .header("cookie", "zuid=old-cookie");
            then.status(200)
                .header("Set-Cookie", "zuid=new-cookie; Path=/access; HttpOnly")
                .json_body(json!({
                    "access_token": "new-token",
                    "expires_in": 900,
                    "token_type": "Bearer",
                    "user": "u-1"
                }));
        });

        let store = store_with_session(Utc::now() - Duration::minutes(5)).await;
        let before = Utc::now();
        manager(store.clone())
            .ensure_valid("alice", &server.base_url())
            .await
            .unwrap();

        access.assert_calls(1);
        let cred = UserCredential::load(store.as_ref(), "alice").await.unwrap();
        assert_eq!(cred.access_token.as_deref(), Some("new-token"));
        assert_eq!(cred.session_cookie.as_deref(), Some("new-cookie"));
        assert_eq!(
            cred.full_session_cookie.as_deref(),
            Some("zuid=new-cookie; Path=/access; HttpOnly")
        );
        let expires = cred.token_expires_at.unwrap();
        assert!(expires.timestamp() >= before.timestamp() + 899);
    }

    #[tokio::test]
    async fn test_refresh_without_new_cookie_keeps_old_one() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/access");
            then.status(200)
                .json_body(json!({"access_token": "new-token", "expires_in": 900}));
        });

        let store = store_with_session(Utc::now()).await;
        let refreshed = manager(store.clone())
            .refresh("alice", &server.base_url())
            .await
            .unwrap();

        assert!(refreshed);
        let cred = UserCredential::load(store.as_ref(), "alice").await.unwrap();
        assert_eq!(cred.access_token.as_deref(), Some("new-token"));
        assert_eq!(cred.session_cookie.as_deref(), Some("old-cookie"));
    }

    #[tokio::test]
    async fn test_refused_refresh_leaves_credentials_in_place() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/access");
            then.status(403).json_body(json!({"code": 403, "label": "invalid-credentials"}));
        });

        let expired = Utc::now() - Duration::minutes(5);
        let store = store_with_session(expired).await;
        manager(store.clone())
            .ensure_valid("alice", &server.base_url())
            .await
            .unwrap();

        let cred = UserCredential::load(store.as_ref(), "alice").await.unwrap();
        assert_eq!(cred.access_token.as_deref(), Some("old-token"));
        assert_eq!(cred.session_cookie.as_deref(), Some("old-cookie"));
        assert_eq!(cred.token_expires_at.unwrap().timestamp(), expired.timestamp());
    }

    #[tokio::test]
    async fn test_incomplete_refresh_response_is_rejected() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/access");
            then.status(200).json_body(json!({"access_token": "half"}));
        });

        let store = store_with_session(Utc::now() - Duration::minutes(5)).await;
        let refreshed = manager(store.clone())
            .refresh("alice", &server.base_url())
            .await
            .unwrap();

        assert!(!refreshed);
        let cred = UserCredential::load(store.as_ref(), "alice").await.unwrap();
        assert_eq!(cred.access_token.as_deref(), Some("old-token"));
    }

    #[test]
    fn test_expiry_after_rejects_out_of_range_values() {
        assert!(expiry_after(900).is_some());
        assert!(expiry_after(9_000_000_000_000_000).is_none());
        assert!(expiry_after(i64::MAX).is_none());
    }

    #[tokio::test]
    async fn test_out_of_range_expiry_is_a_failed_refresh() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/access");
            then.status(200).json_body(json!({
                "access_token": "x",
                "expires_in": 9_000_000_000_000_000_i64
            }));
        });

        let expired = Utc::now() - Duration::minutes(5);
        let store = store_with_session(expired).await;
        let refreshed = manager(store.clone())
            .refresh("alice", &server.base_url())
            .await
            .unwrap();

        assert!(!refreshed);
        let cred = UserCredential::load(store.as_ref(), "alice").await.unwrap();
        assert_eq!(cred.access_token.as_deref(), Some("old-token"));
        assert_eq!(cred.token_expires_at.unwrap().timestamp(), expired.timestamp());
    }

    #[tokio::test]
    async fn test_concurrent_callers_may_both_refresh() {
        let server = MockServer::start();
        let access = server.mock(|when, then| {
            when.method(POST).path("/access");
            then.status(200)
                .delay(std::time::Duration::from_millis(100))
                .json_body(json!({"access_token": "new-token", "expires_in": 900}));
        });

        let store = store_with_session(Utc::now() - Duration::minutes(5)).await;
        let manager = manager(store.clone());
        let url = server.base_url();
        let (a, b) = tokio::join!(
            manager.ensure_valid("alice", &url),
            manager.ensure_valid("alice", &url)
        );
        a.unwrap();
        b.unwrap();

        // No lock: both callers saw the expired token before either stored a new one.
        assert_eq!(access.calls(), 2);
        let cred = UserCredential::load(store.as_ref(), "alice").await.unwrap();
        assert_eq!(cred.access_token.as_deref(), Some("new-token"));
    }
}
