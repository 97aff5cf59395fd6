//! Per-user connection state and configuration.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use wire_bridge_host::{keys, CredentialStore, SessionTokens, UserCredential};

use crate::conversations::ConversationService;
use crate::error::{ApiError, ApiResult};
use crate::session::expiry_after;

/// Placeholder shown instead of a stored token.
const MASKED_TOKEN: &str = "dummyTokenContent";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    pub connected: bool,
    pub url: String,
}

/// Cached remote identity, as stored after login.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IdentitySummary {
    pub user_id: String,
    pub user_name: String,
    pub user_displayname: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SettingsSummary {
    pub token: String,
    pub url: String,
    pub user_id: String,
    pub user_name: String,
    pub user_displayname: String,
    pub navigation_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ConfigOutcome {
    LoggedIn(IdentitySummary),
    Updated { cleared_identity: bool },
}

pub struct AccountService {
    conversations: Arc<ConversationService>,
}

impl AccountService {
    pub fn new(conversations: Arc<ConversationService>) -> Self {
        Self { conversations }
    }

    pub async fn connection_status(&self, user_id: &str) -> ApiResult<ConnectionStatus> {
        let url = self.remote_url(user_id).await?;
        let credential = UserCredential::load(self.store(), user_id).await?;
        Ok(ConnectionStatus {
            connected: credential.has_session(),
            url,
        })
    }

    pub async fn remote_url(&self, user_id: &str) -> ApiResult<String> {
        self.conversations.gateway().resolve_base_url(user_id).await
    }

    /// Apply personal settings.
    ///
    /// `url` + `login` + `password` together perform a password login.
    /// Otherwise known keys are stored; an empty `token` disconnects the user.
    pub async fn set_config(
        &self,
        user_id: &str,
        values: &BTreeMap<String, String>,
    ) -> ApiResult<ConfigOutcome> {
        if let (Some(url), Some(login), Some(password)) = (
            values.get(keys::URL),
            values.get("login"),
            values.get("password"),
        ) {
            let identity = self
                .login_with_credentials(user_id, url, login, password)
                .await?;
            return Ok(ConfigOutcome::LoggedIn(identity));
        }

        let store = self.store();
        let mut cleared_identity = false;
        for (key, value) in values {
            if !keys::USER_SETTABLE.contains(&key.as_str()) {
                warn!("Ignoring unknown setting '{}' for {}", key, user_id);
                continue;
            }
            if key == keys::TOKEN && value.is_empty() {
                UserCredential::clear_session(store, user_id).await?;
                UserCredential::clear_identity(store, user_id).await?;
                cleared_identity = true;
                continue;
            }
            store.set_user_value(user_id, key, value).await?;
        }
        Ok(ConfigOutcome::Updated { cleared_identity })
    }

    /// Log in with a password and persist the session and identity.
    ///
    /// Any previous session is dropped first. On failure nothing new is stored.
    pub async fn login_with_credentials(
        &self,
        user_id: &str,
        url: &str,
        login: &str,
        password: &str,
    ) -> ApiResult<IdentitySummary> {
        let store = self.store();
        UserCredential::clear_session(store, user_id).await?;

        let session = self.conversations.login_at(url, login, password).await?;
        let remote_user_id = session.remote_user_id.clone().ok_or_else(|| {
            ApiError::InvalidResponse("login response does not name the user".into())
        })?;
        let expires_at = expiry_after(session.expires_in).ok_or_else(|| {
            ApiError::InvalidResponse(format!(
                "login expires_in out of range: {}",
                session.expires_in
            ))
        })?;

        store.set_user_value(user_id, keys::URL, url).await?;
        UserCredential::store_session(
            store,
            user_id,
            &SessionTokens {
                access_token: session.access_token,
                expires_at,
                cookie: session.cookie.value,
                full_cookie: session.cookie.raw,
            },
        )
        .await?;
        store.set_user_value(user_id, keys::USER_ID, &remote_user_id).await?;
        info!("{} connected to {}", user_id, url);

        self.cache_identity(user_id, remote_user_id).await
    }

    /// Cache `/self` under the user's identity keys.
    async fn cache_identity(
        &self,
        user_id: &str,
        remote_user_id: String,
    ) -> ApiResult<IdentitySummary> {
        let store = self.store();
        match self.conversations.fetch_self(user_id).await {
            Ok(me) => {
                let summary = IdentitySummary {
                    user_id: me.id,
                    user_name: me.handle.unwrap_or_default(),
                    user_displayname: me.name.unwrap_or_default(),
                };
                UserCredential::store_identity(
                    store,
                    user_id,
                    &summary.user_id,
                    &summary.user_name,
                    &summary.user_displayname,
                )
                .await?;
                Ok(summary)
            }
            Err(err) => {
                warn!("Could not fetch remote identity for {}: {}", user_id, err);
                store.delete_user_value(user_id, keys::USER_NAME).await?;
                store
                    .delete_user_value(user_id, keys::USER_DISPLAYNAME)
                    .await?;
                Ok(IdentitySummary {
                    user_id: remote_user_id,
                    ..IdentitySummary::default()
                })
            }
        }
    }

    /// Apply installation-wide settings. An empty value removes the key.
    pub async fn set_admin_config(&self, values: &BTreeMap<String, String>) -> ApiResult<()> {
        let store = self.store();
        for (key, value) in values {
            if !keys::APP_SETTABLE.contains(&key.as_str()) {
                warn!("Ignoring unknown admin setting '{}'", key);
                continue;
            }
            if value.is_empty() {
                store.delete_app_value(key).await?;
            } else {
                store.set_app_value(key, value).await?;
            }
        }
        Ok(())
    }

    pub async fn settings_summary(&self, user_id: &str) -> ApiResult<SettingsSummary> {
        let credential = UserCredential::load(self.store(), user_id).await?;
        Ok(SettingsSummary {
            token: if credential.access_token.is_some() {
                MASKED_TOKEN.to_string()
            } else {
                String::new()
            },
            url: self.remote_url(user_id).await?,
            user_id: credential.remote_user_id.unwrap_or_default(),
            user_name: credential.remote_user_handle.unwrap_or_default(),
            user_displayname: credential.remote_user_display_name.unwrap_or_default(),
            navigation_enabled: credential.navigation_enabled,
        })
    }

    fn store(&self) -> &dyn CredentialStore {
        self.conversations.gateway().store().as_ref()
    }
}
