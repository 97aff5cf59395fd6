//! Authenticated request entry point.
//!
//! Every call to the remote service, except login, goes through `ApiGateway`:
//! it resolves the user's base URL, lets the session manager refresh the
//! token, attaches credentials, and collapses any 4xx/5xx into
//! `ApiError::BadCredentials`.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::HeaderMap;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use wire_bridge_host::{keys, CredentialStore, UserCredential};

use crate::client::{RemoteClient, RemoteRequest};
use crate::config::BridgeConfig;
use crate::error::{ApiError, ApiResult};
use crate::session::SessionManager;

/// One authenticated request, relative to the user's base URL.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub endpoint: String,
    pub method: Method,
    /// Query string for GET, JSON body otherwise.
    pub params: Map<String, Value>,
    pub wants_json: bool,
    pub use_cookie: bool,
}

impl ApiRequest {
    pub fn new(method: Method, endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            method,
            params: Map::new(),
            wants_json: true,
            use_cookie: false,
        }
    }

    pub fn get(endpoint: impl Into<String>) -> Self {
        Self::new(Method::GET, endpoint)
    }

    pub fn post(endpoint: impl Into<String>) -> Self {
        Self::new(Method::POST, endpoint)
    }

    pub fn param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    /// Return the body bytes and headers instead of parsed JSON.
    pub fn raw(mut self) -> Self {
        self.wants_json = false;
        self
    }

    pub fn with_cookie(mut self) -> Self {
        self.use_cookie = true;
        self
    }
}

#[derive(Debug, Clone)]
pub struct RawPayload {
    pub body: Vec<u8>,
    pub headers: HeaderMap,
}

#[derive(Debug, Clone)]
pub enum Payload {
    Json(Value),
    Raw(RawPayload),
}

impl Payload {
    pub fn into_json(self) -> ApiResult<Value> {
        match self {
            Payload::Json(value) => Ok(value),
            Payload::Raw(raw) => serde_json::from_slice(&raw.body)
                .map_err(|e| ApiError::InvalidResponse(format!("body is not valid JSON: {}", e))),
        }
    }

    pub fn into_raw(self) -> RawPayload {
        match self {
            Payload::Raw(raw) => raw,
            Payload::Json(value) => RawPayload {
                body: value.to_string().into_bytes(),
                headers: HeaderMap::new(),
            },
        }
    }
}

pub struct ApiGateway {
    client: RemoteClient,
    session: SessionManager,
    store: Arc<dyn CredentialStore>,
    default_url: String,
}

impl ApiGateway {
    pub fn new(config: &BridgeConfig, store: Arc<dyn CredentialStore>) -> ApiResult<Self> {
        let client = RemoteClient::new(Duration::from_secs(config.remote.timeout_secs))?;
        let session = SessionManager::new(
            client.clone(),
            store.clone(),
            config.session.refresh_margin_secs,
        );
        Ok(Self {
            client,
            session,
            store,
            default_url: config.default_url().to_string(),
        })
    }

    pub fn client(&self) -> &RemoteClient {
        &self.client
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    /// User override, then installation value, then the configured default.
    pub async fn resolve_base_url(&self, user_id: &str) -> ApiResult<String> {
        if let Some(url) = self.store.get_user_value(user_id, keys::URL).await? {
            return Ok(url);
        }
        if let Some(url) = self.store.get_app_value(keys::URL).await? {
            return Ok(url);
        }
        Ok(self.default_url.clone())
    }

    pub async fn call(&self, user_id: &str, request: ApiRequest) -> ApiResult<Payload> {
        let base_url = self.resolve_base_url(user_id).await?;
        self.session.ensure_valid(user_id, &base_url).await?;
        let credential = UserCredential::load(self.store.as_ref(), user_id).await?;

        let mut url = endpoint_url(&base_url, &request.endpoint);
        let is_get = request.method == Method::GET;
        if is_get && !request.params.is_empty() {
            url.push('?');
            url.push_str(&encode_query(&request.params));
        }

        let mut remote = RemoteRequest::new(request.method, url).json_content_type();
        if let Some(token) = credential.access_token {
            remote = remote.bearer(token);
        }
        if request.use_cookie {
            remote = remote.session_cookie(credential.session_cookie.unwrap_or_default());
        }
        if !is_get && !request.params.is_empty() {
            remote = remote.json(Value::Object(request.params));
        }

        let response = self.client.send(remote).await.map_err(|err| {
            debug!("Remote API error on {}: {}", request.endpoint, err);
            err
        })?;

        if response.is_error() {
            debug!(
                "Remote API {} answered HTTP {}",
                request.endpoint, response.status
            );
            return Err(ApiError::BadCredentials);
        }

        if request.wants_json {
            Ok(Payload::Json(response.json()?))
        } else {
            Ok(Payload::Raw(RawPayload {
                body: response.body,
                headers: response.headers,
            }))
        }
    }

    /// `call` with JSON parsing into `T`.
    pub async fn call_json<T: DeserializeOwned>(
        &self,
        user_id: &str,
        request: ApiRequest,
    ) -> ApiResult<T> {
        let endpoint = request.endpoint.clone();
        let value = self.call(user_id, request).await?.into_json()?;
        serde_json::from_value(value).map_err(|e| {
            ApiError::InvalidResponse(format!("unexpected {} payload: {}", endpoint, e))
        })
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        user_id: &str,
        endpoint: &str,
    ) -> ApiResult<T> {
        self.call_json(user_id, ApiRequest::get(endpoint)).await
    }

    pub async fn fetch_raw(&self, user_id: &str, endpoint: &str) -> ApiResult<RawPayload> {
        Ok(self
            .call(user_id, ApiRequest::get(endpoint).raw())
            .await?
            .into_raw())
    }

    /// POST raw bytes. The endpoint carries its own query string.
    pub async fn upload(&self, user_id: &str, endpoint: &str, body: Vec<u8>) -> ApiResult<Value> {
        let base_url = self.resolve_base_url(user_id).await?;
        self.session.ensure_valid(user_id, &base_url).await?;
        let credential = UserCredential::load(self.store.as_ref(), user_id).await?;

        let mut remote = RemoteRequest::new(Method::POST, endpoint_url(&base_url, endpoint)).bytes(body);
        if let Some(token) = credential.access_token {
            remote = remote.bearer(token);
        }

        let response = self.client.send(remote).await.map_err(|err| {
            warn!("Remote API send file error: {}", err);
            err
        })?;
        if response.is_error() {
            warn!("Remote API send file answered HTTP {}", response.status);
            return Err(ApiError::BadCredentials);
        }
        response.json()
    }
}

fn endpoint_url(base_url: &str, endpoint: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), endpoint)
}

/// Encode GET parameters the way the remote query parser expects.
///
/// Array values come first as repeated `key[]=value&` pairs, each followed by
/// `&` even when nothing else follows. The remaining parameters are appended
/// in form encoding: booleans as `1`/`0`, nulls dropped, objects as
/// `key[sub]=value`.
pub fn encode_query(params: &Map<String, Value>) -> String {
    let mut query = String::new();
    for (key, value) in params {
        if let Value::Array(items) = value {
            for item in items {
                query.push_str(key);
                query.push_str("[]=");
                query.push_str(&urlencode(&scalar_string(item)));
                query.push('&');
            }
        }
    }

    let mut pairs = Vec::new();
    for (key, value) in params {
        if !value.is_array() {
            push_pairs(&urlencode(key), value, &mut pairs);
        }
    }
    query.push_str(&pairs.join("&"));
    query
}

fn push_pairs(prefix: &str, value: &Value, pairs: &mut Vec<String>) {
    match value {
        Value::Null => {}
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                push_pairs(&format!("{}%5B{}%5D", prefix, index), item, pairs);
            }
        }
        Value::Object(map) => {
            for (key, item) in map {
                push_pairs(&format!("{}%5B{}%5D", prefix, urlencode(key)), item, pairs);
            }
        }
        Value::Bool(flag) => pairs.push(format!("{}={}", prefix, if *flag { 1 } else { 0 })),
        scalar => pairs.push(format!("{}={}", prefix, urlencode(&scalar_string(scalar)))),
    }
}

fn scalar_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(true) => "1".to_string(),
        Value::Bool(false) => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Form encoding with `*` escaped too.
pub(crate) fn urlencode(raw: &str) -> String {
    url::form_urlencoded::byte_serialize(raw.as_bytes())
        .collect::<String>()
        .replace('*', "%2A")
}
