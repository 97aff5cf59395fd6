//! Thin HTTP client for the remote chat service.
//!
//! `RemoteClient` only knows how to put a request on the wire and collect the
//! full response. It never interprets status codes; callers decide what a
//! 4xx/5xx means for them.

use std::time::Duration;

use reqwest::header::{HeaderMap, AUTHORIZATION, CONTENT_TYPE, COOKIE, SET_COOKIE};
use reqwest::redirect::Policy;
use reqwest::{Client, Method, StatusCode};
use serde_json::Value;

use crate::config::USER_AGENT;
use crate::error::{ApiError, ApiResult};

/// Name of the remote session cookie.
pub const SESSION_COOKIE_NAME: &str = "zuid";

#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(Value),
    Bytes(Vec<u8>),
}

#[derive(Debug, Clone)]
pub struct RemoteRequest {
    pub method: Method,
    pub url: String,
    pub bearer: Option<String>,
    pub session_cookie: Option<String>,
    pub json_content_type: bool,
    pub body: RequestBody,
}

impl RemoteRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            bearer: None,
            session_cookie: None,
            json_content_type: false,
            body: RequestBody::Empty,
        }
    }

    pub fn bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }

    /// Attach `Cookie: zuid=<cookie>`.
    pub fn session_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.session_cookie = Some(cookie.into());
        self
    }

    /// Send `Content-Type: application/json` regardless of the body.
    pub fn json_content_type(mut self) -> Self {
        self.json_content_type = true;
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.json_content_type = true;
        self.body = RequestBody::Json(body);
        self
    }

    pub fn bytes(mut self, body: Vec<u8>) -> Self {
        self.body = RequestBody::Bytes(body);
        self
    }
}

#[derive(Debug, Clone)]
pub struct RemoteResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl RemoteResponse {
    pub fn is_error(&self) -> bool {
        self.status.as_u16() >= 400
    }

    /// Parse the body as JSON. An empty body reads as `null`.
    pub fn json(&self) -> ApiResult<Value> {
        if self.body.iter().all(|b| b.is_ascii_whitespace()) {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&self.body)
            .map_err(|e| ApiError::InvalidResponse(format!("body is not valid JSON: {}", e)))
    }

    /// First `Set-Cookie` header, if any.
    pub fn set_cookie(&self) -> Option<&str> {
        self.headers
            .get(SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
    }
}

#[derive(Debug, Clone)]
pub struct RemoteClient {
    http: Client,
}

impl RemoteClient {
    pub fn new(timeout: Duration) -> ApiResult<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .redirect(Policy::limited(5))
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { http })
    }

    pub async fn send(&self, request: RemoteRequest) -> ApiResult<RemoteResponse> {
        let mut builder = match request.method {
            Method::GET => self.http.get(&request.url),
            Method::POST => self.http.post(&request.url),
            Method::PUT => self.http.put(&request.url),
            Method::DELETE => self.http.delete(&request.url),
            other => return Err(ApiError::BadMethod(other.to_string())),
        };

        if let Some(token) = &request.bearer {
            builder = builder.header(AUTHORIZATION, format!("Bearer {}", token));
        }
        if let Some(cookie) = &request.session_cookie {
            builder = builder.header(COOKIE, format!("{}={}", SESSION_COOKIE_NAME, cookie));
        }
        if request.json_content_type {
            builder = builder.header(CONTENT_TYPE, "application/json");
        }
        builder = match request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.body(value.to_string()),
            RequestBody::Bytes(bytes) => builder.body(bytes),
        };

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();

        Ok(RemoteResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn client() -> RemoteClient {
        RemoteClient::new(Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_sends_headers_and_json_body() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/posts")
                .header("authorization", "Bearer tok")
                .header("cookie", "zuid=abc")
                .header("content-type", "application/json")
                .header("user-agent", USER_AGENT)
                .json_body(json!({"message": "hi"}));
            then.status(201).json_body(json!({"id": "p1"}));
        });

        let response = client()
            .send(
                RemoteRequest::new(Method::POST, server.url("/posts"))
                    .bearer("tok")
                    .session_cookie("abc")
                    .json(json!({"message": "hi"})),
            )
            .await
            .unwrap();

        mock.assert();
        assert!(!response.is_error());
        assert_eq!(response.json().unwrap()["id"], "p1");
    }

    #[tokio::test]
    async fn test_error_status_is_not_a_transport_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/self");
            then.status(403).body("denied");
        });

        let response = client()
            .send(RemoteRequest::new(Method::GET, server.url("/self")))
            .await
            .unwrap();
        assert!(response.is_error());
        assert_eq!(response.body, b"denied");
    }

    #[tokio::test]
    async fn test_unsupported_method_is_never_sent() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.path("/self");
            then.status(200);
        });

        let err = client()
            .send(RemoteRequest::new(Method::PATCH, server.url("/self")))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::BadMethod(ref m) if m == "PATCH"));
        mock.assert_calls(0);
    }

    #[tokio::test]
    async fn test_configured_timeout_is_applied() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/slow");
            then.status(200).delay(Duration::from_secs(3));
        });

        let err = RemoteClient::new(Duration::from_millis(200))
            .unwrap()
            .send(RemoteRequest::new(Method::GET, server.url("/slow")))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::TransportError(_)));
    }

    #[tokio::test]
    async fn test_connection_failure_becomes_transport_error() {
        let err = client()
            .send(RemoteRequest::new(Method::GET, "http://127.0.0.1:9/self"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::TransportError(_)));
    }

    #[test]
    fn test_json_parsing() {
        let empty = RemoteResponse {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Vec::new(),
        };
        assert_eq!(empty.json().unwrap(), Value::Null);

        let garbage = RemoteResponse {
            body: b"<html>".to_vec(),
            ..empty
        };
        assert!(matches!(
            garbage.json().unwrap_err(),
            ApiError::InvalidResponse(_)
        ));
    }
}
