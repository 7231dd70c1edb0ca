//! Shared HTTP plumbing for the backend REST API.

use std::sync::Arc;

use reqwest::{RequestBuilder, Response, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use tracing::{debug, warn};
use tutor_core::{SessionError, TokenStore};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// No auth token is stored locally.
    #[error("not signed in")]
    Unauthenticated,
    /// The backend answered with a non-2xx status.
    #[error("HTTP {code}: {message}")]
    Status { code: u16, message: String },
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),
    /// The local token store could not be written.
    #[error("token storage error: {0}")]
    Storage(#[from] std::io::Error),
}

impl ApiError {
    /// Missing token or a 401 from the backend.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Unauthenticated)
            || matches!(self, Self::Status { code, .. } if *code == StatusCode::UNAUTHORIZED.as_u16())
    }

    /// Maps into the session taxonomy. `other` wraps failures that are
    /// neither auth nor network related.
    pub fn into_session_error(self, other: fn(String) -> SessionError) -> SessionError {
        if self.is_auth() {
            return SessionError::Auth(self.to_string());
        }
        match self {
            Self::Network(e) => SessionError::Transport(e.to_string()),
            e => other(e.to_string()),
        }
    }
}

/// Authenticated JSON client for the backend.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    tokens: Arc<dyn TokenStore>,
}

impl ApiClient {
    pub fn new(base_url: &str, tokens: Arc<dyn TokenStore>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            tokens,
        }
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn tokens(&self) -> &Arc<dyn TokenStore> {
        &self.tokens
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder, ApiError> {
        let token = self.tokens.get_token().ok_or(ApiError::Unauthenticated)?;
        Ok(request.bearer_auth(token))
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let request = self.authorized(self.http.get(self.url(path)))?;
        self.send(request).await
    }

    pub async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let request = self.authorized(self.http.post(self.url(path)).json(body))?;
        self.send(request).await
    }

    pub async fn patch<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let request = self.authorized(self.http.patch(self.url(path)).json(body))?;
        self.send(request).await
    }

    /// POST without an auth token, for sign-up and login.
    pub async fn post_public<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.send(self.http.post(self.url(path)).json(body)).await
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        let response = request.send().await?;
        handle_response(response).await
    }
}

/// Decodes a 2xx body as `T`; turns anything else into [`ApiError::Status`].
pub async fn handle_response<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let status = response.status();
    let url = response.url().path().to_string();
    let body = response.text().await?;

    if status.is_success() {
        debug!(status = status.as_u16(), %url, bytes = body.len(), "Backend response");
        return Ok(serde_json::from_str(&body)?);
    }

    warn!(status = status.as_u16(), %url, "Backend request failed");
    Err(ApiError::Status {
        code: status.as_u16(),
        message: error_message(&body),
    })
}

/// Extracts `detail` from an error body, falling back to the raw text.
fn error_message(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => match map.get("detail") {
            Some(Value::String(detail)) => detail.clone(),
            Some(detail) => detail.to_string(),
            None => body.to_string(),
        },
        _ => body.to_string(),
    }
}
