//! Sign-up, login and logout against the backend.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::api::{ApiClient, ApiError};

#[derive(Debug, Clone, Serialize)]
pub struct AuthRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AuthUser {
    pub id: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    pub token_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AuthResponse {
    pub user: AuthUser,
    pub session: AuthSession,
}

pub struct AuthService {
    api: ApiClient,
}

impl AuthService {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    /// Creates an account and signs it in.
    pub async fn signup(&self, email: &str, password: &str) -> Result<AuthUser, ApiError> {
        self.authenticate("auth/signup", email, password).await
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<AuthUser, ApiError> {
        self.authenticate("auth/login", email, password).await
    }

    /// Forgets the stored token. The backend keeps no session to close.
    pub fn logout(&self) -> std::io::Result<()> {
        self.api.tokens().clear_token()?;
        info!("Signed out");
        Ok(())
    }

    pub fn is_signed_in(&self) -> bool {
        self.api.tokens().get_token().is_some()
    }

    async fn authenticate(
        &self,
        path: &str,
        email: &str,
        password: &str,
    ) -> Result<AuthUser, ApiError> {
        let request = AuthRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let response: AuthResponse = self.api.post_public(path, &request).await?;
        self.api.tokens().set_token(&response.session.access_token)?;
        info!(user_id = %response.user.id, "Signed in");
        Ok(response.user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::serve;
    use crate::token_store::MemoryTokenStore;
    use axum::{Json, Router, http::StatusCode, routing::post};
    use serde_json::{Value, json};
    use std::sync::Arc;
    use tutor_core::TokenStore;

    async fn auth_backend() -> String {
        async fn handler(Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
            if body["password"] == "secret" {
                (
                    StatusCode::OK,
                    Json(json!({
                        "user": { "id": "u-1", "email": body["email"] },
                        "session": { "access_token": "jwt-1", "token_type": "bearer" }
                    })),
                )
            } else {
                (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({ "detail": "Invalid credentials" })),
                )
            }
        }
        serve(
            Router::new()
                .route("/auth/login", post(handler))
                .route("/auth/signup", post(handler)),
        )
        .await
    }

    #[tokio::test]
    async fn test_login_stores_access_token() {
        let base = auth_backend().await;
        let tokens = Arc::new(MemoryTokenStore::new());
        let auth = AuthService::new(ApiClient::new(&base, tokens.clone()));

        let user = auth.login("ana@example.com", "secret").await.unwrap();

        assert_eq!(user.id, "u-1");
        assert_eq!(user.email, "ana@example.com");
        assert_eq!(tokens.get_token().as_deref(), Some("jwt-1"));
        assert!(auth.is_signed_in());
    }

    #[tokio::test]
    async fn test_signup_stores_access_token() {
        let base = auth_backend().await;
        let tokens = Arc::new(MemoryTokenStore::new());
        let auth = AuthService::new(ApiClient::new(&base, tokens.clone()));

        auth.signup("new@example.com", "secret").await.unwrap();

        assert_eq!(tokens.get_token().as_deref(), Some("jwt-1"));
    }

    #[tokio::test]
    async fn test_rejected_login_keeps_store_empty() {
        let base = auth_backend().await;
        let tokens = Arc::new(MemoryTokenStore::new());
        let auth = AuthService::new(ApiClient::new(&base, tokens.clone()));

        let err = auth.login("ana@example.com", "wrong").await.unwrap_err();

        assert!(err.is_auth());
        assert_eq!(err.to_string(), "HTTP 401: Invalid credentials");
        assert_eq!(tokens.get_token(), None);
    }

    #[test]
    fn test_logout_clears_token() {
        let tokens = Arc::new(MemoryTokenStore::with_token("jwt-1"));
        let auth = AuthService::new(ApiClient::new("http://127.0.0.1:9", tokens.clone()));

        auth.logout().unwrap();

        assert_eq!(tokens.get_token(), None);
        assert!(!auth.is_signed_in());
    }
}
