//! Ephemeral realtime keys minted by the backend.

use async_trait::async_trait;
use chrono::Utc;
use openai_realtime::EphemeralKey;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use tutor_core::{SessionError, TokenProvider};

use crate::api::{ApiClient, ApiError};

#[derive(Debug, Serialize)]
struct EphemeralKeyRequest<'a> {
    instructions: &'a str,
}

#[derive(Debug, Deserialize)]
struct ClientSecret {
    value: String,
    expires_at: i64,
}

/// The backend reports upstream failures in the body with a 200 status.
#[derive(Debug, Deserialize)]
struct EphemeralKeyResponse {
    success: bool,
    client_secret: Option<ClientSecret>,
    error: Option<String>,
    status: Option<u16>,
}

impl EphemeralKeyResponse {
    fn into_key(self) -> Result<EphemeralKey, ApiError> {
        match (self.success, self.client_secret) {
            (true, Some(secret)) => Ok(EphemeralKey::new(secret.value, secret.expires_at)),
            (_, _) => Err(ApiError::Status {
                code: self.status.unwrap_or(502),
                message: self
                    .error
                    .unwrap_or_else(|| "response carried no client secret".to_string()),
            }),
        }
    }
}

/// Fetches one ephemeral key per session from `POST /openai/ephemeral-key`.
pub struct EphemeralKeyService {
    api: ApiClient,
}

impl EphemeralKeyService {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    pub async fn create_key(&self, instructions: &str) -> Result<EphemeralKey, ApiError> {
        let response: EphemeralKeyResponse = self
            .api
            .post("openai/ephemeral-key", &EphemeralKeyRequest { instructions })
            .await?;
        let key = response.into_key()?;
        if key.is_expired_at(Utc::now().timestamp()) {
            return Err(ApiError::Status {
                code: 502,
                message: format!("ephemeral key expired at {}", key.expires_at()),
            });
        }
        info!(expires_at = key.expires_at(), "Ephemeral key issued");
        Ok(key)
    }
}

#[async_trait]
impl TokenProvider for EphemeralKeyService {
    async fn ephemeral_key(&self, instructions: &str) -> Result<EphemeralKey, SessionError> {
        self.create_key(instructions).await.map_err(|e| {
            warn!(error = %e, "Ephemeral key request failed");
            e.into_session_error(SessionError::Transport)
        })
    }
}
