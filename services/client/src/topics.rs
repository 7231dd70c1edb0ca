//! Conversation topics offered by the backend.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use crate::api::{ApiClient, ApiError};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Topic {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Text handed to the agent as session instructions.
    pub prompt_context: String,
    #[serde(default)]
    pub difficulty_level: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

pub struct TopicService {
    api: ApiClient,
}

impl TopicService {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    pub async fn list(&self) -> Result<Vec<Topic>, ApiError> {
        self.api.get("topics").await
    }

    /// Topics the signed-in user has already completed.
    pub async fn completed(&self) -> Result<Vec<Topic>, ApiError> {
        self.api.get("topics/completed").await
    }

    pub async fn find(&self, id: i64) -> Result<Option<Topic>, ApiError> {
        Ok(self.list().await?.into_iter().find(|topic| topic.id == id))
    }

    /// Marks `id` completed. The backend answers 409 when it already was.
    pub async fn complete(&self, id: i64) -> Result<(), ApiError> {
        let _: Value = self
            .api
            .post(&format!("topics/{}/complete", id), &Value::Null)
            .await?;
        info!(topic_id = id, "Topic marked completed");
        Ok(())
    }
}
