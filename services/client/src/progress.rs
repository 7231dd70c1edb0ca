//! Progress log persistence.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{error, info};
use tutor_core::{ProgressReport, ProgressStore, SessionError};

use crate::api::{ApiClient, ApiError};

/// A stored report as returned by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProgressEntry {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(flatten)]
    pub report: ProgressReport,
}

pub struct ProgressService {
    api: ApiClient,
}

impl ProgressService {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    pub async fn save(&self, report: &ProgressReport) -> Result<ProgressEntry, ApiError> {
        let entry: ProgressEntry = self.api.post("progress", report).await?;
        info!(id = ?entry.id, duration_minutes = entry.report.duration_minutes, "Progress saved");
        Ok(entry)
    }

    /// All saved reports of the signed-in user, newest first.
    pub async fn history(&self) -> Result<Vec<ProgressEntry>, ApiError> {
        self.api.get("progress").await
    }
}

#[async_trait]
impl ProgressStore for ProgressService {
    async fn save_progress(&self, report: &ProgressReport) -> Result<ProgressReport, SessionError> {
        match self.save(report).await {
            Ok(entry) => Ok(entry.report),
            Err(e) => {
                error!(error = %e, "Failed to save progress report");
                Err(e.into_session_error(SessionError::Persistence))
            }
        }
    }
}
