//! Profile read and update for the signed-in user.

use serde::{Deserialize, Serialize};

use crate::api::{ApiClient, ApiError};

/// The signed-in user's profile. Unset fields are omitted on update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default, skip_serializing)]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_picture_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub english_level: Option<String>,
}

pub struct ProfileService {
    api: ApiClient,
}

impl ProfileService {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    pub async fn get(&self) -> Result<Profile, ApiError> {
        self.api.get("profile/me").await
    }

    pub async fn update(&self, changes: &Profile) -> Result<Profile, ApiError> {
        self.api.patch("profile/me", changes).await
    }
}
