//! Services the session depends on but does not implement.

use async_trait::async_trait;
use openai_realtime::EphemeralKey;

use crate::{error::SessionError, report::ProgressReport};

/// Mints the short-lived credential for one realtime session.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// `instructions` configures the agent (topic, persona) for the session
    /// the key is minted for.
    ///
    /// Fails with [`SessionError::Auth`] when no user is signed in.
    async fn ephemeral_key(&self, instructions: &str) -> Result<EphemeralKey, SessionError>;
}

/// Durable storage for completed progress reports.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Saves `report` and returns it as stored.
    async fn save_progress(&self, report: &ProgressReport) -> Result<ProgressReport, SessionError>;
}

/// Device audio routing.
#[cfg_attr(test, mockall::automock)]
pub trait AudioOutput: Send + Sync {
    /// Routes AI playback to the loudspeaker while enabled.
    fn set_speaker_enabled(&self, enabled: bool);
}

/// Key-value storage for the signed-in user's auth token.
pub trait TokenStore: Send + Sync {
    fn get_token(&self) -> Option<String>;
    fn set_token(&self, token: &str) -> std::io::Result<()>;
    fn clear_token(&self) -> std::io::Result<()>;
}

/// An [`AudioOutput`] for hosts without speaker routing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoAudioRouting;

impl AudioOutput for NoAudioRouting {
    fn set_speaker_enabled(&self, _enabled: bool) {}
}
