//! UI-facing state of a session.

use std::fmt;

use crate::report::ProgressReport;

pub const STATUS_READY: &str = "Ready for the conversation.";

/// Lifecycle of the connection to the realtime gateway.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Idle,
    RequestingToken,
    Connecting,
    Connected,
    Error(String),
}

impl ConnectionState {
    /// True while a session is being set up or is running.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Self::RequestingToken | Self::Connecting | Self::Connected
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::RequestingToken => write!(f, "requesting token"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Error(message) => write!(f, "error: {}", message),
        }
    }
}

/// Everything a screen needs to render the conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UiState {
    pub connection_state: ConnectionState,
    /// One human-readable line describing the latest transition.
    pub status_message: String,
    pub final_report: Option<ProgressReport>,
    pub is_ai_speaking: bool,
    /// Transcript of the latest AI utterance. Cleared when the next one
    /// starts.
    pub ai_response_text: String,
    pub(crate) report_accepted: bool,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            connection_state: ConnectionState::Idle,
            status_message: STATUS_READY.to_string(),
            final_report: None,
            is_ai_speaking: false,
            ai_response_text: String::new(),
            report_accepted: false,
        }
    }
}

impl UiState {
    /// Whether a final report has already been accepted this session.
    pub fn report_accepted(&self) -> bool {
        self.report_accepted
    }

    pub(crate) fn fail(&mut self, message: impl Into<String>) {
        let message = message.into();
        self.connection_state = ConnectionState::Error(message.clone());
        self.status_message = message;
        self.is_ai_speaking = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state_is_idle() {
        let state = UiState::default();
        assert_eq!(state.connection_state, ConnectionState::Idle);
        assert_eq!(state.status_message, STATUS_READY);
        assert!(state.final_report.is_none());
        assert!(!state.report_accepted());
    }

    #[test]
    fn test_fail_sets_error_and_stops_speaking() {
        let mut state = UiState {
            is_ai_speaking: true,
            ..UiState::default()
        };
        state.fail("Failed to start: boom");

        assert_eq!(
            state.connection_state,
            ConnectionState::Error("Failed to start: boom".to_string())
        );
        assert_eq!(state.status_message, "Failed to start: boom");
        assert!(!state.is_ai_speaking);
    }

    #[test]
    fn test_active_states() {
        assert!(!ConnectionState::Idle.is_active());
        assert!(ConnectionState::RequestingToken.is_active());
        assert!(ConnectionState::Connecting.is_active());
        assert!(ConnectionState::Connected.is_active());
        assert!(!ConnectionState::Error("x".to_string()).is_active());
    }
}
