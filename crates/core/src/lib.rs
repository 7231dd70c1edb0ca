pub mod collaborators;
pub mod controller;
pub mod conversation;
pub mod error;
pub mod report;
pub mod state;

pub use collaborators::{AudioOutput, NoAudioRouting, ProgressStore, TokenProvider, TokenStore};
pub use controller::{Collaborators, SessionController, SessionSettings};
pub use error::SessionError;
pub use report::{GrammarPoint, PartialProgressReport, ProgressReport};
pub use state::{ConnectionState, UiState};

/// Represents commands that the conversation logic issues to the session
/// runtime.
///
/// The reducer in [`conversation`] stays free of I/O by describing the side
/// effect it needs; [`SessionController`] executes it.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Save the report with the progress store, then publish it.
    PersistReport(ProgressReport),
    /// Release every transport resource held by the session.
    Disconnect,
}
