//! Error taxonomy of a tutoring session.

use thiserror::Error;

/// Errors that can end a session or block its final report.
///
/// Variants carry rendered messages so that a failure can be cloned into UI
/// state and returned from collaborator mocks.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// No local auth token, or the backend rejected it.
    #[error("authentication required: {0}")]
    Auth(String),

    /// The native transport could not be set up, or an offer/answer was
    /// rejected.
    #[error("negotiation failed: {0}")]
    Negotiation(String),

    /// The realtime gateway answered with a non-2xx status.
    #[error("gateway returned {status}: {body}")]
    Gateway { status: u16, body: String },

    /// Network-level failure.
    #[error("network error: {0}")]
    Transport(String),

    /// A server event or the final report could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// The progress report could not be saved.
    #[error("could not save progress: {0}")]
    Persistence(String),

    #[error("timed out: {0}")]
    Timeout(String),
}

impl From<openai_realtime::Error> for SessionError {
    fn from(err: openai_realtime::Error) -> Self {
        use openai_realtime::Error as E;
        match err {
            E::Negotiation(msg) => Self::Negotiation(msg),
            E::Gateway { status, body } => Self::Gateway { status, body },
            E::Transport(e) => Self::Transport(e.to_string()),
            E::Decode(e) => Self::Decode(e.to_string()),
            E::Channel(msg) => Self::Transport(msg),
            E::Timeout(msg) => Self::Timeout(msg),
        }
    }
}
