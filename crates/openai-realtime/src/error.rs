//! Error types for the realtime session transport.

use thiserror::Error;

/// Result type for realtime transport operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while negotiating or running a realtime session.
#[derive(Error, Debug)]
pub enum Error {
    /// The native transport could not be initialised, or an offer/answer
    /// could not be created or applied.
    #[error("negotiation error: {0}")]
    Negotiation(String),

    /// The realtime gateway answered the SDP exchange with a non-2xx status.
    #[error("gateway error: {status}: {body}")]
    Gateway { status: u16, body: String },

    /// Network-level failure talking to the gateway.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// A data-channel frame could not be decoded.
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// The data channel rejected a frame.
    #[error("data channel error: {0}")]
    Channel(String),

    /// An operation did not finish within its deadline.
    #[error("timeout: {0}")]
    Timeout(String),
}

impl Error {
    pub(crate) fn negotiation(err: impl std::fmt::Display) -> Self {
        Self::Negotiation(err.to_string())
    }
}
