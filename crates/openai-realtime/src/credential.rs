//! Short-lived credential for the realtime gateway.

use secrecy::{ExposeSecret, SecretString};

/// A bearer token minted by the backend for exactly one session.
///
/// The value is kept behind [`SecretString`] so it never shows up in `Debug`
/// output or logs.
#[derive(Debug, Clone)]
pub struct EphemeralKey {
    value: SecretString,
    expires_at: i64,
}

impl EphemeralKey {
    /// `expires_at` is a Unix timestamp in seconds.
    pub fn new(value: impl Into<String>, expires_at: i64) -> Self {
        Self {
            value: SecretString::from(value.into()),
            expires_at,
        }
    }

    pub fn expose(&self) -> &str {
        self.value.expose_secret()
    }

    pub fn expires_at(&self) -> i64 {
        self.expires_at
    }

    pub fn is_expired_at(&self, unix_seconds: i64) -> bool {
        unix_seconds >= self.expires_at
    }
}
