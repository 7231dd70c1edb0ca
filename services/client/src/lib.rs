//! Terminal client for the English tutor: backend REST services, local audio
//! devices, token storage and configuration. The `tutor` binary wires them to a
//! [`tutor_core::SessionController`].

pub mod api;
pub mod audio;
pub mod auth;
pub mod config;
pub mod conversation;
pub mod profile;
pub mod progress;
pub mod token_store;
pub mod topics;

#[cfg(test)]
mod test_support;

pub use api::{ApiClient, ApiError};
pub use audio::{AudioError, MicrophoneSource, SpeakerSink};
pub use auth::AuthService;
pub use config::{Config, ConfigError};
pub use conversation::EphemeralKeyService;
pub use profile::{Profile, ProfileService};
pub use progress::{ProgressEntry, ProgressService};
pub use token_store::{FileTokenStore, MemoryTokenStore};
pub use topics::{Topic, TopicService};
