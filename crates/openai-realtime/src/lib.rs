//! Client-side plumbing for an OpenAI Realtime voice session over WebRTC.
//!
//! The handshake is split into three steps driven by [`SessionNegotiator`]:
//! a device-local SDP offer, one HTTPS round-trip to the realtime gateway, and
//! application of the gateway's answer. Once the peer connection is up,
//! [`EventChannel`] carries JSON control and event frames over the
//! `oai-events` data channel.
//!
//! Everything native is reached through the [`PeerTransport`] and
//! [`DataChannel`] traits. [`WebRtcTransport`] is the production
//! implementation; the `test-util` feature exposes in-memory doubles.

pub mod channel;
pub mod credential;
pub mod error;
pub mod negotiator;
pub mod rtc;
pub mod transport;

#[cfg(any(test, feature = "test-util"))]
pub mod fake;

pub use channel::EventChannel;
pub use credential::EphemeralKey;
pub use error::{Error, Result};
pub use negotiator::{GatewayConfig, SdpKind, SessionDescription, SessionNegotiator};
pub use rtc::WebRtcTransport;
pub use transport::{
    AudioFrame, AudioSource, DEFAULT_STUN_URL, DataChannel, MessageHandler, PeerConfig,
    PeerTransport,
};

pub use openai_realtime_types as types;

/// SDP exchange endpoint of the hosted realtime gateway.
pub const DEFAULT_GATEWAY_URL: &str = "https://api.openai.com/v1/realtime";

/// Model requested when none is configured.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini-realtime-preview-2024-12-17";
