//! The primitive operations a native WebRTC engine must provide.
//!
//! The handshake, the event channel and the conversation logic are written
//! once against these traits. A platform only supplies peer setup, offer
//! creation, remote-answer application, channel I/O and cleanup.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use openai_realtime_types::EVENTS_CHANNEL_LABEL;
use tokio::sync::mpsc;

use crate::error::Result;

/// Public STUN server used when no other ICE server is configured.
pub const DEFAULT_STUN_URL: &str = "stun:stun.l.google.com:19302";

/// Callback invoked with every text frame received on a data channel.
pub type MessageHandler = Box<dyn Fn(String) + Send + Sync>;

/// Peer connection parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerConfig {
    /// ICE server URLs; at least one STUN server.
    pub ice_servers: Vec<String>,
    /// Label of the control/event data channel.
    pub channel_label: String,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            ice_servers: vec![DEFAULT_STUN_URL.to_string()],
            channel_label: EVENTS_CHANNEL_LABEL.to_string(),
        }
    }
}

/// A peer connection driven by the session handshake.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Creates the peer connection, attaches the local audio track and opens
    /// the data channel named in `config`.
    async fn setup(&self, config: &PeerConfig) -> Result<()>;

    /// Generates an SDP offer, applies it as the local description and
    /// returns its text.
    async fn create_offer(&self) -> Result<String>;

    /// Applies the gateway's SDP answer as the remote description.
    async fn set_remote_answer(&self, sdp: &str) -> Result<()>;

    /// The data channel opened during [`PeerTransport::setup`], if any.
    async fn data_channel(&self) -> Option<Arc<dyn DataChannel>>;

    /// Releases every native resource held by the transport.
    ///
    /// Must be idempotent and safe to call while another call is pending.
    async fn close(&self);
}

/// A bidirectional text pipe layered over the peer connection.
#[async_trait]
pub trait DataChannel: Send + Sync {
    fn label(&self) -> String;

    fn is_open(&self) -> bool;

    async fn send_text(&self, payload: &str) -> Result<()>;

    /// Registers `handler` for inbound text frames, replacing any previous
    /// one. `None` unregisters.
    fn set_message_handler(&self, handler: Option<MessageHandler>);

    async fn close(&self);
}

/// One encoded audio frame ready to be written to the local track.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    pub data: Bytes,
    pub duration: Duration,
}

/// Supplies encoded microphone audio (Opus, 48 kHz) for the local track.
pub trait AudioSource: Send + Sync {
    /// Starts capture. Frames stop when the returned receiver's sender side
    /// is dropped.
    fn start(&self) -> Result<mpsc::Receiver<AudioFrame>>;
}
