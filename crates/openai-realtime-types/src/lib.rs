//! Wire types for the OpenAI Realtime data channel.
//!
//! Every frame on the `oai-events` data channel is a JSON text message with a
//! `type` discriminator. This crate holds the inbound frame shape, the typed
//! [`ServerEvent`] union the rest of the workspace works with, and the
//! outbound [`ClientEvent`]s the client is allowed to send.

pub mod client;
pub mod event;

pub use client::{ClientEvent, ContentPart, ContentType, ConversationItem, ItemRole, ItemType};
pub use event::{EventFrame, OutputItem, ResponseObject, ServerEvent};

/// Label of the data channel the realtime gateway listens on.
pub const EVENTS_CHANNEL_LABEL: &str = "oai-events";

// --- Inbound event types ---

pub const EVENT_TYPE_OUTPUT_AUDIO_BUFFER_STARTED: &str = "output_audio_buffer.started";
pub const EVENT_TYPE_OUTPUT_AUDIO_BUFFER_STOPPED: &str = "output_audio_buffer.stopped";
pub const EVENT_TYPE_RESPONSE_AUDIO_TRANSCRIPT_DELTA: &str = "response.audio_transcript.delta";
pub const EVENT_TYPE_RESPONSE_DONE: &str = "response.done";

// --- Outbound event types ---

pub const EVENT_TYPE_CONVERSATION_ITEM_CREATE: &str = "conversation.item.create";
pub const EVENT_TYPE_RESPONSE_CREATE: &str = "response.create";

/// `type` of an output item that requests a function call.
pub const OUTPUT_ITEM_FUNCTION_CALL: &str = "function_call";
