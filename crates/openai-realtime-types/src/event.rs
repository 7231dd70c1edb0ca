//! Inbound events received on the data channel.

use serde::{Deserialize, Serialize};

use crate::{
    EVENT_TYPE_OUTPUT_AUDIO_BUFFER_STARTED, EVENT_TYPE_OUTPUT_AUDIO_BUFFER_STOPPED,
    EVENT_TYPE_RESPONSE_AUDIO_TRANSCRIPT_DELTA, EVENT_TYPE_RESPONSE_DONE,
    OUTPUT_ITEM_FUNCTION_CALL,
};

/// A raw frame as it appears on the wire.
///
/// Only the fields the client acts on are modelled; anything else the gateway
/// sends is ignored during decoding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventFrame {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<ResponseObject>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<String>,
}

impl EventFrame {
    /// Decodes a single text frame.
    pub fn decode(payload: &str) -> serde_json::Result<Self> {
        serde_json::from_str(payload)
    }
}

/// The `response` object carried by `response.done`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseObject {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Vec<OutputItem>>,
}

/// One item of a completed response. Function calls carry a `name` and the
/// call `arguments` as a JSON-encoded string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputItem {
    #[serde(rename = "type")]
    pub item_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

impl OutputItem {
    pub fn is_function_call(&self) -> bool {
        self.item_type == OUTPUT_ITEM_FUNCTION_CALL
    }
}

/// Typed view of an inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// The gateway started playing AI audio.
    SpeechStarted,
    /// The gateway stopped playing AI audio.
    SpeechStopped,
    /// A fragment of the transcript of the AI's spoken reply.
    TranscriptDelta { text: String },
    /// A response finished; `output` holds any function calls it requested.
    ResponseDone { output: Vec<OutputItem> },
    /// Any event type the client does not act on.
    Other { event_type: String },
}

impl ServerEvent {
    /// Decodes a text frame straight into a typed event.
    pub fn decode(payload: &str) -> serde_json::Result<Self> {
        EventFrame::decode(payload).map(Self::from)
    }

    /// The wire `type` this event was decoded from.
    pub fn event_type(&self) -> &str {
        match self {
            Self::SpeechStarted => EVENT_TYPE_OUTPUT_AUDIO_BUFFER_STARTED,
            Self::SpeechStopped => EVENT_TYPE_OUTPUT_AUDIO_BUFFER_STOPPED,
            Self::TranscriptDelta { .. } => EVENT_TYPE_RESPONSE_AUDIO_TRANSCRIPT_DELTA,
            Self::ResponseDone { .. } => EVENT_TYPE_RESPONSE_DONE,
            Self::Other { event_type } => event_type,
        }
    }
}

impl From<EventFrame> for ServerEvent {
    fn from(frame: EventFrame) -> Self {
        match frame.event_type.as_str() {
            EVENT_TYPE_OUTPUT_AUDIO_BUFFER_STARTED => Self::SpeechStarted,
            EVENT_TYPE_OUTPUT_AUDIO_BUFFER_STOPPED => Self::SpeechStopped,
            EVENT_TYPE_RESPONSE_AUDIO_TRANSCRIPT_DELTA => Self::TranscriptDelta {
                text: frame.delta.unwrap_or_default(),
            },
            EVENT_TYPE_RESPONSE_DONE => Self::ResponseDone {
                output: frame
                    .response
                    .and_then(|response| response.output)
                    .unwrap_or_default(),
            },
            _ => Self::Other {
                event_type: frame.event_type,
            },
        }
    }
}
