//! Outbound events the client sends over the data channel.

use serde::{Deserialize, Serialize};

use crate::{EVENT_TYPE_CONVERSATION_ITEM_CREATE, EVENT_TYPE_RESPONSE_CREATE};

/// Control messages sent from the client to the realtime gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Adds an item to the conversation.
    #[serde(rename = "conversation.item.create")]
    ConversationItemCreate { item: ConversationItem },
    /// Asks the model to produce a response from the current conversation.
    #[serde(rename = "response.create")]
    ResponseCreate,
}

impl ClientEvent {
    /// A user text message.
    pub fn user_text(text: impl Into<String>) -> Self {
        Self::ConversationItemCreate {
            item: ConversationItem {
                item_type: ItemType::Message,
                role: ItemRole::User,
                content: vec![ContentPart {
                    part_type: ContentType::InputText,
                    text: text.into(),
                }],
            },
        }
    }

    /// The wire `type` this event serializes with.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ConversationItemCreate { .. } => EVENT_TYPE_CONVERSATION_ITEM_CREATE,
            Self::ResponseCreate => EVENT_TYPE_RESPONSE_CREATE,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationItem {
    #[serde(rename = "type")]
    pub item_type: ItemType,
    pub role: ItemRole,
    pub content: Vec<ContentPart>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    Message,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemRole {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentPart {
    #[serde(rename = "type")]
    pub part_type: ContentType,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    InputText,
}
