//! Messaging gateway abstraction: the bot's view of the chat network.

pub mod stdio;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

pub use stdio::StdioGateway;

/// Domain suffix of one-to-one chats.
pub const USER_SUFFIX: &str = "@c.us";

/// Whether `chat_id` names an individual user.
pub fn is_user_chat(chat_id: &str) -> bool {
    chat_id.ends_with(USER_SUFFIX)
}

/// Type of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Plain text.
    #[default]
    Chat,
    /// Selection from a list message; the body holds the row title.
    ListResponse,
    Location,
    #[serde(other)]
    Other,
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Chat => "chat",
            Self::ListResponse => "list_response",
            Self::Location => "location",
            Self::Other => "other",
        };
        write!(f, "{s}")
    }
}

/// A message seen by the bot, either received or sent by it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    #[serde(default)]
    pub kind: MessageKind,
    pub from: String,
    #[serde(default)]
    pub to: String,
    /// Actual sender inside a group chat.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Sent by the bot itself.
    #[serde(default)]
    pub from_me: bool,
    #[serde(default)]
    pub body: String,
    /// Unix timestamp in seconds.
    #[serde(default)]
    pub timestamp: i64,
}

impl ChatMessage {
    /// A plain text message received from `from`.
    pub fn text(id: impl Into<String>, from: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: MessageKind::Chat,
            from: from.into(),
            to: String::new(),
            author: None,
            from_me: false,
            body: body.into(),
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    pub fn with_kind(mut self, kind: MessageKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    /// The user who wrote the message.
    pub fn sender(&self) -> &str {
        self.author.as_deref().unwrap_or(&self.from)
    }

    /// The chat this message lives in, from the bot's point of view.
    pub fn chat_id(&self) -> &str {
        if self.from_me { &self.to } else { &self.from }
    }
}

/// One selectable row in a list message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListRow {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ListRow {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            id: None,
            description: None,
        }
    }
}

/// A titled group of rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListSection {
    pub title: String,
    pub rows: Vec<ListRow>,
}

/// A list-style message with a button that opens the selectable rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListMessage {
    pub title: String,
    pub description: String,
    pub button_text: String,
    pub sections: Vec<ListSection>,
}

/// Outgoing message content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    Text { text: String },
    List(ListMessage),
}

impl MessageContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Short plain-text rendition, used as the body of the sent message.
    pub fn summary(&self) -> &str {
        match self {
            Self::Text { text } => text,
            Self::List(list) => &list.description,
        }
    }
}

/// Options for sending a message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendOptions {
    /// Reply to this message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quoted_message_id: Option<String>,
}

/// Minimal record of a message queued for deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: String,
    pub timestamp: i64,
}

impl From<&ChatMessage> for MessageRecord {
    fn from(message: &ChatMessage) -> Self {
        Self {
            id: message.id.clone(),
            timestamp: message.timestamp,
        }
    }
}

/// Stream of inbound messages.
pub type MessageStream = Pin<Box<dyn Stream<Item = ChatMessage> + Send>>;

/// Outbound operations of a chat network.
#[async_trait]
pub trait MessagingGateway: Send + Sync {
    /// Send `content` to `destination`, returning the sent message.
    async fn send_message(
        &self,
        destination: &str,
        content: MessageContent,
        options: SendOptions,
    ) -> Result<ChatMessage, GatewayError>;

    /// Delete a batch of messages in `chat_id` for the bot only.
    async fn delete_messages(
        &self,
        chat_id: &str,
        records: &[MessageRecord],
    ) -> Result<(), GatewayError>;

    /// Number of messages currently held in `chat_id`.
    async fn chat_message_count(&self, chat_id: &str) -> Result<usize, GatewayError>;

    /// Remove `chat_id` from the bot's chat list.
    async fn delete_chat(&self, chat_id: &str) -> Result<(), GatewayError>;

    /// Send plain text with default options.
    async fn send_text(&self, destination: &str, text: &str) -> Result<ChatMessage, GatewayError> {
        self.send_message(destination, MessageContent::text(text), SendOptions::default())
            .await
    }
}
