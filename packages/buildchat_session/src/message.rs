//! Conversation message types.
//!
//! A [`Message`] is one turn in the conversation. Messages the server
//! considers durable carry an `id`; an assistant turn that is still being
//! streamed in chunk by chunk has none.

use serde::{Deserialize, Deserializer, Serialize};

/// Server-assigned message identity.
pub type MessageId = i64;

/// Who authored a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One turn in the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,

    #[serde(default, deserialize_with = "null_as_default")]
    pub content: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking_content: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<MessageId>,

    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub images: Vec<String>,
}

/// Reads an explicit JSON `null` as the type's default.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

const DEFAULT_THINKING_HEADLINE: &str = "Thinking...";

impl Message {
    /// A locally authored user turn, not yet acknowledged by the server.
    pub fn user(content: impl Into<String>, images: Vec<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            thinking_content: None,
            id: None,
            images,
        }
    }

    /// A fresh in-progress assistant turn seeded from the first chunk.
    pub fn assistant_chunk(content: &str, thinking: &str) -> Self {
        let mut message = Self {
            role: Role::Assistant,
            content: String::new(),
            thinking_content: None,
            id: None,
            images: Vec::new(),
        };
        message.append_chunk(content, thinking);
        message
    }

    pub fn is_assistant(&self) -> bool {
        self.role == Role::Assistant
    }

    /// True for turns the server has not (yet) given an identity.
    pub fn is_in_progress(&self) -> bool {
        self.id.is_none()
    }

    /// Append streamed fragments. An empty thinking fragment leaves
    /// `thinking_content` untouched.
    pub fn append_chunk(&mut self, content: &str, thinking: &str) {
        self.content.push_str(content);
        if !thinking.is_empty() {
            self.thinking_content
                .get_or_insert_with(String::new)
                .push_str(thinking);
        }
    }

    /// Fold an authoritative full update into this message.
    ///
    /// Content and role always come from `incoming`. Identity, reasoning text
    /// and images are taken from `incoming` when it carries them and kept
    /// otherwise, so absorbing the same update twice is a no-op.
    pub fn absorb(&mut self, incoming: &Message) {
        self.role = incoming.role;
        self.content.clone_from(&incoming.content);
        if incoming.id.is_some() {
            self.id = incoming.id;
        }
        if incoming.thinking_content.is_some() {
            self.thinking_content.clone_from(&incoming.thinking_content);
        }
        if !incoming.images.is_empty() {
            self.images.clone_from(&incoming.images);
        }
    }

    /// Whether the renderer should show the reasoning indicator instead of
    /// the (still empty) answer.
    pub fn shows_thinking(&self) -> bool {
        self.content.is_empty()
            && self
                .thinking_content
                .as_deref()
                .is_some_and(|t| !t.is_empty())
    }

    /// The last `### ` header in the reasoning text, used as a one-line
    /// progress label while the agent thinks.
    pub fn thinking_headline(&self) -> &str {
        let Some(thinking) = self.thinking_content.as_deref() else {
            return DEFAULT_THINKING_HEADLINE;
        };
        let mut headline = None;
        let mut rest = thinking;
        while let Some(start) = rest.find("### ") {
            let after = &rest[start + 4..];
            // A header only counts once its line is complete.
            let Some(end) = after.find('\n') else {
                break;
            };
            if end > 0 {
                headline = Some(&after[..end]);
            }
            rest = &after[end..];
        }
        headline.unwrap_or(DEFAULT_THINKING_HEADLINE)
    }
}

/// The single outbound message shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub role: Role,
    pub content: String,
    pub images: Vec<String>,
}

impl OutboundMessage {
    pub fn user(content: impl Into<String>, images: Vec<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            images,
        }
    }

    /// Blank prompts without attachments are never sent.
    pub fn is_blank(&self) -> bool {
        self.content.trim().is_empty() && self.images.is_empty()
    }

    /// The optimistic local copy shown until the server echoes the turn.
    pub fn to_message(&self) -> Message {
        Message {
            role: self.role,
            content: self.content.clone(),
            thinking_content: None,
            id: None,
            images: self.images.clone(),
        }
    }
}
