//! Conversation message model.
//!
//! Messages form a closed tagged union over the five conversation roles. Each
//! variant serializes to a neutral persisted form here and to each provider's
//! wire shape in [`crate::wire`]. Values are immutable after construction.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ClientError, Result};
use crate::tool_call::ToolCall;

/// A text fragment inside structured message content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "text")]
pub struct TextPart {
    pub text: String,
}

/// Message content, either a plain string or structured parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<TextPart>),
}

impl MessageContent {
    /// Normalize to a single string view.
    #[must_use]
    pub fn text(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Parts(parts) => parts
                .iter()
                .map(|p| p.text.as_str())
                .collect::<Vec<_>>()
                .join(""),
        }
    }
}

impl From<String> for MessageContent {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for MessageContent {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<Vec<TextPart>> for MessageContent {
    fn from(value: Vec<TextPart>) -> Self {
        Self::Parts(value)
    }
}

/// A turn in a conversation.
///
/// `Developer` and `System` are semantically equivalent but kept distinct
/// because provider mappings differ (the Responses adapter consumes the first
/// one as a dedicated instructions field).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Message {
    User {
        content: MessageContent,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(skip)]
        raw_data: Option<Value>,
    },
    Developer {
        content: MessageContent,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(skip)]
        raw_data: Option<Value>,
    },
    System {
        content: MessageContent,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(skip)]
        raw_data: Option<Value>,
    },
    Assistant {
        /// None for a pure tool-call turn.
        content: Option<MessageContent>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        refusal: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
        #[serde(skip)]
        raw_data: Option<Value>,
    },
    Tool {
        content: MessageContent,
        /// Back-reference to the [`ToolCall`] this message answers.
        tool_call_id: String,
        /// Tool name. Required: some provider mappings address the result to a
        /// function-response slot by name, not id.
        name: String,
        #[serde(skip)]
        raw_data: Option<Value>,
    },
}

impl Message {
    /// Build a user turn.
    #[must_use]
    pub fn user(content: impl Into<MessageContent>) -> Self {
        Self::User {
            content: content.into(),
            name: None,
            raw_data: None,
        }
    }

    /// Build a developer turn.
    #[must_use]
    pub fn developer(content: impl Into<MessageContent>) -> Self {
        Self::Developer {
            content: content.into(),
            name: None,
            raw_data: None,
        }
    }

    /// Build a system turn.
    #[must_use]
    pub fn system(content: impl Into<MessageContent>) -> Self {
        Self::System {
            content: content.into(),
            name: None,
            raw_data: None,
        }
    }

    /// Build a text-only assistant turn.
    #[must_use]
    pub fn assistant(content: impl Into<MessageContent>) -> Self {
        Self::Assistant {
            content: Some(content.into()),
            name: None,
            refusal: None,
            tool_calls: Vec::new(),
            raw_data: None,
        }
    }

    /// Build an assistant turn carrying tool calls, with optional text.
    #[must_use]
    pub fn assistant_with_tool_calls(
        content: Option<MessageContent>,
        tool_calls: Vec<ToolCall>,
    ) -> Self {
        Self::Assistant {
            content,
            name: None,
            refusal: None,
            tool_calls,
            raw_data: None,
        }
    }

    /// Build a tool-result turn answering `tool_call_id`.
    #[must_use]
    pub fn tool(
        content: impl Into<MessageContent>,
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self::Tool {
            content: content.into(),
            tool_call_id: tool_call_id.into(),
            name: name.into(),
            raw_data: None,
        }
    }

    /// The role tag as it appears on the wire.
    #[must_use]
    pub fn role(&self) -> &'static str {
        match self {
            Self::User { .. } => "user",
            Self::Developer { .. } => "developer",
            Self::System { .. } => "system",
            Self::Assistant { .. } => "assistant",
            Self::Tool { .. } => "tool",
        }
    }

    /// Single-string view of the content. Empty for a pure tool-call turn.
    #[must_use]
    pub fn content(&self) -> String {
        match self {
            Self::User { content, .. }
            | Self::Developer { content, .. }
            | Self::System { content, .. }
            | Self::Tool { content, .. } => content.text(),
            Self::Assistant { content, .. } => {
                content.as_ref().map(MessageContent::text).unwrap_or_default()
            }
        }
    }

    /// Optional participant name. For tool turns this is the tool name.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::User { name, .. }
            | Self::Developer { name, .. }
            | Self::System { name, .. }
            | Self::Assistant { name, .. } => name.as_deref(),
            Self::Tool { name, .. } => Some(name.as_str()),
        }
    }

    /// Opaque raw provider payload kept for audit, if any.
    #[must_use]
    pub fn raw_data(&self) -> Option<&Value> {
        match self {
            Self::User { raw_data, .. }
            | Self::Developer { raw_data, .. }
            | Self::System { raw_data, .. }
            | Self::Assistant { raw_data, .. }
            | Self::Tool { raw_data, .. } => raw_data.as_ref(),
        }
    }

    /// Serialize to the neutral persisted form.
    #[must_use]
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Deserialize from the neutral persisted form.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::UnknownRole`] for an unrecognized `role`
    /// discriminator: silently dropping a turn would corrupt conversation
    /// semantics. Returns [`ClientError::Parse`] for a structurally invalid
    /// payload.
    pub fn from_json(value: &Value) -> Result<Self> {
        let role = value.get("role").and_then(Value::as_str).unwrap_or("");
        match role {
            "user" | "developer" | "system" | "assistant" | "tool" => {
                serde_json::from_value(value.clone())
                    .map_err(|e| ClientError::Parse(e.to_string()))
            }
            other => Err(ClientError::UnknownRole(other.to_string())),
        }
    }
}
