//! Provider wire shapes and conversions.
//!
//! Every conversion here is a pure function of the value and never fails:
//! when a provider cannot represent a field, the converter maps it to the
//! closest supported shape instead of erroring.

use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::message::{Message, MessageContent};
use crate::tool_call::ToolCall;
use crate::types::ToolDefinition;

// Chat-completions shapes (OpenAI and compatible endpoints, including Ollama's
// OpenAI-style tool calls).

#[derive(Debug, Clone, Serialize)]
pub struct OpenAiMessage {
    pub role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<OpenAiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OpenAiToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: &'static str,
    pub function: OpenAiFunctionCall,
}

#[derive(Debug, Clone, Serialize)]
pub struct OpenAiFunctionCall {
    pub name: String,
    /// Arguments as a JSON-encoded string, the chat-completions convention.
    pub arguments: String,
}

// Google generateContent shapes.

#[derive(Debug, Clone, Serialize)]
pub struct GoogleContent {
    pub role: &'static str,
    pub parts: Vec<GooglePart>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum GooglePart {
    Text {
        text: String,
    },
    FunctionCall {
        #[serde(rename = "functionCall")]
        function_call: GoogleFunctionCall,
    },
    FunctionResponse {
        #[serde(rename = "functionResponse")]
        function_response: GoogleFunctionResponse,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct GoogleFunctionCall {
    pub name: String,
    pub args: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GoogleFunctionResponse {
    pub name: String,
    pub response: Value,
}

// OpenAI Responses API input items.

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ResponseInputItem {
    Message {
        #[serde(rename = "type")]
        kind: &'static str,
        role: &'static str,
        content: String,
    },
    FunctionCall {
        #[serde(rename = "type")]
        kind: &'static str,
        call_id: String,
        name: String,
        arguments: String,
    },
    FunctionCallOutput {
        #[serde(rename = "type")]
        kind: &'static str,
        call_id: String,
        output: String,
    },
}

// Ollama chat shapes.

#[derive(Debug, Clone, Serialize)]
pub struct OllamaMessage {
    pub role: &'static str,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<OllamaToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OllamaToolCall {
    pub function: OllamaFunctionCall,
}

#[derive(Debug, Clone, Serialize)]
pub struct OllamaFunctionCall {
    pub name: String,
    /// Arguments stay structured; Ollama takes objects, not encoded strings.
    pub arguments: Map<String, Value>,
}

impl ToolCall {
    /// Chat-completions call shape. Arguments are JSON-encoded.
    #[must_use]
    pub fn to_openai(&self) -> OpenAiToolCall {
        OpenAiToolCall {
            id: self.id.clone(),
            call_type: "function",
            function: OpenAiFunctionCall {
                name: self.name.clone(),
                arguments: serde_json::to_string(&self.arguments).unwrap_or_default(),
            },
        }
    }

    /// Google functionCall part. The id has no slot and is dropped.
    #[must_use]
    pub fn to_google(&self) -> GooglePart {
        GooglePart::FunctionCall {
            function_call: GoogleFunctionCall {
                name: self.name.clone(),
                args: self.arguments.clone(),
            },
        }
    }

    /// Responses API function_call input item.
    #[must_use]
    pub fn to_response_item(&self) -> ResponseInputItem {
        ResponseInputItem::FunctionCall {
            kind: "function_call",
            call_id: self.id.clone(),
            name: self.name.clone(),
            arguments: serde_json::to_string(&self.arguments).unwrap_or_default(),
        }
    }

    /// Ollama call shape with structured arguments.
    #[must_use]
    pub fn to_ollama(&self) -> OllamaToolCall {
        OllamaToolCall {
            function: OllamaFunctionCall {
                name: self.name.clone(),
                arguments: self.arguments.clone(),
            },
        }
    }
}

impl Message {
    /// Chat-completions message shape.
    #[must_use]
    pub fn to_openai(&self) -> OpenAiMessage {
        match self {
            Self::User { content, name, .. } => text_openai_message("user", content, name),
            Self::Developer { content, name, .. } => {
                text_openai_message("developer", content, name)
            }
            Self::System { content, name, .. } => text_openai_message("system", content, name),
            Self::Assistant {
                content,
                name,
                tool_calls,
                ..
            } => OpenAiMessage {
                role: "assistant",
                content: content.as_ref().map(MessageContent::text),
                name: name.clone(),
                tool_calls: if tool_calls.is_empty() {
                    None
                } else {
                    Some(tool_calls.iter().map(ToolCall::to_openai).collect())
                },
                tool_call_id: None,
            },
            Self::Tool {
                content,
                tool_call_id,
                ..
            } => OpenAiMessage {
                role: "tool",
                content: Some(content.text()),
                name: None,
                tool_calls: None,
                tool_call_id: Some(tool_call_id.clone()),
            },
        }
    }

    /// Google content shape.
    ///
    /// Google only knows "user" and "model" roles: developer and system turns
    /// map to "user", and a tool result becomes a functionResponse part
    /// addressed by the tool's name.
    #[must_use]
    pub fn to_google(&self) -> GoogleContent {
        match self {
            Self::User { content, .. }
            | Self::Developer { content, .. }
            | Self::System { content, .. } => GoogleContent {
                role: "user",
                parts: vec![GooglePart::Text {
                    text: content.text(),
                }],
            },
            Self::Assistant {
                content,
                tool_calls,
                ..
            } => {
                let mut parts = Vec::new();
                if let Some(content) = content {
                    let text = content.text();
                    if !text.is_empty() {
                        parts.push(GooglePart::Text { text });
                    }
                }
                parts.extend(tool_calls.iter().map(ToolCall::to_google));
                GoogleContent {
                    role: "model",
                    parts,
                }
            }
            Self::Tool { content, name, .. } => GoogleContent {
                role: "user",
                parts: vec![GooglePart::FunctionResponse {
                    function_response: GoogleFunctionResponse {
                        name: name.clone(),
                        response: json!({ "result": content.text() }),
                    },
                }],
            },
        }
    }

    /// Responses API input items. An assistant turn with tool calls expands
    /// into one message item (when it has text) plus one function_call item
    /// per call; a tool turn becomes a function_call_output item.
    #[must_use]
    pub fn to_response_items(&self) -> Vec<ResponseInputItem> {
        match self {
            Self::User { content, .. } => vec![response_message("user", content)],
            Self::Developer { content, .. } => vec![response_message("developer", content)],
            Self::System { content, .. } => vec![response_message("system", content)],
            Self::Assistant {
                content,
                tool_calls,
                ..
            } => {
                let mut items = Vec::new();
                if let Some(content) = content {
                    let text = content.text();
                    if !text.is_empty() {
                        items.push(ResponseInputItem::Message {
                            kind: "message",
                            role: "assistant",
                            content: text,
                        });
                    }
                }
                items.extend(tool_calls.iter().map(ToolCall::to_response_item));
                items
            }
            Self::Tool {
                content,
                tool_call_id,
                ..
            } => vec![ResponseInputItem::FunctionCallOutput {
                kind: "function_call_output",
                call_id: tool_call_id.clone(),
                output: content.text(),
            }],
        }
    }

    /// Ollama chat message shape.
    #[must_use]
    pub fn to_ollama(&self) -> OllamaMessage {
        match self {
            Self::User { content, .. } => text_ollama_message("user", content),
            Self::Developer { content, .. } => text_ollama_message("system", content),
            Self::System { content, .. } => text_ollama_message("system", content),
            Self::Assistant {
                content,
                tool_calls,
                ..
            } => OllamaMessage {
                role: "assistant",
                content: content.as_ref().map(MessageContent::text).unwrap_or_default(),
                tool_calls: if tool_calls.is_empty() {
                    None
                } else {
                    Some(tool_calls.iter().map(ToolCall::to_ollama).collect())
                },
                tool_name: None,
            },
            Self::Tool { content, name, .. } => OllamaMessage {
                role: "tool",
                content: content.text(),
                tool_calls: None,
                tool_name: Some(name.clone()),
            },
        }
    }
}

fn text_openai_message(
    role: &'static str,
    content: &MessageContent,
    name: &Option<String>,
) -> OpenAiMessage {
    OpenAiMessage {
        role,
        content: Some(content.text()),
        name: name.clone(),
        tool_calls: None,
        tool_call_id: None,
    }
}

fn response_message(role: &'static str, content: &MessageContent) -> ResponseInputItem {
    ResponseInputItem::Message {
        kind: "message",
        role,
        content: content.text(),
    }
}

fn text_ollama_message(role: &'static str, content: &MessageContent) -> OllamaMessage {
    OllamaMessage {
        role,
        content: content.text(),
        tool_calls: None,
        tool_name: None,
    }
}

/// Chat-completions tool declaration. `additionalProperties` is forced to
/// `!strict`: the API defaults it to true, strict schemas require false.
#[must_use]
pub fn openai_tool(def: &ToolDefinition) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": def.name,
            "description": def.description,
            "parameters": parameters_with_additional(def),
        },
    })
}

/// Responses API tool declaration (flattened, no "function" envelope).
#[must_use]
pub fn responses_tool(def: &ToolDefinition) -> Value {
    json!({
        "type": "function",
        "name": def.name,
        "description": def.description,
        "parameters": parameters_with_additional(def),
        "strict": def.strict,
    })
}

/// Google function declaration with unsupported schema keywords stripped.
#[must_use]
pub fn google_function_declaration(def: &ToolDefinition) -> Value {
    json!({
        "name": def.name,
        "description": def.description,
        "parametersJsonSchema": sanitize_google_schema(&def.parameters),
    })
}

/// Ollama tool declaration (chat-completions envelope, plain JSON schema).
#[must_use]
pub fn ollama_tool(def: &ToolDefinition) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": def.name,
            "description": def.description,
            "parameters": def.parameters,
        },
    })
}

fn parameters_with_additional(def: &ToolDefinition) -> Value {
    let mut parameters = def.parameters.clone();
    if let Value::Object(map) = &mut parameters {
        map.insert(
            "additionalProperties".to_string(),
            Value::Bool(!def.strict),
        );
    }
    parameters
}

/// Recursively remove schema keywords Google's API rejects
/// (`additionalProperties`, `$schema`, `strict`).
#[must_use]
pub fn sanitize_google_schema(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let cleaned = map
                .iter()
                .filter(|(key, _)| {
                    !matches!(key.as_str(), "additionalProperties" | "$schema" | "strict")
                })
                .map(|(key, value)| (key.clone(), sanitize_google_schema(value)))
                .collect();
            Value::Object(cleaned)
        }
        Value::Array(items) => Value::Array(items.iter().map(sanitize_google_schema).collect()),
        other => other.clone(),
    }
}
