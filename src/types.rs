//! Request and result types shared across the orchestrator and adapters.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::message::Message;
use crate::tool_call::ToolCall;

/// A tool the model may call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool's parameters.
    pub parameters: Value,
    /// Strict schemas forbid undeclared properties on providers that honor it.
    #[serde(default)]
    pub strict: bool,
}

impl ToolDefinition {
    /// Create a tool declaration from an explicit JSON Schema.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            strict: false,
        }
    }

    /// Create a tool declaration whose parameter schema is derived from a
    /// Rust type.
    #[must_use]
    pub fn of<T: JsonSchema>(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, description, schemars::schema_for!(T).to_value())
    }
}

/// A structured-response directive: the model's textual output should be a
/// JSON document matching `schema`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseFormat {
    /// Schema name sent to providers that require one. Defaults to "response".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// JSON Schema the output must validate against.
    pub schema: Value,
    /// When set, the orchestrator validates the output and retries failed
    /// generations up to the configured budget.
    #[serde(default)]
    pub strict: bool,
}

impl ResponseFormat {
    #[must_use]
    pub fn new(schema: Value) -> Self {
        Self {
            name: None,
            schema,
            strict: false,
        }
    }

    #[must_use]
    pub fn strict(schema: Value) -> Self {
        Self {
            name: None,
            schema,
            strict: true,
        }
    }

    /// Name to use on the wire.
    #[must_use]
    pub fn wire_name(&self) -> &str {
        self.name.as_deref().unwrap_or("response")
    }
}

/// What to do when a tool loop is detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoopAction {
    /// Drop only the offending tool from the outgoing declarations.
    RemoveTool,
    /// Drop every declared tool.
    RemoveAllTools,
    /// Abort the call with a hard [`crate::ClientError::ToolLoop`] failure.
    Error,
    /// Short-circuit with a synthetic empty result, without contacting a
    /// provider.
    Halt,
}

/// Loop-prevention policy for repeated tool invocations.
///
/// Detection counts tool-result messages per tool name across the whole
/// message list; a tool whose count reaches `max_consecutive` triggers
/// `action` unless exempted. Absence of a policy disables detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolLoopPolicy {
    pub max_consecutive: u32,
    pub action: LoopAction,
    #[serde(default)]
    pub exempt: Vec<String>,
}

impl Default for ToolLoopPolicy {
    fn default() -> Self {
        Self {
            max_consecutive: 3,
            action: LoopAction::RemoveTool,
            exempt: Vec::new(),
        }
    }
}

/// A provider-neutral prompt configuration.
///
/// The orchestrator treats the message list as read-only; interventions build
/// new collections instead of mutating the caller's.
#[derive(Debug, Clone, Default)]
pub struct PromptConfig {
    /// Ordered conversation turns.
    pub messages: Vec<Message>,
    /// Tools the model may call.
    pub tools: Vec<ToolDefinition>,
    /// Standing instructions; providers with a dedicated slot use it, others
    /// receive a system turn.
    pub instructions: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
    pub parallel_tool_calls: Option<bool>,
    /// Structured-response directive.
    pub response_format: Option<ResponseFormat>,
    /// Validation retry budget; defaults to 2. Only consulted when a strict
    /// response format is configured.
    pub num_retries: Option<u32>,
    /// Tool-loop policy; `None` disables loop detection.
    pub tool_loop: Option<ToolLoopPolicy>,
    /// Execute as an incremental stream instead of one synchronous call.
    pub stream: bool,
    /// Vendor-specific fields merged verbatim into the outgoing request.
    pub raw_attributes: Map<String, Value>,
}

/// Token counters reported by a provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_input_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u32>,
}

/// Estimated cost of one request, derived from the pricing registry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostEstimate {
    pub input_cost: f64,
    pub output_cost: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_input_cost: Option<f64>,
    pub total_cost: f64,
    pub currency: String,
}

/// The uniform result of one model turn.
///
/// `output` is `None` exactly when the turn produced only tool calls.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptResult {
    pub output: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<CostEstimate>,
}

impl PromptResult {
    /// The synthetic result used by the halt intervention.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(JsonSchema)]
    #[allow(dead_code)]
    struct AddArgs {
        a: f64,
        b: f64,
    }

    #[test]
    fn tool_definition_from_rust_type_emits_object_schema() {
        let def = ToolDefinition::of::<AddArgs>("add", "Adds two numbers");
        assert_eq!(def.parameters["type"], json!("object"));
        assert!(def.parameters["properties"].get("a").is_some());
        assert!(def.parameters["properties"].get("b").is_some());
    }

    #[test]
    fn response_format_wire_name_defaults() {
        let format = ResponseFormat::new(json!({"type": "object"}));
        assert_eq!(format.wire_name(), "response");
    }

    #[test]
    fn empty_result_has_no_output_and_no_calls() {
        let result = PromptResult::empty();
        assert!(result.output.is_none());
        assert!(result.tool_calls.is_empty());
    }
}
