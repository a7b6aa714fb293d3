//! Tool call value type.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A function invocation requested by the model.
///
/// The `id` is provider-assigned and empty for providers that do not assign
/// call identifiers. Arguments are always a string-keyed JSON object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Map<String, Value>,
}

impl ToolCall {
    /// Create a tool call from already-structured arguments.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: Map<String, Value>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    /// Create a tool call from a raw argument string.
    ///
    /// The string is parsed as a JSON object. A malformed payload must not
    /// abort an otherwise-successful model turn, so parse failures degrade to
    /// empty arguments with a logged diagnostic instead of failing.
    #[must_use]
    pub fn from_raw(id: impl Into<String>, name: impl Into<String>, raw: &str) -> Self {
        let id = id.into();
        let name = name.into();
        let arguments = parse_arguments(&id, &name, raw);
        Self {
            id,
            name,
            arguments,
        }
    }
}

fn parse_arguments(id: &str, name: &str, raw: &str) -> Map<String, Value> {
    if raw.trim().is_empty() {
        return Map::new();
    }

    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        Ok(other) => {
            tracing::error!(
                name,
                id,
                value = %other,
                "tool call arguments are not a JSON object; using empty arguments"
            );
            Map::new()
        }
        Err(e) => {
            tracing::error!(
                name,
                id,
                error = %e,
                raw,
                "failed to parse tool call arguments; using empty arguments"
            );
            Map::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_structured_json_arguments() {
        let call = ToolCall::from_raw("call_1", "add", r#"{"a": 1, "b": 2}"#);

        assert_eq!(call.id, "call_1");
        assert_eq!(call.name, "add");
        assert_eq!(call.arguments.get("a"), Some(&json!(1)));
        assert_eq!(call.arguments.get("b"), Some(&json!(2)));
    }

    #[test]
    fn malformed_arguments_degrade_to_empty() {
        let call = ToolCall::from_raw("call_2", "add", r#"{"a": 1,"#);
        assert!(call.arguments.is_empty());
    }

    #[test]
    fn non_object_arguments_degrade_to_empty() {
        let call = ToolCall::from_raw("call_3", "add", "42");
        assert!(call.arguments.is_empty());
    }

    #[test]
    fn empty_arguments_string_is_empty_object() {
        let call = ToolCall::from_raw("", "noop", "");
        assert!(call.arguments.is_empty());
        assert!(call.id.is_empty());
    }
}
