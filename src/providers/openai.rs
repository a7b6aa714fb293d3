//! `OpenAI` Chat Completions adapter.
//!
//! Speaks the chat-completions protocol, which a number of compatible
//! endpoints also implement. Streams over SSE; tool calls arrive as indexed
//! argument fragments and are correlated positionally.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::{ClientError, Result};
use crate::message::Message;
use crate::models::calculate_cost;
use crate::provider::{
    AdapterEvent, AdapterEventStream, CorrelationKey, ProviderAdapter, ProviderRequest,
};
use crate::providers::next_sse_event;
use crate::tool_call::ToolCall;
use crate::types::{CostEstimate, PromptResult, TokenUsage};
use crate::wire;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Adapter for the `OpenAI` Chat Completions API and compatible endpoints.
#[derive(Debug, Clone)]
pub struct OpenAiAdapter {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiAdapter {
    /// Create a new adapter.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::ApiKeyMissing`] if the API key is empty.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(ClientError::ApiKeyMissing("openai"));
        }

        Ok(Self {
            http: reqwest::Client::new(),
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: model.into(),
        })
    }

    /// Override the endpoint, for compatible servers.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.api_key))
                .map_err(|_| ClientError::ApiKeyMissing("openai"))?,
        );
        Ok(headers)
    }

    fn build_request(&self, request: &ProviderRequest, stream: bool) -> ChatRequest {
        let mut messages = Vec::new();
        // The chat API has no instructions slot; prepend a system turn.
        if let Some(instructions) = &request.instructions {
            messages.push(Message::system(instructions.as_str()).to_openai());
        }
        messages.extend(request.messages.iter().map(Message::to_openai));

        let tools = if request.tools.is_empty() {
            None
        } else {
            Some(request.tools.iter().map(wire::openai_tool).collect())
        };

        let response_format = request.response_format.as_ref().map(|format| {
            json!({
                "type": "json_schema",
                "json_schema": {
                    "name": format.wire_name(),
                    "schema": format.schema,
                },
            })
        });

        ChatRequest {
            model: self.model.clone(),
            messages,
            tools,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            parallel_tool_calls: request.parallel_tool_calls,
            response_format,
            stream,
            stream_options: stream.then(|| StreamOptions {
                include_usage: true,
            }),
            extra: request.raw_attributes.clone(),
        }
    }

    async fn send(&self, body: &ChatRequest) -> Result<reqwest::Response> {
        let url = format!("{}/chat/completions", self.base_url);
        tracing::debug!(url = %url, model = %body.model, "sending chat completions request");

        let response = self
            .http
            .post(&url)
            .headers(self.headers()?)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ClientError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response)
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<wire::OpenAiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parallel_tool_calls: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<Value>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

// Response types.

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    #[serde(default)]
    id: Option<String>,
    #[serde(rename = "type", default)]
    call_type: Option<String>,
    function: WireFunction,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: Option<u32>,
    #[serde(default)]
    prompt_tokens_details: Option<PromptTokensDetails>,
}

#[derive(Debug, Deserialize)]
struct PromptTokensDetails {
    #[serde(default)]
    cached_tokens: Option<u32>,
}

// Streaming chunk types.

#[derive(Debug, Deserialize)]
struct ChunkWire {
    #[serde(default)]
    choices: Vec<ChoiceWire>,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceWire {
    delta: DeltaWire,
}

#[derive(Debug, Default, Deserialize)]
struct DeltaWire {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCallDeltaWire>>,
}

#[derive(Debug, Deserialize)]
struct ToolCallDeltaWire {
    index: usize,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<FunctionDeltaWire>,
}

#[derive(Debug, Default, Deserialize)]
struct FunctionDeltaWire {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

fn usage_and_cost(model: &str, wire: OpenAiUsage) -> (TokenUsage, Option<CostEstimate>) {
    let usage = TokenUsage {
        input_tokens: wire.prompt_tokens,
        output_tokens: wire.completion_tokens,
        cached_input_tokens: wire.prompt_tokens_details.and_then(|d| d.cached_tokens),
        total_tokens: wire.total_tokens,
    };
    let cost = calculate_cost(model, &usage);
    (usage, cost)
}

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn execute_sync(&self, request: &ProviderRequest) -> Result<PromptResult> {
        let body = self.build_request(request, false);
        let response = self.send(&body).await?;

        let text = response.text().await?;
        let parsed: ChatResponse =
            serde_json::from_str(&text).map_err(|e| ClientError::Parse(e.to_string()))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ClientError::Parse("response contained no choices".to_string()))?;

        let mut tool_calls = Vec::new();
        for call in choice.message.tool_calls.unwrap_or_default() {
            if call.call_type.as_deref().unwrap_or("function") == "function" {
                tool_calls.push(ToolCall::from_raw(
                    call.id.unwrap_or_default(),
                    call.function.name,
                    &call.function.arguments,
                ));
            } else {
                tracing::warn!(
                    call_type = call.call_type.as_deref().unwrap_or(""),
                    "skipping unsupported tool call type"
                );
            }
        }

        let (usage, cost) = match parsed.usage {
            Some(wire) => {
                let (usage, cost) = usage_and_cost(&self.model, wire);
                (Some(usage), cost)
            }
            None => (None, None),
        };

        Ok(PromptResult {
            output: choice.message.content,
            tool_calls,
            usage,
            cost,
        })
    }

    fn supports_native_streaming(&self) -> bool {
        true
    }

    async fn execute_stream(&self, request: &ProviderRequest) -> Result<AdapterEventStream> {
        let body = self.build_request(request, true);
        let response = self.send(&body).await?;
        let byte_stream = response.bytes_stream();
        let model = self.model.clone();

        let stream = async_stream::try_stream! {
            let mut buffer = String::new();
            futures::pin_mut!(byte_stream);

            while let Some(chunk) = byte_stream.next().await {
                let chunk = chunk?;
                buffer.push_str(&String::from_utf8_lossy(&chunk));

                while let Some((data, remainder)) = next_sse_event(&buffer) {
                    buffer = remainder;
                    let Some(data) = data else { continue };

                    if data.trim() == "[DONE]" {
                        yield AdapterEvent::Done;
                        continue;
                    }

                    let parsed: ChunkWire = match serde_json::from_str(&data) {
                        Ok(parsed) => parsed,
                        Err(e) => {
                            tracing::debug!(data = %data, error = %e, "skipping unparseable SSE event");
                            continue;
                        }
                    };

                    if let Some(wire_usage) = parsed.usage {
                        let (usage, cost) = usage_and_cost(&model, wire_usage);
                        yield AdapterEvent::Usage { usage, cost };
                    }

                    for choice in parsed.choices {
                        if let Some(text) = choice.delta.content {
                            if !text.is_empty() {
                                yield AdapterEvent::TextDelta(text);
                            }
                        }

                        for call in choice.delta.tool_calls.unwrap_or_default() {
                            let function = call.function.unwrap_or_default();
                            yield AdapterEvent::ToolCallDelta {
                                key: CorrelationKey::Index(call.index),
                                id: call.id,
                                name: function.name,
                                arguments_fragment: function.arguments,
                                arguments_patch: None,
                            };
                        }
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ToolDefinition;
    use serde_json::json;

    fn adapter() -> OpenAiAdapter {
        OpenAiAdapter::new("test-key", "gpt-4o-mini").unwrap()
    }

    #[test]
    fn adapter_requires_api_key() {
        assert!(OpenAiAdapter::new("", "gpt-4o-mini").is_err());
    }

    #[test]
    fn instructions_become_a_system_turn() {
        let request = ProviderRequest {
            messages: vec![Message::user("hi")],
            instructions: Some("be terse".to_string()),
            ..Default::default()
        };

        let body = adapter().build_request(&request, false);
        assert_eq!(body.messages.len(), 2);
        assert_eq!(body.messages[0].role, "system");
        assert_eq!(body.messages[1].role, "user");
    }

    #[test]
    fn response_format_uses_json_schema_envelope() {
        let request = ProviderRequest {
            messages: vec![Message::user("hi")],
            response_format: Some(crate::types::ResponseFormat::strict(
                json!({"type": "object"}),
            )),
            ..Default::default()
        };

        let body = adapter().build_request(&request, false);
        let format = body.response_format.unwrap();
        assert_eq!(format["type"], "json_schema");
        assert_eq!(format["json_schema"]["name"], "response");
    }

    #[test]
    fn raw_attributes_flatten_into_the_body() {
        let mut raw = Map::new();
        raw.insert("seed".to_string(), json!(42));
        let request = ProviderRequest {
            messages: vec![Message::user("hi")],
            raw_attributes: raw,
            ..Default::default()
        };

        let body = serde_json::to_value(adapter().build_request(&request, false)).unwrap();
        assert_eq!(body["seed"], json!(42));
    }

    #[test]
    fn streaming_request_asks_for_usage() {
        let request = ProviderRequest {
            messages: vec![Message::user("hi")],
            ..Default::default()
        };

        let body = adapter().build_request(&request, true);
        assert!(body.stream);
        assert!(body.stream_options.is_some());
    }

    #[test]
    fn tools_serialize_with_function_envelope() {
        let request = ProviderRequest {
            messages: vec![Message::user("hi")],
            tools: vec![ToolDefinition::new("add", "Adds", json!({"type": "object"}))],
            ..Default::default()
        };

        let body = serde_json::to_value(adapter().build_request(&request, false)).unwrap();
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "add");
    }
}
