//! Ollama adapter.
//!
//! Talks to a local Ollama daemon by default, or to Ollama's hosted service
//! when an API key is configured. Streaming is newline-delimited JSON rather
//! than SSE, and tool-call arguments arrive as structured objects that merge
//! shallowly across chunks.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ClientError, Result};
use crate::message::Message;
use crate::provider::{
    AdapterEvent, AdapterEventStream, CorrelationKey, ProviderAdapter, ProviderRequest,
};
use crate::tool_call::ToolCall;
use crate::types::{PromptResult, TokenUsage};
use crate::wire;

/// Local daemon default.
pub const DEFAULT_OLLAMA_HOST: &str = "http://localhost:11434";
const CLOUD_HOST: &str = "https://ollama.com";

/// Adapter for Ollama's `/api/chat` endpoint.
#[derive(Debug, Clone)]
pub struct OllamaAdapter {
    http: reqwest::Client,
    api_key: Option<String>,
    host: String,
    model: String,
}

impl OllamaAdapter {
    /// Create an adapter for a local daemon. No credentials are required.
    #[must_use]
    pub fn new(model: impl Into<String>, host: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: None,
            host: host.unwrap_or_else(|| DEFAULT_OLLAMA_HOST.to_string()),
            model: model.into(),
        }
    }

    /// Create an adapter for the hosted service.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::ApiKeyMissing`] if the API key is empty.
    pub fn cloud(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(ClientError::ApiKeyMissing("ollama"));
        }

        Ok(Self {
            http: reqwest::Client::new(),
            api_key: Some(api_key),
            host: CLOUD_HOST.to_string(),
            model: model.into(),
        })
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = &self.api_key {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {key}"))
                    .map_err(|_| ClientError::ApiKeyMissing("ollama"))?,
            );
        }
        Ok(headers)
    }

    fn build_request(&self, request: &ProviderRequest, stream: bool) -> ChatRequest {
        let mut messages = Vec::new();
        if let Some(instructions) = &request.instructions {
            messages.push(wire::OllamaMessage {
                role: "system",
                content: instructions.clone(),
                tool_calls: None,
                tool_name: None,
            });
        }
        messages.extend(request.messages.iter().map(Message::to_ollama));

        let tools = if request.tools.is_empty() {
            None
        } else {
            Some(request.tools.iter().map(wire::ollama_tool).collect())
        };

        let mut options = Map::new();
        if let Some(max_tokens) = request.max_tokens {
            options.insert("num_predict".to_string(), Value::from(max_tokens));
        }
        if let Some(temperature) = request.temperature {
            options.insert("temperature".to_string(), Value::from(temperature));
        }

        ChatRequest {
            model: self.model.clone(),
            messages,
            tools,
            format: request
                .response_format
                .as_ref()
                .map(|format| format.schema.clone()),
            options: if options.is_empty() {
                None
            } else {
                Some(Value::Object(options))
            },
            stream,
            extra: request.raw_attributes.clone(),
        }
    }

    async fn send(&self, body: &ChatRequest) -> Result<reqwest::Response> {
        let url = format!("{}/api/chat", self.host);
        tracing::debug!(url = %url, model = %body.model, "sending ollama chat request");

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
    messages: Vec<wire::OllamaMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<Value>,
    stream: bool,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    message: Option<ChunkMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ChunkMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    #[serde(default)]
    id: Option<String>,
    function: WireFunction,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: Option<Value>,
}

impl WireToolCall {
    /// Streamed calls correlate by id when the daemon assigns one, falling
    /// back to the function name.
    fn key(&self) -> CorrelationKey {
        match &self.id {
            Some(id) if !id.is_empty() => CorrelationKey::Id(id.clone()),
            _ => CorrelationKey::Id(self.function.name.clone()),
        }
    }

    fn arguments_map(&self) -> Map<String, Value> {
        match &self.function.arguments {
            Some(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        }
    }
}

fn chunk_usage(chunk: &ChatChunk) -> TokenUsage {
    TokenUsage {
        input_tokens: chunk.prompt_eval_count.unwrap_or(0),
        output_tokens: chunk.eval_count.unwrap_or(0),
        cached_input_tokens: None,
        total_tokens: chunk
            .prompt_eval_count
            .map(|p| p + chunk.eval_count.unwrap_or(0)),
    }
}

#[async_trait]
impl ProviderAdapter for OllamaAdapter {
    fn name(&self) -> &'static str {
        "ollama"
    }

    async fn execute_sync(&self, request: &ProviderRequest) -> Result<PromptResult> {
        let body = self.build_request(request, false);
        let response = self.send(&body).await?;

        let text = response.text().await?;
        let parsed: ChatChunk =
            serde_json::from_str(&text).map_err(|e| ClientError::Parse(e.to_string()))?;

        let message = parsed
            .message
            .as_ref()
            .ok_or_else(|| ClientError::Parse("response has no message".to_string()))?;

        let tool_calls = message
            .tool_calls
            .iter()
            .map(|call| {
                let key = match call.key() {
                    CorrelationKey::Id(id) => id,
                    CorrelationKey::Index(index) => index.to_string(),
                };
                ToolCall::new(key, call.function.name.clone(), call.arguments_map())
            })
            .collect();

        let usage = chunk_usage(&parsed);

        Ok(PromptResult {
            output: if message.content.is_empty() {
                None
            } else {
                Some(message.content.clone())
            },
            tool_calls,
            usage: Some(usage),
            // Local models have no per-token price.
            cost: None,
        })
    }

    fn supports_native_streaming(&self) -> bool {
        true
    }

    async fn execute_stream(&self, request: &ProviderRequest) -> Result<AdapterEventStream> {
        let body = self.build_request(request, true);
        let response = self.send(&body).await?;
        let byte_stream = response.bytes_stream();

        let stream = async_stream::try_stream! {
            let mut buffer = String::new();
            futures::pin_mut!(byte_stream);

            while let Some(chunk) = byte_stream.next().await {
                let chunk = chunk?;
                buffer.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(end) = buffer.find('\n') {
                    let line = buffer[..end].trim().to_string();
                    buffer = buffer[end + 1..].to_string();
                    if line.is_empty() {
                        continue;
                    }

                    let parsed: ChatChunk = serde_json::from_str(&line)
                        .map_err(|e| ClientError::Parse(e.to_string()))?;

                    if let Some(message) = &parsed.message {
                        if !message.content.is_empty() {
                            yield AdapterEvent::TextDelta(message.content.clone());
                        }
                        for call in &message.tool_calls {
                            yield AdapterEvent::ToolCallDelta {
                                key: call.key(),
                                id: call.id.clone(),
                                name: Some(call.function.name.clone()),
                                arguments_fragment: None,
                                arguments_patch: Some(call.arguments_map()),
                            };
                        }
                    }

                    if parsed.done {
                        yield AdapterEvent::Usage {
                            usage: chunk_usage(&parsed),
                            cost: None,
                        };
                        yield AdapterEvent::Done;
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

    #[test]
    fn local_adapter_needs_no_credentials() {
        let adapter = OllamaAdapter::new("llama3.2", None);
        assert_eq!(adapter.host, DEFAULT_OLLAMA_HOST);
        assert!(adapter.api_key.is_none());
    }

    #[test]
    fn cloud_adapter_requires_api_key() {
        assert!(OllamaAdapter::cloud("", "llama3.2").is_err());
        let adapter = OllamaAdapter::cloud("key", "llama3.2").unwrap();
        assert_eq!(adapter.host, CLOUD_HOST);
    }

    #[test]
    fn instructions_prepend_a_system_turn() {
        let adapter = OllamaAdapter::new("llama3.2", None);
        let request = ProviderRequest {
            messages: vec![Message::user("hi")],
            instructions: Some("be terse".to_string()),
            ..Default::default()
        };

        let body = adapter.build_request(&request, false);
        assert_eq!(body.messages.len(), 2);
        assert_eq!(body.messages[0].role, "system");
        assert_eq!(body.messages[0].content, "be terse");
    }

    #[test]
    fn response_format_passes_the_schema_through() {
        let adapter = OllamaAdapter::new("llama3.2", None);
        let request = ProviderRequest {
            messages: vec![Message::user("hi")],
            response_format: Some(crate::types::ResponseFormat::new(serde_json::json!({
                "type": "object"
            }))),
            ..Default::default()
        };

        let body = adapter.build_request(&request, false);
        assert_eq!(body.format.unwrap()["type"], "object");
    }

    #[test]
    fn streamed_call_without_id_correlates_by_name() {
        let call = WireToolCall {
            id: None,
            function: WireFunction {
                name: "add".to_string(),
                arguments: Some(serde_json::json!({"a": 1})),
            },
        };

        assert_eq!(call.key(), CorrelationKey::Id("add".to_string()));
        assert_eq!(call.arguments_map().get("a"), Some(&serde_json::json!(1)));
    }

    #[test]
    fn max_tokens_maps_to_num_predict() {
        let adapter = OllamaAdapter::new("llama3.2", None);
        let request = ProviderRequest {
            messages: vec![Message::user("hi")],
            max_tokens: Some(256),
            ..Default::default()
        };

        let body = adapter.build_request(&request, false);
        assert_eq!(body.options.unwrap()["num_predict"], 256);
    }
}
