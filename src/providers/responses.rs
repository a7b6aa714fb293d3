//! `OpenAI` Responses API adapter.
//!
//! The Responses API has a dedicated instructions field: the first system or
//! developer message is consumed out of the turn sequence and sent there.
//! Streaming correlates tool-call fragments by item id rather than index, and
//! each call gets an explicit completion event carrying its call id.

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

/// Adapter for the `OpenAI` Responses API.
#[derive(Debug, Clone)]
pub struct ResponsesAdapter {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl ResponsesAdapter {
    /// Create a new adapter.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::ApiKeyMissing`] if the API key is empty.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(ClientError::ApiKeyMissing("openai-responses"));
        }

        Ok(Self {
            http: reqwest::Client::new(),
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: model.into(),
        })
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.api_key))
                .map_err(|_| ClientError::ApiKeyMissing("openai-responses"))?,
        );
        Ok(headers)
    }

    /// Split the neutral messages into instructions and input items. The
    /// first system or developer message becomes the instructions unless the
    /// config already set some.
    fn convert_messages(
        request: &ProviderRequest,
    ) -> (Option<String>, Vec<wire::ResponseInputItem>) {
        let mut instructions = request.instructions.clone();
        let mut input = Vec::new();

        for message in &request.messages {
            match message {
                Message::System { content, .. } | Message::Developer { content, .. }
                    if instructions.is_none() =>
                {
                    instructions = Some(content.text());
                }
                other => input.extend(other.to_response_items()),
            }
        }

        (instructions, input)
    }

    fn build_request(&self, request: &ProviderRequest, stream: bool) -> ResponsesRequest {
        let (instructions, input) = Self::convert_messages(request);

        let tools = if request.tools.is_empty() {
            None
        } else {
            Some(request.tools.iter().map(wire::responses_tool).collect())
        };

        let text = request.response_format.as_ref().map(|format| {
            json!({
                "format": {
                    "type": "json_schema",
                    "name": format.wire_name(),
                    "schema": format.schema,
                },
            })
        });

        ResponsesRequest {
            model: self.model.clone(),
            input,
            instructions,
            tools,
            temperature: request.temperature,
            max_output_tokens: request.max_tokens,
            parallel_tool_calls: request.parallel_tool_calls,
            text,
            stream,
            extra: request.raw_attributes.clone(),
        }
    }

    async fn send(&self, body: &ResponsesRequest) -> Result<reqwest::Response> {
        let url = format!("{}/responses", self.base_url);
        tracing::debug!(url = %url, model = %body.model, "sending responses request");

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
struct ResponsesRequest {
    model: String,
    input: Vec<wire::ResponseInputItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    instructions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parallel_tool_calls: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<Value>,
    stream: bool,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

// Response types.

#[derive(Debug, Deserialize)]
struct ResponsesResponse {
    #[serde(default)]
    output: Vec<OutputItem>,
    #[serde(default)]
    usage: Option<ResponsesUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum OutputItem {
    #[serde(rename = "message")]
    Message {
        #[serde(default)]
        content: Vec<OutputContentPart>,
    },
    #[serde(rename = "function_call")]
    FunctionCall {
        call_id: String,
        name: String,
        arguments: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum OutputContentPart {
    #[serde(rename = "output_text")]
    OutputText { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ResponsesUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
    #[serde(default)]
    total_tokens: Option<u32>,
    #[serde(default)]
    input_tokens_details: Option<InputTokensDetails>,
}

#[derive(Debug, Deserialize)]
struct InputTokensDetails {
    #[serde(default)]
    cached_tokens: Option<u32>,
}

// Streaming event types.

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum StreamEventWire {
    #[serde(rename = "response.output_text.delta")]
    OutputTextDelta { delta: String },
    #[serde(rename = "response.function_call_arguments.delta")]
    FunctionCallArgumentsDelta { item_id: String, delta: String },
    #[serde(rename = "response.output_item.done")]
    OutputItemDone { item: DoneItem },
    #[serde(rename = "response.completed")]
    Completed { response: CompletedResponse },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct DoneItem {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    call_id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletedResponse {
    #[serde(default)]
    usage: Option<ResponsesUsage>,
}

fn usage_and_cost(model: &str, wire: ResponsesUsage) -> (TokenUsage, Option<CostEstimate>) {
    let usage = TokenUsage {
        input_tokens: wire.input_tokens,
        output_tokens: wire.output_tokens,
        cached_input_tokens: wire.input_tokens_details.and_then(|d| d.cached_tokens),
        total_tokens: wire.total_tokens,
    };
    let cost = calculate_cost(model, &usage);
    (usage, cost)
}

#[async_trait]
impl ProviderAdapter for ResponsesAdapter {
    fn name(&self) -> &'static str {
        "openai-responses"
    }

    async fn execute_sync(&self, request: &ProviderRequest) -> Result<PromptResult> {
        let body = self.build_request(request, false);
        let response = self.send(&body).await?;

        let text = response.text().await?;
        let parsed: ResponsesResponse =
            serde_json::from_str(&text).map_err(|e| ClientError::Parse(e.to_string()))?;

        let mut output = String::new();
        let mut tool_calls = Vec::new();

        for item in parsed.output {
            match item {
                OutputItem::Message { content } => {
                    for part in content {
                        if let OutputContentPart::OutputText { text } = part {
                            output.push_str(&text);
                        }
                    }
                }
                OutputItem::FunctionCall {
                    call_id,
                    name,
                    arguments,
                } => {
                    tool_calls.push(ToolCall::from_raw(call_id, name, &arguments));
                }
                OutputItem::Other => {}
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
            output: if output.is_empty() { None } else { Some(output) },
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

                    let event: StreamEventWire = match serde_json::from_str(&data) {
                        Ok(event) => event,
                        Err(e) => {
                            tracing::debug!(data = %data, error = %e, "skipping unparseable SSE event");
                            continue;
                        }
                    };

                    match event {
                        StreamEventWire::OutputTextDelta { delta } => {
                            yield AdapterEvent::TextDelta(delta);
                        }
                        StreamEventWire::FunctionCallArgumentsDelta { item_id, delta } => {
                            yield AdapterEvent::ToolCallDelta {
                                key: CorrelationKey::Id(item_id),
                                id: None,
                                name: None,
                                arguments_fragment: Some(delta),
                                arguments_patch: None,
                            };
                        }
                        StreamEventWire::OutputItemDone { item } => {
                            if item.kind == "function_call" {
                                yield AdapterEvent::ToolCallDone {
                                    key: CorrelationKey::Id(item.id.unwrap_or_default()),
                                    id: item.call_id,
                                    name: item.name,
                                    arguments: item.arguments,
                                };
                            }
                        }
                        StreamEventWire::Completed { response } => {
                            if let Some(wire_usage) = response.usage {
                                let (usage, cost) = usage_and_cost(&model, wire_usage);
                                yield AdapterEvent::Usage { usage, cost };
                            }
                            yield AdapterEvent::Done;
                        }
                        StreamEventWire::Other => {}
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}
