//! Google Gemini adapter.
//!
//! Gemini has no incremental API surface here, so the adapter is sync-only
//! and streaming callers get the synthesized single-shot fallback.

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::{ClientError, Result};
use crate::message::Message;
use crate::models::calculate_cost;
use crate::provider::{ProviderAdapter, ProviderRequest};
use crate::tool_call::ToolCall;
use crate::types::{PromptResult, TokenUsage};
use crate::wire;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Adapter for the Gemini `generateContent` API.
#[derive(Debug, Clone)]
pub struct GoogleAdapter {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GoogleAdapter {
    /// Create a new adapter.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::ApiKeyMissing`] if the API key is empty.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(ClientError::ApiKeyMissing("google"));
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
            "x-goog-api-key",
            HeaderValue::from_str(&self.api_key)
                .map_err(|_| ClientError::ApiKeyMissing("google"))?,
        );
        Ok(headers)
    }

    /// Split the neutral messages into a system instruction and the turn
    /// sequence. The first system or developer message becomes the system
    /// instruction unless the config already set instructions.
    fn convert_messages(request: &ProviderRequest) -> (Option<String>, Vec<wire::GoogleContent>) {
        let mut instruction = request.instructions.clone();
        let mut contents = Vec::new();

        for message in &request.messages {
            match message {
                Message::System { content, .. } | Message::Developer { content, .. }
                    if instruction.is_none() =>
                {
                    instruction = Some(content.text());
                }
                other => contents.push(other.to_google()),
            }
        }

        (instruction, contents)
    }

    fn build_request(&self, request: &ProviderRequest) -> GenerateContentRequest {
        let (instruction, contents) = Self::convert_messages(request);

        let tools = if request.tools.is_empty() {
            None
        } else {
            let declarations: Vec<Value> = request
                .tools
                .iter()
                .map(wire::google_function_declaration)
                .collect();
            Some(vec![json!({ "functionDeclarations": declarations })])
        };

        let mut generation_config = Map::new();
        if let Some(max_tokens) = request.max_tokens {
            generation_config.insert("maxOutputTokens".to_string(), json!(max_tokens));
        }
        if let Some(temperature) = request.temperature {
            generation_config.insert("temperature".to_string(), json!(temperature));
        }
        if let Some(format) = &request.response_format {
            generation_config.insert(
                "responseMimeType".to_string(),
                json!("application/json"),
            );
            generation_config.insert(
                "responseJsonSchema".to_string(),
                wire::sanitize_google_schema(&format.schema),
            );
        }

        GenerateContentRequest {
            contents,
            system_instruction: instruction.map(|text| {
                json!({ "parts": [{ "text": text }] })
            }),
            tools,
            generation_config: if generation_config.is_empty() {
                None
            } else {
                Some(Value::Object(generation_config))
            },
            extra: request.raw_attributes.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<wire::GoogleContent>,
    #[serde(rename = "systemInstruction", skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Value>>,
    #[serde(rename = "generationConfig", skip_serializing_if = "Option::is_none")]
    generation_config: Option<Value>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(rename = "usageMetadata", default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
    #[serde(rename = "functionCall", default)]
    function_call: Option<FunctionCallPart>,
}

#[derive(Debug, Deserialize)]
struct FunctionCallPart {
    name: String,
    #[serde(default)]
    args: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct UsageMetadata {
    #[serde(rename = "promptTokenCount", default)]
    prompt_token_count: u32,
    #[serde(rename = "candidatesTokenCount", default)]
    candidates_token_count: u32,
    #[serde(rename = "totalTokenCount", default)]
    total_token_count: Option<u32>,
    #[serde(rename = "cachedContentTokenCount", default)]
    cached_content_token_count: Option<u32>,
}

#[async_trait]
impl ProviderAdapter for GoogleAdapter {
    fn name(&self) -> &'static str {
        "google"
    }

    async fn execute_sync(&self, request: &ProviderRequest) -> Result<PromptResult> {
        let body = self.build_request(request);
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );
        tracing::debug!(url = %url, "sending generateContent request");

        let response = self
            .http
            .post(&url)
            .headers(self.headers()?)
            .json(&body)
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

        let text = response.text().await?;
        let parsed: GenerateContentResponse =
            serde_json::from_str(&text).map_err(|e| ClientError::Parse(e.to_string()))?;

        let mut output = String::new();
        let mut tool_calls = Vec::new();

        let candidate = parsed
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| ClientError::Parse("response has no candidates".to_string()))?;

        if let Some(content) = candidate.content {
            for part in content.parts {
                if let Some(text) = part.text {
                    output.push_str(&text);
                }
                if let Some(call) = part.function_call {
                    let arguments = match call.args {
                        Some(Value::Object(map)) => map,
                        _ => Map::new(),
                    };
                    // Gemini does not assign call ids; the name stands in.
                    tool_calls.push(ToolCall::new(call.name.clone(), call.name, arguments));
                }
            }
        }

        let (usage, cost) = match parsed.usage_metadata {
            Some(meta) => {
                let usage = TokenUsage {
                    input_tokens: meta.prompt_token_count,
                    output_tokens: meta.candidates_token_count,
                    cached_input_tokens: meta.cached_content_token_count,
                    total_tokens: meta.total_token_count,
                };
                let cost = calculate_cost(&self.model, &usage);
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
}
