//! Request orchestration.
//!
//! The [`Client`] owns one provider adapter and layers the provider-neutral
//! behavior on top of it: tool-loop prevention before the request goes out,
//! schema-validated retry on the way back, and the choice between one
//! synchronous result and an incremental chunk stream.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{ClientError, Result};
use crate::message::Message;
use crate::models::{Provider, get_model};
use crate::provider::{ProviderAdapter, ProviderRequest};
use crate::providers::{GoogleAdapter, OllamaAdapter, OpenAiAdapter, ResponsesAdapter};
use crate::stream::{self, ChunkStream};
use crate::types::{LoopAction, PromptConfig, PromptResult, ToolDefinition};

/// Validation retry budget when the config does not set one.
pub const DEFAULT_NUM_RETRIES: u32 = 2;

/// Credentials and model selection for building a [`Client`].
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    /// Model name, resolved against the registry unless `provider` is set.
    pub model: String,
    /// Explicit provider override. Required for models the registry does not
    /// know, and the only way to select the Responses API.
    pub provider: Option<Provider>,
    pub openai_api_key: Option<String>,
    pub google_api_key: Option<String>,
    /// Key for Ollama's hosted service; leave unset for a local daemon.
    pub ollama_api_key: Option<String>,
    /// Local daemon address override.
    pub ollama_host: Option<String>,
}

/// The result of a text request: complete, or incremental.
pub enum TextOutput {
    Complete(PromptResult),
    Stream(ChunkStream),
}

/// What loop prevention decided for this request.
#[derive(Debug)]
enum LoopIntervention {
    /// Proceed with the given effective tool list.
    Proceed(Vec<ToolDefinition>),
    /// Short-circuit without contacting the provider.
    Halt,
}

/// A provider-agnostic model client.
pub struct Client {
    adapter: Arc<dyn ProviderAdapter>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("adapter", &self.adapter.name())
            .finish()
    }
}

impl Client {
    /// Build a client for the configured model.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::UnknownModel`] when the model is not in the
    /// registry and no provider override is set,
    /// [`ClientError::UnsupportedModel`] for non-text models, and
    /// [`ClientError::ApiKeyMissing`] when the selected provider's
    /// credentials are absent.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let provider = match config.provider {
            Some(provider) => provider,
            None => {
                let info = get_model(&config.model)
                    .ok_or_else(|| ClientError::UnknownModel(config.model.clone()))?;
                if info.kind != crate::models::ModelKind::Text {
                    return Err(ClientError::UnsupportedModel {
                        model: config.model.clone(),
                        kind: info.kind.as_str(),
                    });
                }
                info.provider
            }
        };

        let adapter = make_adapter(&config, provider)?;
        tracing::debug!(provider = adapter.name(), model = %config.model, "client ready");
        Ok(Self { adapter })
    }

    /// Build a client around a caller-supplied adapter.
    #[must_use]
    pub fn with_adapter(adapter: Arc<dyn ProviderAdapter>) -> Self {
        Self { adapter }
    }

    /// Execute a text request, complete or streaming per `config.stream`.
    ///
    /// # Errors
    ///
    /// Propagates adapter failures, plus [`ClientError::ToolLoop`] when the
    /// abort intervention fires and [`ClientError::Schema`] when a strict
    /// response schema does not compile.
    pub async fn text(&self, config: PromptConfig) -> Result<TextOutput> {
        if config.stream {
            Ok(TextOutput::Stream(self.text_stream(config).await?))
        } else {
            Ok(TextOutput::Complete(self.text_sync(config).await?))
        }
    }

    /// Append one user turn and execute.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`Client::text`].
    pub async fn prompt(
        &self,
        mut config: PromptConfig,
        text: impl Into<String>,
    ) -> Result<TextOutput> {
        config.messages.push(Message::user(text.into()));
        self.text(config).await
    }

    /// Execute one complete (non-streaming) text request.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`Client::text`].
    pub async fn text_sync(&self, config: PromptConfig) -> Result<PromptResult> {
        let tools = match apply_loop_policy(&config)? {
            LoopIntervention::Proceed(tools) => tools,
            LoopIntervention::Halt => return Ok(PromptResult::empty()),
        };

        let request = build_request(&config, tools);
        self.text_with_retry(&config, &request).await
    }

    /// Execute one streaming text request.
    ///
    /// Adapters without a native incremental API are wrapped in a synthesized
    /// single-shot stream with the same chunk contract. Validation retry does
    /// not apply: chunks are already on their way to the caller by the time
    /// the output could be judged.
    ///
    /// # Errors
    ///
    /// Fails if the stream cannot be opened; failures after that surface as a
    /// terminal `Error` chunk.
    pub async fn text_stream(&self, config: PromptConfig) -> Result<ChunkStream> {
        let tools = match apply_loop_policy(&config)? {
            LoopIntervention::Proceed(tools) => tools,
            LoopIntervention::Halt => return Ok(stream::halted()),
        };

        let request = build_request(&config, tools);
        if self.adapter.supports_native_streaming() {
            let events = self.adapter.execute_stream(&request).await?;
            Ok(stream::assemble(events))
        } else {
            Ok(stream::single_shot(Arc::clone(&self.adapter), request))
        }
    }

    /// Run the request, re-running it while a strict response format's
    /// validation fails and budget remains. Adapter failures are never
    /// retried. When the budget runs out the last output is returned as-is.
    async fn text_with_retry(
        &self,
        config: &PromptConfig,
        request: &ProviderRequest,
    ) -> Result<PromptResult> {
        let Some(format) = config
            .response_format
            .as_ref()
            .filter(|format| format.strict)
        else {
            return self.adapter.execute_sync(request).await;
        };

        let validator = jsonschema::validator_for(&format.schema)
            .map_err(|e| ClientError::Schema(e.to_string()))?;
        let mut budget = config.num_retries.unwrap_or(DEFAULT_NUM_RETRIES);

        loop {
            let result = self.adapter.execute_sync(request).await?;

            let valid = result
                .output
                .as_deref()
                .and_then(|output| serde_json::from_str::<serde_json::Value>(output).ok())
                .is_some_and(|value| validator.is_valid(&value));

            if valid || budget == 0 {
                if !valid {
                    tracing::warn!(
                        provider = self.adapter.name(),
                        "returning output that failed schema validation; retry budget exhausted"
                    );
                }
                return Ok(result);
            }

            budget -= 1;
            tracing::debug!(
                provider = self.adapter.name(),
                retries_left = budget,
                "output failed schema validation, retrying"
            );
        }
    }
}

fn make_adapter(config: &ClientConfig, provider: Provider) -> Result<Arc<dyn ProviderAdapter>> {
    let model = config.model.clone();
    match provider {
        Provider::OpenAi => Ok(Arc::new(OpenAiAdapter::new(
            config.openai_api_key.clone().unwrap_or_default(),
            model,
        )?)),
        Provider::OpenAiResponses => Ok(Arc::new(ResponsesAdapter::new(
            config.openai_api_key.clone().unwrap_or_default(),
            model,
        )?)),
        Provider::Google => Ok(Arc::new(GoogleAdapter::new(
            config.google_api_key.clone().unwrap_or_default(),
            model,
        )?)),
        Provider::Ollama => match &config.ollama_api_key {
            Some(key) if !key.is_empty() => Ok(Arc::new(OllamaAdapter::cloud(key, model)?)),
            _ => Ok(Arc::new(OllamaAdapter::new(
                model,
                config.ollama_host.clone(),
            ))),
        },
    }
}

fn build_request(config: &PromptConfig, tools: Vec<ToolDefinition>) -> ProviderRequest {
    ProviderRequest {
        messages: config.messages.clone(),
        tools,
        instructions: config.instructions.clone(),
        max_tokens: config.max_tokens,
        temperature: config.temperature,
        parallel_tool_calls: config.parallel_tool_calls,
        response_format: config.response_format.clone(),
        raw_attributes: config.raw_attributes.clone(),
    }
}

/// Count tool-result turns per tool name and apply the configured action to
/// tools whose count reached the threshold. No policy means no detection.
fn apply_loop_policy(config: &PromptConfig) -> Result<LoopIntervention> {
    let Some(policy) = &config.tool_loop else {
        return Ok(LoopIntervention::Proceed(config.tools.clone()));
    };

    let mut counts: HashMap<&str, u32> = HashMap::new();
    for message in &config.messages {
        if let Message::Tool { name, .. } = message {
            *counts.entry(name.as_str()).or_default() += 1;
        }
    }

    let offenders: Vec<&str> = counts
        .iter()
        .filter(|(name, count)| {
            **count >= policy.max_consecutive && !policy.exempt.iter().any(|e| e == **name)
        })
        .map(|(name, _)| *name)
        .collect();

    if offenders.is_empty() {
        return Ok(LoopIntervention::Proceed(config.tools.clone()));
    }

    tracing::warn!(tools = ?offenders, action = ?policy.action, "tool loop detected");

    match policy.action {
        LoopAction::RemoveTool => Ok(LoopIntervention::Proceed(
            config
                .tools
                .iter()
                .filter(|tool| !offenders.contains(&tool.name.as_str()))
                .cloned()
                .collect(),
        )),
        LoopAction::RemoveAllTools => Ok(LoopIntervention::Proceed(Vec::new())),
        LoopAction::Error => {
            let mut names: Vec<&str> = offenders;
            names.sort_unstable();
            Err(ClientError::ToolLoop(names.join(", ")))
        }
        LoopAction::Halt => Ok(LoopIntervention::Halt),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ToolLoopPolicy;
    use serde_json::json;

    fn tool(name: &str) -> ToolDefinition {
        ToolDefinition::new(name, "test tool", json!({"type": "object"}))
    }

    fn tool_turn(name: &str) -> Message {
        Message::tool("result", "call_x", name)
    }

    fn looping_config(action: LoopAction) -> PromptConfig {
        PromptConfig {
            messages: vec![
                Message::user("go"),
                tool_turn("search"),
                tool_turn("search"),
                tool_turn("search"),
            ],
            tools: vec![tool("search"), tool("fetch")],
            tool_loop: Some(ToolLoopPolicy {
                max_consecutive: 3,
                action,
                exempt: Vec::new(),
            }),
            ..Default::default()
        }
    }

    #[test]
    fn no_policy_means_no_detection() {
        let mut config = looping_config(LoopAction::Error);
        config.tool_loop = None;

        let LoopIntervention::Proceed(tools) = apply_loop_policy(&config).unwrap() else {
            panic!("expected proceed");
        };
        assert_eq!(tools.len(), 2);
    }

    #[test]
    fn below_threshold_keeps_all_tools() {
        let mut config = looping_config(LoopAction::RemoveTool);
        config.messages.pop();

        let LoopIntervention::Proceed(tools) = apply_loop_policy(&config).unwrap() else {
            panic!("expected proceed");
        };
        assert_eq!(tools.len(), 2);
    }

    #[test]
    fn remove_tool_drops_only_the_offender() {
        let LoopIntervention::Proceed(tools) =
            apply_loop_policy(&looping_config(LoopAction::RemoveTool)).unwrap()
        else {
            panic!("expected proceed");
        };
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "fetch");
    }

    #[test]
    fn remove_all_tools_drops_everything() {
        let LoopIntervention::Proceed(tools) =
            apply_loop_policy(&looping_config(LoopAction::RemoveAllTools)).unwrap()
        else {
            panic!("expected proceed");
        };
        assert!(tools.is_empty());
    }

    #[test]
    fn error_action_fails_with_offender_names() {
        let err = apply_loop_policy(&looping_config(LoopAction::Error)).unwrap_err();
        assert!(matches!(err, ClientError::ToolLoop(names) if names == "search"));
    }

    #[test]
    fn halt_action_short_circuits() {
        assert!(matches!(
            apply_loop_policy(&looping_config(LoopAction::Halt)).unwrap(),
            LoopIntervention::Halt
        ));
    }

    #[test]
    fn exempt_tools_never_trigger() {
        let mut config = looping_config(LoopAction::Error);
        config.tool_loop.as_mut().unwrap().exempt = vec!["search".to_string()];

        assert!(matches!(
            apply_loop_policy(&config).unwrap(),
            LoopIntervention::Proceed(_)
        ));
    }

    #[test]
    fn counting_spans_the_whole_history() {
        // Interleaved turns still count toward the same tool.
        let config = PromptConfig {
            messages: vec![
                tool_turn("search"),
                Message::assistant("thinking"),
                tool_turn("search"),
                Message::user("continue"),
                tool_turn("search"),
            ],
            tools: vec![tool("search")],
            tool_loop: Some(ToolLoopPolicy::default()),
            ..Default::default()
        };

        let LoopIntervention::Proceed(tools) = apply_loop_policy(&config).unwrap() else {
            panic!("expected proceed");
        };
        assert!(tools.is_empty());
    }

    #[test]
    fn unknown_model_without_provider_fails() {
        let err = Client::new(ClientConfig {
            model: "mystery-model".to_string(),
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, ClientError::UnknownModel(_)));
    }

    #[test]
    fn non_text_model_fails() {
        let err = Client::new(ClientConfig {
            model: "gpt-image-1".to_string(),
            openai_api_key: Some("key".to_string()),
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, ClientError::UnsupportedModel { .. }));
    }

    #[test]
    fn provider_override_skips_the_registry() {
        let client = Client::new(ClientConfig {
            model: "my-custom-model".to_string(),
            provider: Some(Provider::Ollama),
            ..Default::default()
        });
        assert!(client.is_ok());
    }

    #[test]
    fn ollama_local_needs_no_key_but_openai_does() {
        let err = Client::new(ClientConfig {
            model: "gpt-4o".to_string(),
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, ClientError::ApiKeyMissing("openai")));

        assert!(
            Client::new(ClientConfig {
                model: "llama3.2".to_string(),
                ..Default::default()
            })
            .is_ok()
        );
    }
}
