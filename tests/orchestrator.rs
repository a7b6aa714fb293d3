//! End-to-end orchestrator behavior against a scripted adapter.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::json;

use parlance::{
    AdapterEvent, AdapterEventStream, Client, ClientError, CorrelationKey, LoopAction, Message,
    PromptConfig, PromptResult, ProviderAdapter, ProviderRequest, ResponseFormat, Result,
    StreamChunk, TextOutput, ToolDefinition, ToolLoopPolicy,
};

/// An adapter that replays scripted results and records what it was asked.
#[derive(Default)]
struct StubAdapter {
    responses: Mutex<VecDeque<Result<PromptResult>>>,
    events: Mutex<Option<Vec<Result<AdapterEvent>>>>,
    seen: Mutex<Vec<ProviderRequest>>,
}

impl StubAdapter {
    fn scripted(responses: Vec<Result<PromptResult>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            ..Default::default()
        })
    }

    fn streaming(events: Vec<Result<AdapterEvent>>) -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Some(events)),
            ..Default::default()
        })
    }

    fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    fn last_request(&self) -> ProviderRequest {
        self.seen.lock().unwrap().last().cloned().unwrap()
    }
}

#[async_trait]
impl ProviderAdapter for StubAdapter {
    fn name(&self) -> &'static str {
        "stub"
    }

    async fn execute_sync(&self, request: &ProviderRequest) -> Result<PromptResult> {
        self.seen.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(PromptResult::empty()))
    }

    fn supports_native_streaming(&self) -> bool {
        self.events.lock().unwrap().is_some()
    }

    async fn execute_stream(&self, request: &ProviderRequest) -> Result<AdapterEventStream> {
        self.seen.lock().unwrap().push(request.clone());
        let events = self.events.lock().unwrap().take().unwrap_or_default();
        Ok(Box::pin(futures::stream::iter(events)))
    }
}

fn text_result(output: &str) -> Result<PromptResult> {
    Ok(PromptResult {
        output: Some(output.to_string()),
        ..Default::default()
    })
}

fn strict_config() -> PromptConfig {
    PromptConfig {
        messages: vec![Message::user("give me json")],
        response_format: Some(ResponseFormat::strict(json!({
            "type": "object",
            "properties": { "answer": { "type": "string" } },
            "required": ["answer"]
        }))),
        ..Default::default()
    }
}

fn tool(name: &str) -> ToolDefinition {
    ToolDefinition::new(name, "a tool", json!({"type": "object"}))
}

fn tool_turn(name: &str) -> Message {
    Message::tool("result", "call_x", name)
}

#[tokio::test]
async fn invalid_output_is_retried_until_valid() {
    let adapter = StubAdapter::scripted(vec![
        text_result("not json"),
        text_result(r#"{"wrong": true}"#),
        text_result(r#"{"answer": "42"}"#),
    ]);
    let client = Client::with_adapter(adapter.clone());

    let result = client.text_sync(strict_config()).await.unwrap();
    assert_eq!(result.output.as_deref(), Some(r#"{"answer": "42"}"#));
    assert_eq!(adapter.calls(), 3);
}

#[tokio::test]
async fn exhausted_budget_returns_the_invalid_output() {
    let adapter = StubAdapter::scripted(vec![
        text_result("bad"),
        text_result("bad"),
        text_result("bad"),
        text_result(r#"{"answer": "never reached"}"#),
    ]);
    let client = Client::with_adapter(adapter.clone());

    let result = client.text_sync(strict_config()).await.unwrap();
    // Default budget of 2 retries: three calls total, last output wins.
    assert_eq!(result.output.as_deref(), Some("bad"));
    assert_eq!(adapter.calls(), 3);
}

#[tokio::test]
async fn zero_retries_accepts_the_first_output() {
    let adapter = StubAdapter::scripted(vec![text_result("bad")]);
    let client = Client::with_adapter(adapter.clone());

    let mut config = strict_config();
    config.num_retries = Some(0);

    let result = client.text_sync(config).await.unwrap();
    assert_eq!(result.output.as_deref(), Some("bad"));
    assert_eq!(adapter.calls(), 1);
}

#[tokio::test]
async fn lenient_format_never_retries() {
    let adapter = StubAdapter::scripted(vec![text_result("not json at all")]);
    let client = Client::with_adapter(adapter.clone());

    let mut config = strict_config();
    config.response_format.as_mut().unwrap().strict = false;

    let result = client.text_sync(config).await.unwrap();
    assert_eq!(result.output.as_deref(), Some("not json at all"));
    assert_eq!(adapter.calls(), 1);
}

#[tokio::test]
async fn adapter_failure_is_never_retried() {
    let adapter = StubAdapter::scripted(vec![
        Err(ClientError::Api {
            status: 500,
            message: "upstream".to_string(),
        }),
        text_result(r#"{"answer": "42"}"#),
    ]);
    let client = Client::with_adapter(adapter.clone());

    let err = client.text_sync(strict_config()).await.unwrap_err();
    assert!(matches!(err, ClientError::Api { status: 500, .. }));
    assert_eq!(adapter.calls(), 1);
}

#[tokio::test]
async fn uncompilable_schema_fails_before_any_call() {
    let adapter = StubAdapter::scripted(vec![text_result("unused")]);
    let client = Client::with_adapter(adapter.clone());

    let mut config = strict_config();
    config.response_format = Some(ResponseFormat::strict(json!({
        "type": "not-a-real-type"
    })));

    let err = client.text_sync(config).await.unwrap_err();
    assert!(matches!(err, ClientError::Schema(_)));
    assert_eq!(adapter.calls(), 0);
}

#[tokio::test]
async fn looping_tool_is_removed_from_the_request() {
    let adapter = StubAdapter::scripted(vec![text_result("done")]);
    let client = Client::with_adapter(adapter.clone());

    let config = PromptConfig {
        messages: vec![tool_turn("search"), tool_turn("search"), tool_turn("search")],
        tools: vec![tool("search"), tool("fetch")],
        tool_loop: Some(ToolLoopPolicy::default()),
        ..Default::default()
    };

    client.text_sync(config).await.unwrap();
    let request = adapter.last_request();
    assert_eq!(request.tools.len(), 1);
    assert_eq!(request.tools[0].name, "fetch");
}

#[tokio::test]
async fn halt_action_skips_the_provider_entirely() {
    let adapter = StubAdapter::scripted(vec![text_result("unused")]);
    let client = Client::with_adapter(adapter.clone());

    let config = PromptConfig {
        messages: vec![tool_turn("search"), tool_turn("search"), tool_turn("search")],
        tools: vec![tool("search")],
        tool_loop: Some(ToolLoopPolicy {
            max_consecutive: 3,
            action: LoopAction::Halt,
            exempt: Vec::new(),
        }),
        ..Default::default()
    };

    let result = client.text_sync(config).await.unwrap();
    assert!(result.output.is_none());
    assert!(result.tool_calls.is_empty());
    assert_eq!(adapter.calls(), 0);
}

#[tokio::test]
async fn error_action_aborts_the_call() {
    let adapter = StubAdapter::scripted(vec![text_result("unused")]);
    let client = Client::with_adapter(adapter.clone());

    let config = PromptConfig {
        messages: vec![tool_turn("search"), tool_turn("search"), tool_turn("search")],
        tools: vec![tool("search")],
        tool_loop: Some(ToolLoopPolicy {
            max_consecutive: 3,
            action: LoopAction::Error,
            exempt: Vec::new(),
        }),
        ..Default::default()
    };

    let err = client.text_sync(config).await.unwrap_err();
    assert!(matches!(err, ClientError::ToolLoop(_)));
    assert_eq!(adapter.calls(), 0);
}

#[tokio::test]
async fn prompt_appends_a_user_turn() {
    let adapter = StubAdapter::scripted(vec![text_result("hello")]);
    let client = Client::with_adapter(adapter.clone());

    let config = PromptConfig {
        messages: vec![Message::system("be terse")],
        ..Default::default()
    };
    client.prompt(config, "hi there").await.unwrap();

    let request = adapter.last_request();
    assert_eq!(request.messages.len(), 2);
    let Message::User { content, .. } = &request.messages[1] else {
        panic!("expected a user turn");
    };
    assert_eq!(content.text(), "hi there");
}

#[tokio::test]
async fn fallback_stream_follows_the_chunk_contract() {
    let adapter = StubAdapter::scripted(vec![Ok(PromptResult {
        output: Some("answer".to_string()),
        tool_calls: vec![parlance::ToolCall::from_raw("call_1", "add", r#"{"a":1}"#)],
        ..Default::default()
    })]);
    let client = Client::with_adapter(adapter.clone());

    let config = PromptConfig {
        messages: vec![Message::user("go")],
        stream: true,
        ..Default::default()
    };

    let TextOutput::Stream(chunks) = client.text(config).await.unwrap() else {
        panic!("expected a stream");
    };
    let chunks: Vec<StreamChunk> = chunks.collect().await;

    assert_eq!(chunks.len(), 3);
    assert!(matches!(&chunks[0], StreamChunk::Text { text } if text == "answer"));
    assert!(matches!(&chunks[1], StreamChunk::ToolCall { tool_call } if tool_call.name == "add"));
    let StreamChunk::Done { result } = &chunks[2] else {
        panic!("expected done");
    };
    assert_eq!(result.output.as_deref(), Some("answer"));
    assert_eq!(result.tool_calls.len(), 1);
}

#[tokio::test]
async fn native_stream_assembles_fragmented_tool_calls() {
    let adapter = StubAdapter::streaming(vec![
        Ok(AdapterEvent::TextDelta("Let me ".to_string())),
        Ok(AdapterEvent::TextDelta("add that.".to_string())),
        Ok(AdapterEvent::ToolCallDelta {
            key: CorrelationKey::Index(0),
            id: Some("call_1".to_string()),
            name: Some("add".to_string()),
            arguments_fragment: Some(r#"{"a":"#.to_string()),
            arguments_patch: None,
        }),
        Ok(AdapterEvent::ToolCallDelta {
            key: CorrelationKey::Index(0),
            id: None,
            name: None,
            arguments_fragment: Some(r#"1,"b":2}"#.to_string()),
            arguments_patch: None,
        }),
        Ok(AdapterEvent::Done),
    ]);
    let client = Client::with_adapter(adapter.clone());

    let stream = client
        .text_stream(PromptConfig {
            messages: vec![Message::user("add 1 and 2")],
            stream: true,
            ..Default::default()
        })
        .await
        .unwrap();
    let chunks: Vec<StreamChunk> = stream.collect().await;

    assert_eq!(chunks.len(), 4);
    let StreamChunk::ToolCall { tool_call } = &chunks[2] else {
        panic!("expected a tool call chunk");
    };
    assert_eq!(tool_call.id, "call_1");
    assert_eq!(tool_call.arguments.get("a"), Some(&json!(1)));
    assert_eq!(tool_call.arguments.get("b"), Some(&json!(2)));

    let StreamChunk::Done { result } = chunks.last().unwrap() else {
        panic!("expected done");
    };
    assert_eq!(result.output.as_deref(), Some("Let me add that."));
}

#[tokio::test]
async fn streaming_halt_yields_one_empty_done() {
    let adapter = StubAdapter::streaming(vec![]);
    let client = Client::with_adapter(adapter.clone());

    let config = PromptConfig {
        messages: vec![tool_turn("search"), tool_turn("search"), tool_turn("search")],
        tools: vec![tool("search")],
        tool_loop: Some(ToolLoopPolicy {
            max_consecutive: 3,
            action: LoopAction::Halt,
            exempt: Vec::new(),
        }),
        stream: true,
        ..Default::default()
    };

    let stream = client.text_stream(config).await.unwrap();
    let chunks: Vec<StreamChunk> = stream.collect().await;

    assert_eq!(chunks.len(), 1);
    assert!(matches!(&chunks[0], StreamChunk::Done { result } if result.output.is_none()));
    assert_eq!(adapter.calls(), 0);
}
