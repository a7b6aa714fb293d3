//! Streaming assembly.
//!
//! Folds an adapter's neutral event stream into the caller-facing chunk
//! contract: zero or more `Text` chunks whose concatenation is the full
//! output, then zero or more `ToolCall` chunks (first-completed order), then
//! exactly one terminal `Done` or `Error` chunk. The same contract holds for
//! the synthesized single-shot fallback, so consumers can treat streaming and
//! non-streaming adapters identically.

use std::pin::Pin;
use std::sync::Arc;

use futures::{Stream, StreamExt};
use serde_json::{Map, Value};

use crate::provider::{AdapterEvent, AdapterEventStream, CorrelationKey, ProviderAdapter, ProviderRequest};
use crate::tool_call::ToolCall;
use crate::types::PromptResult;

/// A chunk of an incremental response.
#[derive(Debug, Clone)]
pub enum StreamChunk {
    /// A fragment of textual output, in emission order.
    Text { text: String },
    /// A fully-resolved tool call.
    ToolCall { tool_call: ToolCall },
    /// Terminal chunk carrying the complete assembled result.
    Done { result: PromptResult },
    /// Terminal chunk reporting a failure.
    Error { error: String },
}

/// Stream of response chunks. Dropping it cancels the underlying transport.
pub type ChunkStream = Pin<Box<dyn Stream<Item = StreamChunk> + Send>>;

/// A tool call still being accumulated from deltas.
#[derive(Debug, Default)]
struct PartialCall {
    id: String,
    name: String,
    arguments_text: String,
    arguments_patch: Map<String, Value>,
}

impl PartialCall {
    fn finalize(self) -> ToolCall {
        if self.arguments_patch.is_empty() {
            ToolCall::from_raw(self.id, self.name, &self.arguments_text)
        } else {
            ToolCall::new(self.id, self.name, self.arguments_patch)
        }
    }
}

fn entry_mut<'a>(
    pending: &'a mut Vec<(CorrelationKey, PartialCall)>,
    key: &CorrelationKey,
) -> &'a mut PartialCall {
    if let Some(position) = pending.iter().position(|(k, _)| k == key) {
        &mut pending[position].1
    } else {
        pending.push((key.clone(), PartialCall::default()));
        &mut pending.last_mut().expect("just pushed").1
    }
}

fn take_entry(
    pending: &mut Vec<(CorrelationKey, PartialCall)>,
    key: &CorrelationKey,
) -> PartialCall {
    pending
        .iter()
        .position(|(k, _)| k == key)
        .map_or_else(PartialCall::default, |position| pending.remove(position).1)
}

/// Fold a native adapter event stream into the chunk contract.
pub(crate) fn assemble(events: AdapterEventStream) -> ChunkStream {
    Box::pin(async_stream::stream! {
        let mut text = String::new();
        let mut pending: Vec<(CorrelationKey, PartialCall)> = Vec::new();
        let mut tool_calls: Vec<ToolCall> = Vec::new();
        let mut usage = None;
        let mut cost = None;
        let mut events = events;

        while let Some(event) = events.next().await {
            match event {
                Ok(AdapterEvent::TextDelta(delta)) => {
                    text.push_str(&delta);
                    yield StreamChunk::Text { text: delta };
                }
                Ok(AdapterEvent::ToolCallDelta {
                    key,
                    id,
                    name,
                    arguments_fragment,
                    arguments_patch,
                }) => {
                    let entry = entry_mut(&mut pending, &key);
                    if let Some(id) = id {
                        entry.id = id;
                    }
                    if let Some(name) = name {
                        entry.name = name;
                    }
                    if let Some(fragment) = arguments_fragment {
                        entry.arguments_text.push_str(&fragment);
                    }
                    if let Some(patch) = arguments_patch {
                        for (key, value) in patch {
                            entry.arguments_patch.insert(key, value);
                        }
                    }
                }
                Ok(AdapterEvent::ToolCallDone { key, id, name, arguments }) => {
                    let mut partial = take_entry(&mut pending, &key);
                    if let Some(id) = id {
                        partial.id = id;
                    }
                    if let Some(name) = name {
                        partial.name = name;
                    }
                    if let Some(arguments) = arguments {
                        partial.arguments_text = arguments;
                        partial.arguments_patch.clear();
                    }
                    let call = partial.finalize();
                    tool_calls.push(call.clone());
                    yield StreamChunk::ToolCall { tool_call: call };
                }
                Ok(AdapterEvent::Usage { usage: u, cost: c }) => {
                    usage = Some(u);
                    cost = c;
                }
                Ok(AdapterEvent::Done) => break,
                Err(e) => {
                    yield StreamChunk::Error { error: e.to_string() };
                    return;
                }
            }
        }

        // Stream end finalizes calls that never got an explicit completion
        // signal, in insertion order.
        for (_, partial) in pending {
            let call = partial.finalize();
            tool_calls.push(call.clone());
            yield StreamChunk::ToolCall { tool_call: call };
        }

        let output = if text.is_empty() { None } else { Some(text) };
        yield StreamChunk::Done {
            result: PromptResult { output, tool_calls, usage, cost },
        };
    })
}

/// Synthesize a stream from one synchronous call, for adapters without a
/// native incremental API.
pub(crate) fn single_shot(
    adapter: Arc<dyn ProviderAdapter>,
    request: ProviderRequest,
) -> ChunkStream {
    Box::pin(async_stream::stream! {
        match adapter.execute_sync(&request).await {
            Ok(result) => {
                if let Some(output) = &result.output {
                    yield StreamChunk::Text { text: output.clone() };
                }
                for tool_call in &result.tool_calls {
                    yield StreamChunk::ToolCall { tool_call: tool_call.clone() };
                }
                yield StreamChunk::Done { result };
            }
            Err(e) => {
                yield StreamChunk::Error { error: e.to_string() };
            }
        }
    })
}

/// The stream emitted by the halt intervention: one synthetic empty result.
pub(crate) fn halted() -> ChunkStream {
    Box::pin(futures::stream::once(async {
        StreamChunk::Done {
            result: PromptResult::empty(),
        }
    }))
}
