//! Provider adapter abstraction.
//!
//! An adapter translates the neutral request into one vendor's wire format
//! and back. The orchestrator depends only on this interface; adapters never
//! see retry or loop-prevention logic.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde_json::{Map, Value};

use crate::error::{ClientError, Result};
use crate::message::Message;
use crate::types::{CostEstimate, PromptResult, ResponseFormat, TokenUsage, ToolDefinition};

/// The neutral request handed to an adapter, after loop-prevention has
/// settled the effective tool list.
#[derive(Debug, Clone, Default)]
pub struct ProviderRequest {
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDefinition>,
    pub instructions: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
    pub parallel_tool_calls: Option<bool>,
    pub response_format: Option<ResponseFormat>,
    /// Merged verbatim into the vendor request body.
    pub raw_attributes: Map<String, Value>,
}

/// The key under which streamed fragments of one tool call are merged:
/// an index for providers that stream calls positionally, an id for
/// providers that stream by identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CorrelationKey {
    Index(usize),
    Id(String),
}

/// A neutral incremental event emitted by an adapter's native stream.
#[derive(Debug, Clone)]
pub enum AdapterEvent {
    /// A fragment of textual output.
    TextDelta(String),
    /// A partial tool call. String fragments are concatenated, structured
    /// fragments are shallow-merged, both keyed by `key`.
    ToolCallDelta {
        key: CorrelationKey,
        id: Option<String>,
        name: Option<String>,
        arguments_fragment: Option<String>,
        arguments_patch: Option<Map<String, Value>>,
    },
    /// The provider's explicit completion signal for one call. Fields that
    /// are `Some` override whatever was accumulated.
    ToolCallDone {
        key: CorrelationKey,
        id: Option<String>,
        name: Option<String>,
        arguments: Option<String>,
    },
    /// Token usage, from whichever chunk carries it. The last one wins.
    Usage {
        usage: TokenUsage,
        cost: Option<CostEstimate>,
    },
    /// End of stream.
    Done,
}

/// Stream of neutral adapter events.
pub type AdapterEventStream = Pin<Box<dyn Stream<Item = Result<AdapterEvent>> + Send>>;

/// Trait for provider adapters.
///
/// Implement `execute_sync` for every provider; implement `execute_stream`
/// and return true from `supports_native_streaming` only when the vendor has
/// an incremental API. The orchestrator synthesizes a stream from
/// `execute_sync` otherwise.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Provider name, for diagnostics.
    fn name(&self) -> &'static str;

    /// Execute one synchronous request.
    async fn execute_sync(&self, request: &ProviderRequest) -> Result<PromptResult>;

    /// Whether this adapter has a native incremental implementation.
    fn supports_native_streaming(&self) -> bool {
        false
    }

    /// Open a native event stream for the request.
    async fn execute_stream(&self, request: &ProviderRequest) -> Result<AdapterEventStream> {
        let _ = request;
        Err(ClientError::StreamingUnsupported(self.name()))
    }
}
