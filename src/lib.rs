//! Parlance - provider-agnostic LLM client library.
//!
//! This library provides one uniform surface over multiple model providers:
//! - A neutral message model and tool-call value
//! - A request orchestrator with tool-loop prevention and validated retry
//! - A streaming protocol shared by native and synthesized streams
//! - Adapters for OpenAI (chat and Responses), Google Gemini, and Ollama
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                   Client                    │
//! │   loop prevention · retry · stream fanout   │
//! └──────────────────────┬──────────────────────┘
//!                        │ ProviderRequest / AdapterEvent
//!    ┌───────────┬───────┴─────┬───────────┬──────────┐
//!    │  OpenAI   │  Responses  │  Google   │  Ollama  │
//!    └───────────┴─────────────┴───────────┴──────────┘
//! ```

pub mod client;
pub mod error;
pub mod message;
pub mod models;
pub mod provider;
pub mod providers;
pub mod stream;
pub mod tool_call;
pub mod types;
pub mod wire;

pub use client::{Client, ClientConfig, DEFAULT_NUM_RETRIES, TextOutput};
pub use error::{ClientError, Result};
pub use message::{Message, MessageContent, TextPart};
pub use models::{ModelInfo, ModelKind, Pricing, Provider, calculate_cost, get_model};
pub use provider::{
    AdapterEvent, AdapterEventStream, CorrelationKey, ProviderAdapter, ProviderRequest,
};
pub use stream::{ChunkStream, StreamChunk};
pub use tool_call::ToolCall;
pub use types::{
    CostEstimate, LoopAction, PromptConfig, PromptResult, ResponseFormat, TokenUsage,
    ToolDefinition, ToolLoopPolicy,
};
