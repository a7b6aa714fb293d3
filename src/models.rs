//! Static model registry and cost arithmetic.

use crate::types::{CostEstimate, TokenUsage};

/// Provider tag used for adapter dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAi,
    /// OpenAI's Responses API; selected explicitly, never inferred from a
    /// model name.
    OpenAiResponses,
    Google,
    Ollama,
}

/// Coarse capability class of a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    Text,
    Image,
    Embedding,
}

impl ModelKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Embedding => "embedding",
        }
    }
}

/// Per-token prices in dollars per million tokens.
#[derive(Debug, Clone, Copy)]
pub struct Pricing {
    pub input_per_mtok: f64,
    pub output_per_mtok: f64,
    pub cached_input_per_mtok: Option<f64>,
}

/// A registry entry.
#[derive(Debug, Clone, Copy)]
pub struct ModelInfo {
    pub name: &'static str,
    pub provider: Provider,
    pub kind: ModelKind,
    pub context_window: u32,
    pub max_output_tokens: u32,
    /// None for local models, which cost nothing per token.
    pub pricing: Option<Pricing>,
}

const fn priced(input: f64, output: f64, cached: f64) -> Option<Pricing> {
    Some(Pricing {
        input_per_mtok: input,
        output_per_mtok: output,
        cached_input_per_mtok: Some(cached),
    })
}

const fn priced_uncached(input: f64, output: f64) -> Option<Pricing> {
    Some(Pricing {
        input_per_mtok: input,
        output_per_mtok: output,
        cached_input_per_mtok: None,
    })
}

/// Known models. Lookup is by exact name.
pub static MODELS: &[ModelInfo] = &[
    ModelInfo {
        name: "gpt-4o-mini",
        provider: Provider::OpenAi,
        kind: ModelKind::Text,
        context_window: 128_000,
        max_output_tokens: 16_384,
        pricing: priced(0.15, 0.6, 0.075),
    },
    ModelInfo {
        name: "gpt-4o",
        provider: Provider::OpenAi,
        kind: ModelKind::Text,
        context_window: 128_000,
        max_output_tokens: 16_384,
        pricing: priced(2.5, 10.0, 1.25),
    },
    ModelInfo {
        name: "gpt-4.1",
        provider: Provider::OpenAi,
        kind: ModelKind::Text,
        context_window: 1_047_576,
        max_output_tokens: 32_768,
        pricing: priced(2.0, 8.0, 0.5),
    },
    ModelInfo {
        name: "gpt-4.1-mini",
        provider: Provider::OpenAi,
        kind: ModelKind::Text,
        context_window: 1_047_576,
        max_output_tokens: 32_768,
        pricing: priced(0.4, 1.6, 0.1),
    },
    ModelInfo {
        name: "gpt-4.1-nano",
        provider: Provider::OpenAi,
        kind: ModelKind::Text,
        context_window: 1_047_576,
        max_output_tokens: 32_768,
        pricing: priced(0.1, 0.4, 0.025),
    },
    ModelInfo {
        name: "o3-mini",
        provider: Provider::OpenAi,
        kind: ModelKind::Text,
        context_window: 200_000,
        max_output_tokens: 100_000,
        pricing: priced(1.1, 4.4, 0.55),
    },
    ModelInfo {
        name: "o4-mini",
        provider: Provider::OpenAi,
        kind: ModelKind::Text,
        context_window: 200_000,
        max_output_tokens: 100_000,
        pricing: priced(1.1, 4.4, 0.275),
    },
    ModelInfo {
        name: "gemini-2.0-flash",
        provider: Provider::Google,
        kind: ModelKind::Text,
        context_window: 1_048_576,
        max_output_tokens: 8_192,
        pricing: priced_uncached(0.15, 0.6),
    },
    ModelInfo {
        name: "gemini-2.0-flash-lite",
        provider: Provider::Google,
        kind: ModelKind::Text,
        context_window: 1_048_576,
        max_output_tokens: 8_192,
        pricing: priced_uncached(0.075, 0.3),
    },
    ModelInfo {
        name: "gemini-2.5-flash",
        provider: Provider::Google,
        kind: ModelKind::Text,
        context_window: 1_048_576,
        max_output_tokens: 65_536,
        pricing: priced(0.3, 2.5, 0.075),
    },
    ModelInfo {
        name: "gemini-2.5-pro",
        provider: Provider::Google,
        kind: ModelKind::Text,
        context_window: 1_048_576,
        max_output_tokens: 65_536,
        pricing: priced(1.25, 10.0, 0.31),
    },
    ModelInfo {
        name: "llama3.2",
        provider: Provider::Ollama,
        kind: ModelKind::Text,
        context_window: 128_000,
        max_output_tokens: 128_000,
        pricing: None,
    },
    ModelInfo {
        name: "qwen3",
        provider: Provider::Ollama,
        kind: ModelKind::Text,
        context_window: 40_960,
        max_output_tokens: 40_960,
        pricing: None,
    },
    ModelInfo {
        name: "deepseek-r1:8b",
        provider: Provider::Ollama,
        kind: ModelKind::Text,
        context_window: 128_000,
        max_output_tokens: 128_000,
        pricing: None,
    },
    ModelInfo {
        name: "gpt-image-1",
        provider: Provider::OpenAi,
        kind: ModelKind::Image,
        context_window: 0,
        max_output_tokens: 0,
        pricing: None,
    },
    ModelInfo {
        name: "text-embedding-3-small",
        provider: Provider::OpenAi,
        kind: ModelKind::Embedding,
        context_window: 8_191,
        max_output_tokens: 0,
        pricing: priced_uncached(0.02, 0.0),
    },
];

/// Look up a model by name.
#[must_use]
pub fn get_model(name: &str) -> Option<&'static ModelInfo> {
    MODELS.iter().find(|model| model.name == name)
}

/// Estimate the dollar cost of one request.
///
/// Cached input tokens are billed at the cached rate (input rate when the
/// model has none); the remaining input tokens at the input rate. Returns
/// `None` for unknown or unpriced models.
#[must_use]
pub fn calculate_cost(model: &str, usage: &TokenUsage) -> Option<CostEstimate> {
    let pricing = get_model(model)?.pricing?;

    let cached_tokens = usage.cached_input_tokens.unwrap_or(0);
    let billable_input = usage.input_tokens.saturating_sub(cached_tokens);

    let input_cost = round(
        f64::from(billable_input) * pricing.input_per_mtok / 1_000_000.0,
        6,
    );
    let output_cost = round(
        f64::from(usage.output_tokens) * pricing.output_per_mtok / 1_000_000.0,
        6,
    );
    let cached_input_cost = usage.cached_input_tokens.map(|tokens| {
        let rate = pricing
            .cached_input_per_mtok
            .unwrap_or(pricing.input_per_mtok);
        round(f64::from(tokens) * rate / 1_000_000.0, 6)
    });

    let total_cost = round(
        input_cost + output_cost + cached_input_cost.unwrap_or(0.0),
        6,
    );

    Some(CostEstimate {
        input_cost,
        output_cost,
        cached_input_cost,
        total_cost,
        currency: "USD".to_string(),
    })
}

fn round(value: f64, places: i32) -> f64 {
    let factor = 10_f64.powi(places);
    (value * factor).round() / factor
}
