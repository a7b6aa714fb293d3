//! Client error types.

/// Errors produced by the orchestration layer and provider adapters.
///
/// Configuration problems (`ApiKeyMissing`, `UnknownModel`, `UnsupportedModel`,
/// `UnknownRole`, `Schema`) are detected before any provider is contacted and
/// are never retried. `ToolLoop` is only produced when a caller opts into the
/// abort intervention. Everything else is an ordinary provider failure.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// API key not configured for the selected provider.
    #[error("API key not configured for {0}")]
    ApiKeyMissing(&'static str),

    /// Model name not present in the registry.
    #[error("model {0} is not recognized; specify a known model or set the provider explicitly")]
    UnknownModel(String),

    /// Model exists but is not a text model.
    #[error("only text models are supported; {model} is a {kind} model")]
    UnsupportedModel { model: String, kind: &'static str },

    /// Persisted message with an unrecognized role discriminator.
    #[error("unknown message role: {0}")]
    UnknownRole(String),

    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Provider returned an error response.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Failed to parse a provider response.
    #[error("failed to parse response: {0}")]
    Parse(String),

    /// Response schema could not be compiled for validation.
    #[error("invalid response schema: {0}")]
    Schema(String),

    /// Tool loop detected with the abort intervention configured.
    #[error("tool loop detected: {0}")]
    ToolLoop(String),

    /// Adapter has no native streaming implementation.
    #[error("{0} does not support native streaming")]
    StreamingUnsupported(&'static str),
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
