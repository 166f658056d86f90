//! Error types for the Jarvis domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all Jarvis operations.
///
/// Capability failures never reach this type: they are folded into the
/// conversation as result text. Only a failed model call ends a request.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("Missing required argument '{argument}' for {tool_name}")]
    MissingArgument { tool_name: String, argument: String },
}

#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("Transcription failed: {0}")]
    Transcription(String),

    #[error("Speech synthesis failed: {0}")]
    Synthesis(String),
}
