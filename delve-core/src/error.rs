//! Error types for the Delve core library.
//!
//! Uses `thiserror` for public API error types with structured variants
//! covering the completion service, the research loop, and configuration.

use std::path::PathBuf;

/// Top-level error type for the Delve core library.
#[derive(Debug, thiserror::Error)]
pub enum DelveError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Research error: {0}")]
    Research(#[from] ResearchError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DelveError {
    /// Returns the underlying completion-service error, if any.
    pub fn as_llm(&self) -> Option<&LlmError> {
        match self {
            DelveError::Llm(e) => Some(e),
            _ => None,
        }
    }

    /// Whether this error came from cancelling the run.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DelveError::Research(ResearchError::Cancelled))
    }
}

/// Errors from completion-service interactions.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// Missing or rejected credential.
    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    /// The response does not have the expected output-item structure.
    #[error("Malformed response: {message}")]
    MalformedResponse { message: String },

    /// Text that should be JSON is invalid or has the wrong shape.
    #[error("Response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },
}

impl LlmError {
    /// Network or service failures: transport, timeout, and rate limiting.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            LlmError::Transport { .. } | LlmError::Timeout { .. } | LlmError::RateLimited { .. }
        )
    }

    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        LlmError::MalformedResponse {
            message: message.into(),
        }
    }

    pub(crate) fn parse(message: impl Into<String>) -> Self {
        LlmError::ResponseParse {
            message: message.into(),
        }
    }
}

/// Errors raised by the research loop itself.
#[derive(Debug, thiserror::Error)]
pub enum ResearchError {
    #[error("Research run was cancelled")]
    Cancelled,

    #[error("Query text is empty")]
    EmptyQuery,

    #[error("Cannot advance research with an empty query batch")]
    EmptyBatch,

    #[error("Research goal is empty")]
    EmptyGoal,

    #[error("Model '{model}' cannot run web search")]
    WebSearchUnsupported { model: String },
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

/// A type alias for results using the top-level `DelveError`.
pub type Result<T> = std::result::Result<T, DelveError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_llm() {
        let err = DelveError::Llm(LlmError::Transport {
            message: "connection refused".into(),
        });
        assert_eq!(
            err.to_string(),
            "LLM error: Transport error: connection refused"
        );
    }

    #[test]
    fn test_error_display_malformed() {
        let err = DelveError::Llm(LlmError::malformed("expected 2 output items, got 1"));
        assert_eq!(
            err.to_string(),
            "LLM error: Malformed response: expected 2 output items, got 1"
        );
    }

    #[test]
    fn test_error_display_research() {
        let err = DelveError::Research(ResearchError::EmptyBatch);
        assert_eq!(
            err.to_string(),
            "Research error: Cannot advance research with an empty query batch"
        );
    }

    #[test]
    fn test_error_display_config() {
        let err = DelveError::Config(ConfigError::Invalid {
            message: "bad value".into(),
        });
        assert_eq!(
            err.to_string(),
            "Configuration error: Invalid configuration: bad value"
        );
    }

    #[test]
    fn test_transport_classification() {
        assert!(LlmError::Transport { message: "x".into() }.is_transport());
        assert!(LlmError::Timeout { timeout_secs: 30 }.is_transport());
        assert!(LlmError::RateLimited { retry_after_secs: 5 }.is_transport());
        assert!(!LlmError::AuthFailed { provider: "openai".into() }.is_transport());
        assert!(!LlmError::parse("bad json").is_transport());
        assert!(!LlmError::malformed("short").is_transport());
    }

    #[test]
    fn test_cancelled_helper() {
        let err: DelveError = ResearchError::Cancelled.into();
        assert!(err.is_cancelled());
        assert!(err.as_llm().is_none());
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: DelveError = io_err.into();
        assert!(matches!(err, DelveError::Io(_)));
    }

    #[test]
    fn test_error_from_serde() {
        let serde_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err: DelveError = serde_err.into();
        assert!(matches!(err, DelveError::Serialization(_)));
    }
}
