//! Error types for Omni Agent
//!
//! This module defines all error types used throughout the crate.
//! Uses `thiserror` for ergonomic error handling with automatic `Display` and
//! `Error` trait implementations.

use std::fmt;
use thiserror::Error;

// ============================================================================
// Provider Error Classification
// ============================================================================

/// Structured provider error classification.
///
/// Lets the agent loop tell a rejected feature flag apart from a transport
/// failure without string matching at the call site.
#[derive(Debug)]
pub enum ProviderError {
    /// 401/403 - The backend refused the credentials
    Auth(String),
    /// 429 - Rate limit or quota exceeded
    RateLimit(String),
    /// 500/502/503/504 - Server-side errors
    ServerError(String),
    /// 400 - Bad request, invalid JSON, malformed parameters
    InvalidRequest(String),
    /// 404 - Model not pulled or endpoint not available
    ModelNotFound(String),
    /// Connection or read timeout
    Timeout(String),
    /// The model rejected an optional request feature (e.g. reasoning mode)
    UnsupportedFeature(String),
    /// Catch-all for unrecognized errors
    Unknown(String),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::Auth(msg) => write!(f, "Authentication error: {}", msg),
            ProviderError::RateLimit(msg) => write!(f, "Rate limit error: {}", msg),
            ProviderError::ServerError(msg) => write!(f, "Server error: {}", msg),
            ProviderError::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            ProviderError::ModelNotFound(msg) => write!(f, "Model not found: {}", msg),
            ProviderError::Timeout(msg) => write!(f, "Timeout: {}", msg),
            ProviderError::UnsupportedFeature(msg) => write!(f, "Unsupported feature: {}", msg),
            ProviderError::Unknown(msg) => write!(f, "Unknown provider error: {}", msg),
        }
    }
}

impl From<ProviderError> for OmniError {
    fn from(err: ProviderError) -> Self {
        OmniError::ProviderTyped(err)
    }
}

// ============================================================================
// Primary Error Type
// ============================================================================

/// The primary error type for Omni Agent operations.
#[derive(Error, Debug)]
pub enum OmniError {
    /// Configuration-related errors (invalid config, unreadable file, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Untyped provider errors (malformed responses, broken streams, etc.)
    #[error("Provider error: {0}")]
    Provider(String),

    /// Structured provider error with classification.
    #[error("Provider error: {0}")]
    ProviderTyped(ProviderError),

    /// Tool execution errors (invalid arguments, execution failures, etc.)
    #[error("Tool error: {0}")]
    Tool(String),

    /// Session management errors (invalid state, persistence failures, etc.)
    #[error("Session error: {0}")]
    Session(String),

    /// Standard I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Resource not found (sessions, files, models, etc.)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Security violations (paths escaping the home directory, etc.)
    #[error("Security violation: {0}")]
    SecurityViolation(String),
}

impl OmniError {
    /// True when the backend rejected an optional feature flag.
    ///
    /// The agent loop retries such a call exactly once with the flag removed.
    pub fn is_capability_error(&self) -> bool {
        matches!(
            self,
            OmniError::ProviderTyped(ProviderError::UnsupportedFeature(_))
        )
    }

    /// Short kind name used when rendering a tool failure into conversation
    /// text (`ERROR: <kind>: <message>`).
    pub fn kind(&self) -> &'static str {
        match self {
            OmniError::Config(_) => "ConfigError",
            OmniError::Provider(_) | OmniError::ProviderTyped(_) => "ProviderError",
            OmniError::Tool(_) => "ToolError",
            OmniError::Session(_) => "SessionError",
            OmniError::Io(_) => "IoError",
            OmniError::Json(_) => "JsonError",
            OmniError::Http(_) => "HttpError",
            OmniError::NotFound(_) => "NotFound",
            OmniError::SecurityViolation(_) => "SecurityViolation",
        }
    }

    /// The message part of the error, without the variant prefix.
    pub fn detail(&self) -> String {
        match self {
            OmniError::Config(msg)
            | OmniError::Provider(msg)
            | OmniError::Tool(msg)
            | OmniError::Session(msg)
            | OmniError::NotFound(msg)
            | OmniError::SecurityViolation(msg) => msg.clone(),
            OmniError::ProviderTyped(e) => e.to_string(),
            OmniError::Io(e) => e.to_string(),
            OmniError::Json(e) => e.to_string(),
            OmniError::Http(e) => e.to_string(),
        }
    }
}

/// A specialized `Result` type for Omni Agent operations.
pub type Result<T> = std::result::Result<T, OmniError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = OmniError::Config("invalid chars_per_token".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: invalid chars_per_token"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let omni_err: OmniError = io_err.into();
        assert!(matches!(omni_err, OmniError::Io(_)));
        assert_eq!(omni_err.kind(), "IoError");
        assert_eq!(omni_err.detail(), "file not found");
    }

    #[test]
    fn test_result_type() {
        fn returns_result() -> Result<i32> {
            Ok(42)
        }
        assert_eq!(returns_result().unwrap(), 42);
    }

    #[test]
    fn test_security_violation_display() {
        let err = OmniError::SecurityViolation("path escapes home directory".to_string());
        assert_eq!(
            err.to_string(),
            "Security violation: path escapes home directory"
        );
        assert_eq!(err.kind(), "SecurityViolation");
    }

    #[test]
    fn test_kind_and_detail() {
        let err = OmniError::Tool("missing 'path'".into());
        assert_eq!(err.kind(), "ToolError");
        assert_eq!(err.detail(), "missing 'path'");

        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: OmniError = json_err.into();
        assert_eq!(err.kind(), "JsonError");
    }

    // ====================================================================
    // ProviderError tests
    // ====================================================================

    #[test]
    fn test_provider_error_display() {
        assert!(ProviderError::Auth("bad key".into())
            .to_string()
            .contains("Authentication error"));
        assert!(ProviderError::ServerError("500".into())
            .to_string()
            .contains("Server error"));
        assert!(ProviderError::ModelNotFound("qwen3".into())
            .to_string()
            .contains("Model not found"));
        assert!(ProviderError::UnsupportedFeature("thinking".into())
            .to_string()
            .contains("Unsupported feature"));
    }

    #[test]
    fn test_capability_error_detection() {
        let err: OmniError = ProviderError::UnsupportedFeature("think".into()).into();
        assert!(err.is_capability_error());

        let err: OmniError = ProviderError::InvalidRequest("bad".into()).into();
        assert!(!err.is_capability_error());
        assert!(!OmniError::Provider("thinking".into()).is_capability_error());
    }

    #[test]
    fn test_provider_typed_display() {
        let err = OmniError::ProviderTyped(ProviderError::Auth("invalid key".into()));
        assert_eq!(
            err.to_string(),
            "Provider error: Authentication error: invalid key"
        );
        assert_eq!(err.kind(), "ProviderError");
    }
}
