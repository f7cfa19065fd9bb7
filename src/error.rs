//! Error types for the Vidrec engine
//!
//! One error hierarchy for the whole crate:
//! - `thiserror` for the variant definitions
//! - Domain-specific variants so callers can tell a bad matrix from a bad request
//! - Source chaining for provider and I/O failures
//! - Stable error codes that transports map to their own status codes

use std::borrow::Cow;
use thiserror::Error;

/// Result type alias for Vidrec operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the Vidrec engine
#[derive(Debug, Error)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    #[error("Configuration error: {message}")]
    Config {
        message: Cow<'static, str>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Missing required environment variable: {var}")]
    MissingEnvVar { var: &'static str },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidConfig {
        key: &'static str,
        message: Cow<'static, str>,
    },

    // ========================================================================
    // Matrix / Similarity Errors
    // ========================================================================
    #[error("Matrix shape error: {message}")]
    Shape { message: Cow<'static, str> },

    #[error("Recommendation engine not ready: no matrices have been loaded")]
    NotReady,

    // ========================================================================
    // Metrics Errors
    // ========================================================================
    #[error("Missing required field: {field}")]
    MissingField { field: &'static str },

    // ========================================================================
    // Data Provider Errors
    // ========================================================================
    #[error("Data fetch failed: {message}")]
    DataFetch {
        message: Cow<'static, str>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    // ========================================================================
    // Serialization / IO Errors
    // ========================================================================
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // ========================================================================
    // Generic Errors
    // ========================================================================
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl Error {
    // ========================================================================
    // Constructors for common error patterns
    // ========================================================================

    /// Create a configuration error
    pub fn config(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    /// Create a shape error
    pub fn shape(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Shape {
            message: message.into(),
        }
    }

    /// Create a data fetch error
    pub fn data_fetch(message: impl Into<Cow<'static, str>>) -> Self {
        Self::DataFetch {
            message: message.into(),
            source: None,
        }
    }

    /// Create a data fetch error with source
    pub fn data_fetch_with_source(
        message: impl Into<Cow<'static, str>>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::DataFetch {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    // ========================================================================
    // Error Classification
    // ========================================================================

    /// Returns true if retrying the same call later may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::DataFetch { .. } | Error::NotReady | Error::Io(_))
    }

    /// Returns true if the caller supplied bad input
    pub fn is_client_error(&self) -> bool {
        matches!(self, Error::MissingField { .. })
    }

    /// Returns true if this error should be logged at error level. Transient
    /// failures that the next refresh may clear are warnings.
    pub fn is_error_level(&self) -> bool {
        matches!(
            self,
            Error::Shape { .. }
                | Error::Json(_)
                | Error::Config { .. }
                | Error::MissingEnvVar { .. }
                | Error::InvalidConfig { .. }
                | Error::Other(_)
        )
    }

    /// Get a stable error code for transport responses
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Config { .. } | Error::MissingEnvVar { .. } | Error::InvalidConfig { .. } => {
                "CONFIG_ERROR"
            }
            Error::Shape { .. } => "SHAPE_ERROR",
            Error::NotReady => "NOT_READY",
            Error::MissingField { .. } => "MISSING_FIELD",
            Error::DataFetch { .. } => "DATA_FETCH_ERROR",
            Error::Json(_) => "SERIALIZATION_ERROR",
            Error::Io(_) => "IO_ERROR",
            Error::Other(_) => "INTERNAL_ERROR",
        }
    }
}
