//! Unified error type for the reelforge pipeline.
//!
//! All crates funnel their failures into [`Error`], which carries enough
//! context for callers to tell a precondition refusal apart from a service
//! failure via [`Error::category`].

use std::fmt;

/// Unified error type covering all failure modes in reelforge.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested entity could not be found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity (e.g. "episode", "review task").
        entity: String,
        /// The identifier that was looked up.
        id: String,
    },

    /// A stage or operation was invoked before its preconditions held.
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// A state change conflicts with the entity's current state.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// An external service (generative model, uploader) returned an error.
    #[error("Service error [{service}]: {message}")]
    Service {
        /// Name of the service that failed.
        service: String,
        /// Human-readable error description.
        message: String,
    },

    /// Generative output failed schema validation after the corrective retry.
    #[error("Output validation failed [{stage}]: {message}")]
    OutputValidation {
        /// The stage whose output was rejected.
        stage: String,
        /// The last validation error.
        message: String,
    },

    /// Structured output could not be parsed, even after cleanup.
    #[error("Parse error: {0}")]
    Parse(String),

    /// One or more pre-publish safety checks failed.
    #[error("Safety checks failed: {}", .failures.join("; "))]
    SafetyCheck {
        /// `name: reason` for every failed check, in pipeline order.
        failures: Vec<String>,
    },

    /// The episode exhausted its generation budget.
    #[error("Cost limit reached: spent ${spent_usd:.4} of ${budget_usd:.4}")]
    CostLimit {
        /// Total recorded spend for the episode.
        spent_usd: f64,
        /// Configured budget.
        budget_usd: f64,
    },

    /// Configuration could not be loaded or is invalid.
    #[error("Config error: {0}")]
    Config(String),

    /// A database operation failed.
    #[error("Database error: {source}")]
    Database {
        /// The underlying database error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification used by callers deciding how to react to a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Refused before any state change; fix the input and call again.
    Precondition,
    /// An external call failed; the attempt was recorded as failed.
    Transient,
    /// Generative output was malformed beyond the single corrective retry.
    Validation,
    /// Local storage or programming failure.
    Internal,
}

impl Error {
    /// Classify this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::NotFound { .. }
            | Error::Precondition(_)
            | Error::Conflict(_)
            | Error::SafetyCheck { .. }
            | Error::CostLimit { .. } => ErrorCategory::Precondition,
            Error::Service { .. } => ErrorCategory::Transient,
            Error::OutputValidation { .. } | Error::Parse(_) => ErrorCategory::Validation,
            Error::Config(_) | Error::Database { .. } | Error::Io { .. } | Error::Internal(_) => {
                ErrorCategory::Internal
            }
        }
    }

    /// Convenience constructor for [`Error::NotFound`].
    pub fn not_found(entity: impl Into<String>, id: impl fmt::Display) -> Self {
        Error::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Convenience constructor for [`Error::Database`].
    pub fn database(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Error::Database {
            source: source.into(),
        }
    }

    /// Convenience constructor for [`Error::Service`].
    pub fn service(service: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Service {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::OutputValidation`].
    pub fn output_validation(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Error::OutputValidation {
            stage: stage.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::Precondition`].
    pub fn precondition(message: impl Into<String>) -> Self {
        Error::Precondition(message.into())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Parse(e.to_string())
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
