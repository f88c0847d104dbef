//! Error types for the queryloom-core crate.

use thiserror::Error;

/// Top-level error type for pipeline operations.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A generation call failed at the transport level.
    #[error("Generation failed: {message}")]
    Generation { message: String },

    /// A generation response did not match its declared shape.
    ///
    /// This is the structural-parse-failure channel: a missing required field,
    /// a mistyped field, or a cardinality violation all land here. A missing
    /// *optional* field is defaulted and is not an error.
    #[error("Malformed {what} response: {message}")]
    MalformedResponse {
        what: &'static str,
        message: String,
    },

    /// A retrieval call failed (collaborator unreachable, timeout, etc.).
    #[error("Retrieval failed: {message}")]
    Retrieval { message: String },

    /// An embedding call failed.
    #[error("Embedding failed: {message}")]
    Embedding { message: String },

    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub fn generation(msg: impl Into<String>) -> Self {
        Self::Generation {
            message: msg.into(),
        }
    }

    pub fn malformed(what: &'static str, msg: impl Into<String>) -> Self {
        Self::MalformedResponse {
            what,
            message: msg.into(),
        }
    }

    pub fn retrieval(msg: impl Into<String>) -> Self {
        Self::Retrieval {
            message: msg.into(),
        }
    }

    pub fn embedding(msg: impl Into<String>) -> Self {
        Self::Embedding {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}
