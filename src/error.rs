//! Error types for Granske.

use thiserror::Error;

/// Library-level error type for Granske operations.
#[derive(Error, Debug)]
pub enum GranskeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Research session '{0}' already exists")]
    SessionConflict(String),

    #[error("No active research session for '{0}'")]
    SessionNotFound(String),

    #[error("No transcript available for video {0}")]
    TranscriptUnavailable(String),

    #[error("Embedding dimension mismatch: index expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Collaborator call failed: {0}")]
    Collaborator(String),

    #[error("Video source error: {0}")]
    Source(String),

    #[error("Embedding generation failed: {0}")]
    Embedding(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("OpenAI API error: {0}")]
    OpenAI(String),

    #[error("External tool not found: {0}. Please install it and ensure it's in your PATH.")]
    ToolNotFound(String),

    #[error("External tool failed: {0}")]
    ToolFailed(String),
}

/// Result type alias for Granske operations.
pub type Result<T> = std::result::Result<T, GranskeError>;
