use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::provider::ProviderError;

pub type Result<T, E = ReelgenError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ReelgenError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Generation {job_id} failed: {reason}")]
    GenerationFailed { job_id: String, reason: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Import error: {0}")]
    Import(String),

    #[error("Stale anchor: {0}")]
    StaleAnchor(String),

    #[error("Placement error: {0}")]
    Placement(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Error class reported to the invoking script alongside the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    Config,
    Validation,
    Auth,
    Transport,
    NotFound,
    Integrity,
    GenerationFailed,
    Storage,
    Import,
    StaleAnchor,
    Placement,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Config => "ConfigError",
            ErrorKind::Validation => "ValidationError",
            ErrorKind::Auth => "AuthError",
            ErrorKind::Transport => "TransportError",
            ErrorKind::NotFound => "NotFoundError",
            ErrorKind::Integrity => "IntegrityError",
            ErrorKind::GenerationFailed => "GenerationFailed",
            ErrorKind::Storage => "StorageError",
            ErrorKind::Import => "ImportError",
            ErrorKind::StaleAnchor => "StaleAnchorError",
            ErrorKind::Placement => "PlacementError",
        };
        f.write_str(name)
    }
}

impl ReelgenError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReelgenError::Config(_) | ReelgenError::Toml(_) => ErrorKind::Config,
            ReelgenError::Validation(_) => ErrorKind::Validation,
            ReelgenError::Provider(e) => e.kind(),
            ReelgenError::GenerationFailed { .. } => ErrorKind::GenerationFailed,
            ReelgenError::Storage(_) | ReelgenError::Io(_) | ReelgenError::Json(_) => {
                ErrorKind::Storage
            }
            ReelgenError::Import(_) => ErrorKind::Import,
            ReelgenError::StaleAnchor(_) => ErrorKind::StaleAnchor,
            ReelgenError::Placement(_) => ErrorKind::Placement,
        }
    }

    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}

/// Terminal failure payload handed to whatever displays the result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub message: String,
}

impl std::fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}
