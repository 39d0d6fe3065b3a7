//! Error types shared across gifmix crates.

use std::path::PathBuf;

/// Top-level error type for gifmix operations.
#[derive(Debug, thiserror::Error)]
pub enum GifmixError {
    #[error("Fetch error: {message}")]
    Fetch { message: String },

    #[error("Decode error: {message}")]
    Decode { message: String },

    #[error("Engine error: {message}")]
    Engine { message: String },

    #[error("Catalog error: {message}")]
    Catalog { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using GifmixError.
pub type GifmixResult<T> = Result<T, GifmixError>;

impl GifmixError {
    pub fn fetch(msg: impl Into<String>) -> Self {
        Self::Fetch {
            message: msg.into(),
        }
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode {
            message: msg.into(),
        }
    }

    pub fn engine(msg: impl Into<String>) -> Self {
        Self::Engine {
            message: msg.into(),
        }
    }

    pub fn catalog(msg: impl Into<String>) -> Self {
        Self::Catalog {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }
}
