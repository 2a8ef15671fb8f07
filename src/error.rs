//! Crate error type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExplorerError {
    /// The presence backend rejected or failed a call.
    #[error("presence store error: {0}")]
    Store(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(#[from] config::ConfigError),
}

pub type Result<T> = std::result::Result<T, ExplorerError>;
