//! Error types for the metasearch host.

use metasearch_core::{ConfigError, SearchError};

/// Top-level error type for the host application.
#[derive(Debug, thiserror::Error)]
pub enum MetasearchError {
    /// Settings file or engine registration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Query rejected before dispatch.
    #[error("search error: {0}")]
    Search(#[from] SearchError),

    /// Malformed search request.
    #[error("request error: {0}")]
    Request(String),

    /// Bridge read/write or serialisation error.
    #[error("channel error: {0}")]
    Channel(String),

    /// Unknown or disabled output format.
    #[error("format error: {0}")]
    Format(String),
}

impl From<ConfigError> for MetasearchError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, MetasearchError>;
