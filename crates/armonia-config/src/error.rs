//! Error types for configuration discovery and loading.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config not found")]
    NotFound,

    #[error("unsupported configuration format: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    #[error("invalid config value for '{field}'{}", hint.as_ref().map(|h| format!(": {h}")).unwrap_or_default())]
    InvalidValue {
        field: String,
        hint: Option<String>,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
