use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read tenant layout at {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },

    #[error("failed to parse tenant layout TOML at {path}: {source}")]
    Parse { path: PathBuf, source: Box<toml::de::Error> },

    /// A malformed layout is rejected, not retried. The pipeline
    /// manager logs this at warning and attaches it to the tenant's
    /// configuration warnings rather than panicking.
    #[error("invalid tenant layout: {0}")]
    Invalid(String),
}
