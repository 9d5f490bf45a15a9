//! Configuration errors.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for configuration loading and validation.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while loading or validating `HaConfig`.
///
/// All of these are fatal: the daemon refuses to start half-configured.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("{0} is not configured")]
    Missing(&'static str),

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}
