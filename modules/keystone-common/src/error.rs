use thiserror::Error;

/// Errors raised while assembling configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable was set but could not be parsed
    #[error("invalid value for {key}: {value:?}")]
    InvalidEnv { key: String, value: String },

    /// Config file could not be read or parsed
    #[error(transparent)]
    File(#[from] anyhow::Error),
}
