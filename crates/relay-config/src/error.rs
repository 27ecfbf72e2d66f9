//! Configuration errors.

use std::path::PathBuf;

/// Configuration loading or validation failure
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("Failed to read config file {path}: {source}")]
    Io {
        /// File path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// File extension is not yaml, yml or toml
    #[error("Unsupported config format: {0}")]
    UnsupportedFormat(String),

    /// YAML parse failure
    #[error("Invalid YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// TOML parse failure
    #[error("Invalid TOML config: {0}")]
    Toml(#[from] toml::de::Error),

    /// Environment variable held an unusable value
    #[error("Invalid value for {var}: {message}")]
    EnvOverride {
        /// Variable name
        var: &'static str,
        /// What was wrong
        message: String,
    },

    /// Semantic validation failure
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

impl ConfigError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

/// Result alias for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;
