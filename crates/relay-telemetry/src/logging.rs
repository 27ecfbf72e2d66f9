//! Structured logging setup.
//!
//! Installs a `tracing-subscriber` registry with an [`EnvFilter`] and a
//! `fmt` layer, either human-readable or JSON lines.

use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset (e.g. `info`, `relay_auth=debug`)
    pub level: String,
    /// Emit JSON lines instead of text
    pub json: bool,
    /// Include the event target
    pub with_target: bool,
    /// Include file and line
    pub with_location: bool,
    /// Colored output for text logs
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            with_target: true,
            with_location: false,
            ansi: true,
        }
    }
}

impl LoggingConfig {
    /// Configuration with the given level
    #[must_use]
    pub fn new(level: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            ..Default::default()
        }
    }

    /// Switch JSON output on or off
    #[must_use]
    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }

    /// Switch file/line output on or off
    #[must_use]
    pub fn with_location(mut self, enabled: bool) -> Self {
        self.with_location = enabled;
        self
    }

    /// Build the filter: `RUST_LOG` wins, then the configured level
    ///
    /// # Errors
    /// Returns error if the configured directive does not parse
    pub fn filter(&self) -> Result<EnvFilter, TelemetryError> {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
        EnvFilter::try_new(&self.level).map_err(|e| TelemetryError::Filter {
            directive: self.level.clone(),
            message: e.to_string(),
        })
    }
}

/// Install the global subscriber
///
/// # Errors
/// Returns error if the filter is invalid or a global subscriber is already set
pub fn init_logging(config: &LoggingConfig) -> Result<(), TelemetryError> {
    let filter = config.filter()?;

    let layer = if config.json {
        fmt::layer()
            .json()
            .with_target(config.with_target)
            .with_file(config.with_location)
            .with_line_number(config.with_location)
            .with_filter(filter)
            .boxed()
    } else {
        fmt::layer()
            .with_ansi(config.ansi)
            .with_target(config.with_target)
            .with_file(config.with_location)
            .with_line_number(config.with_location)
            .with_filter(filter)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .map_err(|e| TelemetryError::Init(e.to_string()))?;

    info!(level = %config.level, json = config.json, "Logging initialized");
    Ok(())
}

/// Logging initialization error
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// Invalid filter directive
    #[error("Invalid log filter '{directive}': {message}")]
    Filter {
        /// The rejected directive
        directive: String,
        /// Parser message
        message: String,
    },
    /// Failed to install the subscriber
    #[error("Failed to initialize logging: {0}")]
    Init(String),
}
