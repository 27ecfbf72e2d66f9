//! # Relay Config
//!
//! Configuration for the LLM relay: provider channels, credential lifecycle,
//! upstream transport and logging. Files are YAML or TOML, picked by
//! extension; a few settings can be overridden from the environment.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod model;

// Re-export main types
pub use error::{ConfigError, ConfigResult};
pub use loader::{
    load_config, ConfigFormat, ENV_LOG_JSON, ENV_LOG_LEVEL, ENV_TOKEN_LOOKAHEAD,
    ENV_TRANSPORT_TIMEOUT,
};
pub use model::{CredentialsConfig, ProviderConfig, RelayConfig, TransportSettings};
