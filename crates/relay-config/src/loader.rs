//! File loading and environment overrides.

use crate::error::{ConfigError, ConfigResult};
use crate::model::RelayConfig;
use humantime_serde::re::humantime;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Overrides the log filter directive
pub const ENV_LOG_LEVEL: &str = "RELAY_LOG_LEVEL";
/// Switches JSON logs on or off
pub const ENV_LOG_JSON: &str = "RELAY_LOG_JSON";
/// Overrides the token refresh lookahead (humantime, e.g. `30m`)
pub const ENV_TOKEN_LOOKAHEAD: &str = "RELAY_TOKEN_LOOKAHEAD";
/// Overrides the upstream request timeout (humantime, e.g. `90s`)
pub const ENV_TRANSPORT_TIMEOUT: &str = "RELAY_TRANSPORT_TIMEOUT";

/// Supported file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// `.yaml` / `.yml`
    Yaml,
    /// `.toml`
    Toml,
}

impl ConfigFormat {
    /// Pick the format from a file extension
    ///
    /// # Errors
    /// `UnsupportedFormat` for any other extension
    pub fn from_path(path: &Path) -> ConfigResult<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") => {
                Ok(Self::Yaml)
            }
            Some(ext) if ext.eq_ignore_ascii_case("toml") => Ok(Self::Toml),
            _ => Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        }
    }
}

impl RelayConfig {
    /// Parse configuration text without overrides or validation
    ///
    /// # Errors
    /// Returns a parse error for malformed input
    pub fn parse(text: &str, format: ConfigFormat) -> ConfigResult<Self> {
        match format {
            ConfigFormat::Yaml => Ok(serde_yaml::from_str(text)?),
            ConfigFormat::Toml => Ok(toml::from_str(text)?),
        }
    }

    /// Apply overrides from the process environment
    ///
    /// # Errors
    /// `EnvOverride` if a variable holds an unusable value
    pub fn apply_env_overrides(&mut self) -> ConfigResult<()> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary lookup
    ///
    /// # Errors
    /// `EnvOverride` if a variable holds an unusable value
    pub fn apply_overrides<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            self.logging.level = level;
        }
        if let Some(json) = lookup(ENV_LOG_JSON) {
            self.logging.json = parse_bool(ENV_LOG_JSON, &json)?;
        }
        if let Some(lookahead) = lookup(ENV_TOKEN_LOOKAHEAD) {
            self.credentials.lookahead = parse_duration(ENV_TOKEN_LOOKAHEAD, &lookahead)?;
        }
        if let Some(timeout) = lookup(ENV_TRANSPORT_TIMEOUT) {
            self.transport.timeout = parse_duration(ENV_TRANSPORT_TIMEOUT, &timeout)?;
        }
        Ok(())
    }
}

/// Load, override and validate a configuration file
///
/// # Errors
/// Returns error if the file cannot be read or parsed, an override is
/// invalid, or validation fails
pub async fn load_config(path: impl AsRef<Path>) -> ConfigResult<RelayConfig> {
    let path = path.as_ref();
    let format = ConfigFormat::from_path(path)?;

    debug!(path = %path.display(), ?format, "Loading configuration");

    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

    let mut config = RelayConfig::parse(&text, format)?;
    config.apply_env_overrides()?;
    config.validate()?;

    info!(
        path = %path.display(),
        providers = config.providers.len(),
        "Configuration loaded"
    );

    Ok(config)
}

fn parse_bool(var: &'static str, value: &str) -> ConfigResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::EnvOverride {
            var,
            message: format!("expected a boolean, got '{other}'"),
        }),
    }
}

fn parse_duration(var: &'static str, value: &str) -> ConfigResult<Duration> {
    humantime::parse_duration(value.trim()).map_err(|e| ConfigError::EnvOverride {
        var,
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const YAML: &str = r"
credentials:
  lookahead: 30m
providers:
  - id: ernie
    kind: baidu
    api_key: client|secret
  - id: glm
    kind: zhipu
    api_key: abc.def
    base_url: http://localhost:9000
";

    #[test]
    fn test_format_from_path() {
        assert_eq!(
            ConfigFormat::from_path(Path::new("relay.YML")).ok(),
            Some(ConfigFormat::Yaml)
        );
        assert_eq!(
            ConfigFormat::from_path(Path::new("relay.toml")).ok(),
            Some(ConfigFormat::Toml)
        );
        assert!(ConfigFormat::from_path(Path::new("relay.json")).is_err());
        assert!(ConfigFormat::from_path(Path::new("relay")).is_err());
    }

    #[test]
    fn test_parse_yaml() {
        let config = RelayConfig::parse(YAML, ConfigFormat::Yaml).expect("config");
        assert_eq!(config.credentials.lookahead, Duration::from_secs(30 * 60));
        assert_eq!(config.providers.len(), 2);
        assert_eq!(config.providers[1].credential(), "abc.def");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            (ENV_LOG_LEVEL, "debug"),
            (ENV_LOG_JSON, "yes"),
            (ENV_TOKEN_LOOKAHEAD, "5m"),
            (ENV_TRANSPORT_TIMEOUT, "90s"),
        ]);
        let mut config = RelayConfig::default();
        config
            .apply_overrides(|name| vars.get(name).map(ToString::to_string))
            .expect("overrides");

        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json);
        assert_eq!(config.credentials.lookahead, Duration::from_secs(300));
        assert_eq!(config.transport.timeout, Duration::from_secs(90));
    }

    #[test]
    fn test_bad_override() {
        let mut config = RelayConfig::default();
        let err = config
            .apply_overrides(|name| (name == ENV_TOKEN_LOOKAHEAD).then(|| "soon".to_string()))
            .expect_err("invalid");
        assert!(matches!(
            err,
            ConfigError::EnvOverride {
                var: ENV_TOKEN_LOOKAHEAD,
                ..
            }
        ));

        let err = config
            .apply_overrides(|name| (name == ENV_LOG_JSON).then(|| "maybe".to_string()))
            .expect_err("invalid");
        assert!(err.to_string().contains(ENV_LOG_JSON));
    }
}
