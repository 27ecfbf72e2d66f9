//! Configuration model.

use crate::error::{ConfigError, ConfigResult};
use relay_core::{ProviderKind, TransportConfig};
use relay_telemetry::LoggingConfig;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;
use url::Url;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RelayConfig {
    /// Credential lifecycle settings
    #[serde(default)]
    pub credentials: CredentialsConfig,

    /// Upstream HTTP client settings
    #[serde(default)]
    pub transport: TransportSettings,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Configured vendor channels
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

/// Credential lifecycle settings
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialsConfig {
    /// Refresh a cached token this long before it expires
    #[serde(default = "default_lookahead", with = "humantime_serde")]
    pub lookahead: Duration,

    /// Validity of self-signed (Zhipu) tokens
    #[serde(default = "default_signed_token_ttl", with = "humantime_serde")]
    pub signed_token_ttl: Duration,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            lookahead: default_lookahead(),
            signed_token_ttl: default_signed_token_ttl(),
        }
    }
}

/// Upstream HTTP client settings
#[derive(Debug, Clone, Deserialize)]
pub struct TransportSettings {
    /// Whole-request timeout
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    /// Connect timeout
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Idle connections kept per host
    #[serde(default = "default_pool_size")]
    pub pool_max_idle_per_host: usize,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            connect_timeout: default_connect_timeout(),
            pool_max_idle_per_host: default_pool_size(),
        }
    }
}

impl From<&TransportSettings> for TransportConfig {
    fn from(settings: &TransportSettings) -> Self {
        Self {
            timeout: settings.timeout,
            connect_timeout: settings.connect_timeout,
            pool_max_idle_per_host: settings.pool_max_idle_per_host,
        }
    }
}

/// One vendor channel
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    /// Unique channel id
    pub id: String,

    /// Vendor family
    pub kind: ProviderKind,

    /// Channel credential: `client_id|client_secret` for Baidu,
    /// `id.secret` for Zhipu, the API key for PaLM
    pub api_key: SecretString,

    /// Override the vendor API host
    #[serde(default)]
    pub base_url: Option<String>,

    /// Disabled channels are skipped when building providers
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl ProviderConfig {
    /// Raw credential string
    #[must_use]
    pub fn credential(&self) -> &str {
        self.api_key.expose_secret()
    }
}

impl RelayConfig {
    /// Enabled providers, in file order
    pub fn enabled_providers(&self) -> impl Iterator<Item = &ProviderConfig> {
        self.providers.iter().filter(|p| p.enabled)
    }

    /// Look up a provider by id
    #[must_use]
    pub fn provider(&self, id: &str) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.id == id)
    }

    /// Check semantic constraints
    ///
    /// # Errors
    /// `ConfigError::Validation` describing the first violation
    pub fn validate(&self) -> ConfigResult<()> {
        if self.credentials.signed_token_ttl.is_zero() {
            return Err(ConfigError::validation(
                "credentials.signed_token_ttl must be greater than zero",
            ));
        }
        if self.transport.timeout.is_zero() {
            return Err(ConfigError::validation(
                "transport.timeout must be greater than zero",
            ));
        }

        let mut seen = HashSet::new();
        for provider in &self.providers {
            let id = provider.id.trim();
            if id.is_empty() {
                return Err(ConfigError::validation("provider id must not be empty"));
            }
            if !seen.insert(id) {
                return Err(ConfigError::validation(format!(
                    "duplicate provider id '{id}'"
                )));
            }
            if provider.credential().trim().is_empty() {
                return Err(ConfigError::validation(format!(
                    "provider '{id}' has an empty api_key"
                )));
            }
            if let Some(base_url) = &provider.base_url {
                let url = Url::parse(base_url).map_err(|e| {
                    ConfigError::validation(format!("provider '{id}' base_url '{base_url}': {e}"))
                })?;
                if !matches!(url.scheme(), "http" | "https") {
                    return Err(ConfigError::validation(format!(
                        "provider '{id}' base_url must be http or https"
                    )));
                }
            }
        }

        Ok(())
    }
}

fn default_lookahead() -> Duration {
    Duration::from_secs(60 * 60)
}

fn default_signed_token_ttl() -> Duration {
    Duration::from_secs(24 * 60 * 60)
}

fn default_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_pool_size() -> usize {
    100
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(id: &str, kind: ProviderKind) -> ProviderConfig {
        ProviderConfig {
            id: id.to_string(),
            kind,
            api_key: SecretString::new("key".to_string()),
            base_url: None,
            enabled: true,
        }
    }

    #[test]
    fn test_defaults_validate() {
        let config = RelayConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.credentials.lookahead, Duration::from_secs(3600));
        assert_eq!(config.transport.pool_max_idle_per_host, 100);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let config = RelayConfig {
            providers: vec![
                provider("chat", ProviderKind::Palm),
                provider("chat", ProviderKind::Baidu),
            ],
            ..Default::default()
        };
        let err = config.validate().expect_err("duplicate");
        assert!(err.to_string().contains("duplicate provider id 'chat'"));
    }

    #[test]
    fn test_bad_base_url_rejected() {
        let mut palm = provider("palm", ProviderKind::Palm);
        palm.base_url = Some("ftp://example.com".to_string());
        let config = RelayConfig {
            providers: vec![palm],
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let mut config = RelayConfig::default();
        config.credentials.signed_token_ttl = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_enabled_filter() {
        let mut off = provider("off", ProviderKind::Zhipu);
        off.enabled = false;
        let config = RelayConfig {
            providers: vec![provider("on", ProviderKind::Zhipu), off],
            ..Default::default()
        };
        let ids: Vec<&str> = config.enabled_providers().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["on"]);
        assert!(config.provider("off").is_some());
    }

    #[test]
    fn test_secret_not_in_debug() {
        let config = provider("p", ProviderKind::Palm);
        assert!(!format!("{config:?}").contains("\"key\""));
        assert_eq!(config.credential(), "key");
    }
}
