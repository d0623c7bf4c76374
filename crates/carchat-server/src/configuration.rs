use crate::error::{to_env_var, ConfigError};
use carchat::agent::DEFAULT_MAX_TURNS;
use carchat::carquery::{CarQueryConfig, CARQUERY_HOST, CARQUERY_TIMEOUT_SECS};
use carchat::providers::configs::{AnthropicProviderConfig, ANTHROPIC_HOST, ANTHROPIC_MODEL};
use config::{Config, Environment};
use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;

/// Read when `CARCHAT_PROVIDER__API_KEY` is not set
pub const API_KEY_FALLBACK_VAR: &str = "ANTHROPIC_API_KEY";

#[derive(Debug, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerSettings {
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}

#[derive(Debug, Deserialize)]
pub struct ProviderSettings {
    #[serde(default = "default_anthropic_host")]
    pub host: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<i32>,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            host: default_anthropic_host(),
            api_key: None,
            model: default_model(),
            temperature: None,
            max_tokens: None,
        }
    }
}

impl ProviderSettings {
    /// The Anthropic client config, or the variable to set when no key is configured
    pub fn anthropic_config(&self) -> Result<AnthropicProviderConfig, ConfigError> {
        let api_key = self
            .api_key
            .clone()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar {
                env_var: to_env_var("provider.api_key"),
            })?;

        Ok(AnthropicProviderConfig {
            host: self.host.clone(),
            api_key,
            model: self.model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct CarQuerySettings {
    #[serde(default = "default_carquery_url")]
    pub base_url: String,
    #[serde(default = "default_carquery_timeout")]
    pub timeout_secs: u64,
}

impl Default for CarQuerySettings {
    fn default() -> Self {
        Self {
            base_url: default_carquery_url(),
            timeout_secs: default_carquery_timeout(),
        }
    }
}

impl CarQuerySettings {
    pub fn client_config(&self) -> CarQueryConfig {
        CarQueryConfig {
            host: self.base_url.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AgentSettings {
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub provider: ProviderSettings,
    #[serde(default)]
    pub carquery: CarQuerySettings,
    #[serde(default)]
    pub agent: AgentSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let mut settings = Self::load_and_validate()?;

        let configured = settings
            .provider
            .api_key
            .as_deref()
            .is_some_and(|key| !key.is_empty());
        if !configured {
            settings.provider.api_key = std::env::var(API_KEY_FALLBACK_VAR)
                .ok()
                .filter(|key| !key.is_empty());
        }

        Ok(settings)
    }

    fn load_and_validate() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .set_default("server.host", default_host())?
            .set_default("server.port", i64::from(default_port()))?
            .set_default("provider.host", default_anthropic_host())?
            .set_default("provider.model", default_model())?
            .set_default("carquery.base_url", default_carquery_url())?
            .add_source(
                Environment::with_prefix("CARCHAT")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize().map_err(|err| {
            tracing::debug!("Configuration error: {:?}", &err);
            ConfigError::Other(err)
        })
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_anthropic_host() -> String {
    ANTHROPIC_HOST.to_string()
}

fn default_model() -> String {
    ANTHROPIC_MODEL.to_string()
}

fn default_carquery_url() -> String {
    CARQUERY_HOST.to_string()
}

fn default_carquery_timeout() -> u64 {
    CARQUERY_TIMEOUT_SECS
}

fn default_max_turns() -> usize {
    DEFAULT_MAX_TURNS
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    fn clean_env() {
        for (key, _) in env::vars() {
            if key.starts_with("CARCHAT_") {
                env::remove_var(&key);
            }
        }
        env::remove_var(API_KEY_FALLBACK_VAR);
    }

    #[test]
    #[serial]
    fn test_default_settings() {
        clean_env();

        let settings = Settings::new().unwrap();
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 5000);
        assert_eq!(settings.provider.host, "https://api.anthropic.com");
        assert_eq!(settings.provider.model, "claude-sonnet-4-20250514");
        assert_eq!(settings.provider.api_key, None);
        assert_eq!(settings.provider.max_tokens, None);
        assert_eq!(settings.carquery.base_url, "https://www.carqueryapi.com");
        assert_eq!(settings.carquery.timeout_secs, 10);
        assert_eq!(settings.agent.max_turns, 10);
    }

    #[test]
    #[serial]
    fn test_environment_override() {
        clean_env();
        env::set_var("CARCHAT_SERVER__PORT", "8080");
        env::set_var("CARCHAT_PROVIDER__API_KEY", "test-key");
        env::set_var("CARCHAT_PROVIDER__MODEL", "claude-3-5-haiku-latest");
        env::set_var("CARCHAT_PROVIDER__TEMPERATURE", "0.2");
        env::set_var("CARCHAT_PROVIDER__MAX_TOKENS", "2000");
        env::set_var("CARCHAT_CARQUERY__BASE_URL", "http://localhost:9999");
        env::set_var("CARCHAT_CARQUERY__TIMEOUT_SECS", "3");
        env::set_var("CARCHAT_AGENT__MAX_TURNS", "4");

        let settings = Settings::new().unwrap();
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.provider.api_key.as_deref(), Some("test-key"));
        assert_eq!(settings.provider.model, "claude-3-5-haiku-latest");
        assert_eq!(settings.provider.temperature, Some(0.2));
        assert_eq!(settings.provider.max_tokens, Some(2000));
        assert_eq!(settings.carquery.base_url, "http://localhost:9999");
        assert_eq!(settings.carquery.client_config().timeout, Duration::from_secs(3));
        assert_eq!(settings.agent.max_turns, 4);

        clean_env();
    }

    #[test]
    #[serial]
    fn test_invalid_value_is_reported() {
        clean_env();
        env::set_var("CARCHAT_SERVER__PORT", "not-a-port");

        let result = Settings::new();
        assert!(matches!(result, Err(ConfigError::Other(_))));

        clean_env();
    }

    #[test]
    #[serial]
    fn test_api_key_fallback() {
        clean_env();
        env::set_var(API_KEY_FALLBACK_VAR, "sk-fallback");

        let settings = Settings::new().unwrap();
        assert_eq!(settings.provider.api_key.as_deref(), Some("sk-fallback"));

        env::set_var("CARCHAT_PROVIDER__API_KEY", "sk-prefixed");
        let settings = Settings::new().unwrap();
        assert_eq!(settings.provider.api_key.as_deref(), Some("sk-prefixed"));

        clean_env();
    }

    #[test]
    fn test_missing_api_key() {
        let provider = ProviderSettings::default();
        match provider.anthropic_config() {
            Err(ConfigError::MissingEnvVar { env_var }) => {
                assert_eq!(env_var, "CARCHAT_PROVIDER__API_KEY")
            }
            other => panic!("expected MissingEnvVar, got {:?}", other),
        }

        let provider = ProviderSettings {
            api_key: Some("sk-test".to_string()),
            ..ProviderSettings::default()
        };
        let config = provider.anthropic_config().unwrap();
        assert_eq!(config.api_key, "sk-test");
        assert_eq!(config.model, "claude-sonnet-4-20250514");
    }

    #[test]
    fn test_socket_addr_conversion() {
        let server_settings = ServerSettings {
            host: "127.0.0.1".to_string(),
            port: 5000,
        };
        let addr = server_settings.socket_addr().unwrap();
        assert_eq!(addr.to_string(), "127.0.0.1:5000");
    }
}
