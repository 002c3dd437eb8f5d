use ::config::{Config, Environment};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::providers::configs::OpenAiProviderConfig;
use crate::providers::retry::{RetryPolicy, DEFAULT_MAX_RETRIES};

const ENV_PREFIX: &str = "CONDENTIS";
const OPENAI_API_KEY: &str = "OPENAI_API_KEY";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {env_var}")]
    MissingEnvVar { env_var: String },
    #[error("Configuration error: {0}")]
    Other(#[from] ::config::ConfigError),
}

/// `provider.api_key` -> `CONDENTIS_PROVIDER__API_KEY`
pub fn to_env_var(field: &str) -> String {
    format!(
        "{}_{}",
        ENV_PREFIX,
        field.replace('.', "__").to_uppercase()
    )
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<i32>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AgentSettings {
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    #[serde(default)]
    pub developer_instructions: Option<String>,
    #[serde(default)]
    pub user_instructions: Option<String>,
    /// Directory holding `<key>/tokenizer.json` files.
    #[serde(default)]
    pub tokenizer_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub provider: ProviderSettings,
    #[serde(default)]
    pub agent: AgentSettings,
}

impl Settings {
    /// Load settings from a `.env` file, if any, and the environment.
    pub fn new() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::load_and_validate()
    }

    fn load_and_validate() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .set_default("provider.host", default_host())?
            .set_default("provider.model", default_model())?
            .set_default("provider.max_retries", default_max_retries())?
            .set_default("provider.base_delay_ms", default_base_delay_ms())?
            // The conventional key, overridden by our own variable
            .set_default("provider.api_key", std::env::var(OPENAI_API_KEY).ok())?
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = match config.try_deserialize() {
            Ok(settings) => settings,
            Err(err) => {
                tracing::debug!("Configuration error: {:?}", &err);
                return Err(match &err {
                    ::config::ConfigError::NotFound(field) => ConfigError::MissingEnvVar {
                        env_var: to_env_var(field),
                    },
                    _ => ConfigError::Other(err),
                });
            }
        };

        if settings.api_key().is_none() {
            return Err(ConfigError::MissingEnvVar {
                env_var: to_env_var("provider.api_key"),
            });
        }
        Ok(settings)
    }

    fn api_key(&self) -> Option<&str> {
        self.provider
            .api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
    }

    pub fn provider_config(&self) -> OpenAiProviderConfig {
        OpenAiProviderConfig {
            host: self.provider.host.clone(),
            api_key: self.api_key().unwrap_or_default().to_string(),
            model: self.provider.model.clone(),
            temperature: self.provider.temperature,
            max_tokens: self.provider.max_tokens,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.provider.max_retries,
            Duration::from_millis(self.provider.base_delay_ms),
        )
    }

    /// The configured working directory, or the process's own.
    pub fn cwd(&self) -> PathBuf {
        self.agent
            .cwd
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

fn default_host() -> String {
    "https://api.openai.com".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_base_delay_ms() -> u64 {
    1000
}
