//! Configuration for the relay bot.
//!
//! Loaded from `$RELAY_CONFIG` or `~/.relay/config.toml`. String values may
//! reference environment variables as `${NAME}`; unset variables expand to the
//! empty string, which validation then rejects for required fields.

use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};

use relay_types::{ApiKey, BotToken, NonEmptyString};
use serde::Deserialize;

pub const CONFIG_ENV_VAR: &str = "RELAY_CONFIG";

const DEFAULT_API_URL: &str = "https://api.openai.com/v1";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
const DEFAULT_HISTORY_LENGTH: u32 = 10;
const DEFAULT_HISTORY_TIMEOUT_MINUTES: u64 = 30;
const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_DELAY_SECS: u64 = 5;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not determine config path (set {CONFIG_ENV_VAR} or HOME)")]
    NoPath,
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn path(&self) -> Option<&Path> {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => Some(path),
            ConfigError::NoPath | ConfigError::Invalid(_) => None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RelayConfig {
    pub telegram: TelegramConfig,
    pub openai: OpenAiConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

#[derive(Deserialize)]
pub struct TelegramConfig {
    pub token: String,
    /// Chat ids allowed to talk to the bot.
    #[serde(default)]
    pub allowed_users: Vec<i64>,
    /// Chat usernames allowed to talk to the bot.
    #[serde(default)]
    pub allowed_channels: Vec<String>,
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("token", &"<redacted>")
            .field("allowed_users", &self.allowed_users)
            .field("allowed_channels", &self.allowed_channels)
            .finish()
    }
}

#[derive(Deserialize)]
pub struct OpenAiConfig {
    pub api_key: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl std::fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let key = if self.api_key.is_empty() { "<unset>" } else { "<redacted>" };
        f.debug_struct("OpenAiConfig")
            .field("api_key", &key)
            .field("api_url", &self.api_url)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
pub struct SessionConfig {
    /// Empty means "first model returned by `/models`".
    #[serde(default)]
    pub default_model: String,
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default = "default_history_length")]
    pub history_length: u32,
    #[serde(default = "default_history_timeout_minutes")]
    pub history_timeout_minutes: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_model: String::new(),
            system_prompt: String::new(),
            history_length: DEFAULT_HISTORY_LENGTH,
            history_timeout_minutes: DEFAULT_HISTORY_TIMEOUT_MINUTES,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_delay_secs")]
    pub delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay_secs: DEFAULT_RETRY_DELAY_SECS,
        }
    }
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

const fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

const fn default_history_length() -> u32 {
    DEFAULT_HISTORY_LENGTH
}

const fn default_history_timeout_minutes() -> u64 {
    DEFAULT_HISTORY_TIMEOUT_MINUTES
}

const fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

const fn default_retry_delay_secs() -> u64 {
    DEFAULT_RETRY_DELAY_SECS
}

/// Replace every `${NAME}` with the value of the environment variable `NAME`.
///
/// Unset variables become empty. An unclosed `${` is kept verbatim.
pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };
        let var = &after[..end];
        if !var.is_empty() {
            out.push_str(&env::var(var).unwrap_or_default());
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    out
}

impl RelayConfig {
    /// Load from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_path().ok_or(ConfigError::NoPath)?;
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| {
            tracing::warn!(path = %path.display(), error = %source, "Failed to read config");
            ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }
        })?;
        let config = Self::parse(&content).map_err(|err| match err {
            ParseFailure::Toml(source) => {
                tracing::warn!(path = %path.display(), error = %source, "Failed to parse config");
                ConfigError::Parse {
                    path: path.to_path_buf(),
                    source,
                }
            }
            ParseFailure::Invalid(reason) => ConfigError::Invalid(reason),
        })?;
        tracing::info!(path = %path.display(), "Config loaded");
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Self::parse(content).map_err(|err| match err {
            ParseFailure::Toml(source) => ConfigError::Parse {
                path: PathBuf::new(),
                source,
            },
            ParseFailure::Invalid(reason) => ConfigError::Invalid(reason),
        })
    }

    fn parse(content: &str) -> Result<Self, ParseFailure> {
        let mut config: RelayConfig = toml::from_str(content).map_err(ParseFailure::Toml)?;
        config.expand();
        config.validate().map_err(ParseFailure::Invalid)?;
        Ok(config)
    }

    fn expand(&mut self) {
        for field in [
            &mut self.telegram.token,
            &mut self.openai.api_key,
            &mut self.openai.api_url,
            &mut self.session.default_model,
            &mut self.session.system_prompt,
        ] {
            *field = expand_env_vars(field);
        }
        for channel in &mut self.telegram.allowed_channels {
            *channel = expand_env_vars(channel);
        }
    }

    fn validate(&self) -> Result<(), String> {
        if self.telegram.token.trim().is_empty() {
            return Err("telegram.token must not be empty".into());
        }
        if self.openai.api_key.trim().is_empty() {
            return Err("openai.api_key must not be empty".into());
        }
        if self.openai.api_url.trim().is_empty() {
            return Err("openai.api_url must not be empty".into());
        }
        if self.openai.request_timeout_secs == 0 {
            return Err("openai.request_timeout_secs must be positive".into());
        }
        if self.session.history_timeout_minutes == 0 {
            return Err("session.history_timeout_minutes must be positive".into());
        }
        if self.retry.max_attempts == 0 {
            return Err("retry.max_attempts must be at least 1".into());
        }
        Ok(())
    }

    #[must_use]
    pub fn bot_token(&self) -> BotToken {
        BotToken::new(self.telegram.token.trim())
    }

    #[must_use]
    pub fn api_key(&self) -> ApiKey {
        ApiKey::new(self.openai.api_key.trim())
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.openai.request_timeout_secs)
    }

    /// History retention window.
    #[must_use]
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.session.history_timeout_minutes.saturating_mul(60))
    }

    #[must_use]
    pub fn system_prompt(&self) -> Option<NonEmptyString> {
        NonEmptyString::non_blank(self.session.system_prompt.clone())
    }

    /// Configured model, if any.
    #[must_use]
    pub fn default_model(&self) -> Option<&str> {
        let model = self.session.default_model.trim();
        (!model.is_empty()).then_some(model)
    }

    #[must_use]
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry.delay_secs)
    }
}

enum ParseFailure {
    Toml(toml::de::Error),
    Invalid(String),
}

/// `$RELAY_CONFIG` if set and non-empty, else `~/.relay/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    if let Ok(path) = env::var(CONFIG_ENV_VAR)
        && !path.trim().is_empty()
    {
        return Some(PathBuf::from(path));
    }
    dirs::home_dir().map(|home| home.join(".relay").join("config.toml"))
}
