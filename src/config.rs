//! Configuration loader and validator for the recipe poster.
//!
//! Everything comes from environment variables; a `.env` file is read first
//! when present. The resulting [`Config`] is built once at startup and handed
//! to the store, the publisher and the bot explicitly.
use reqwest::Url;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

pub const DEFAULT_BUCKET: &str = "recipe-images";
pub const DEFAULT_TABLE: &str = "recipes";
pub const DEFAULT_TELEGRAM_API: &str = "https://api.telegram.org";
pub const DEFAULT_STORE_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_TELEGRAM_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
    #[error("failed to read env file: {0}")]
    EnvFile(#[from] dotenvy::Error),
}

/// Root configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub telegram: TelegramConfig,
    pub store: StoreConfig,
}

/// Telegram Bot API settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelegramConfig {
    pub bot_token: String,
    /// Target channel: `-100...` numeric id or `@username`.
    pub chat_id: String,
    pub admin_user_ids: Vec<i64>,
    pub api_url: String,
    pub timeout_secs: u64,
}

/// Row store and object storage settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Project base URL without trailing slash.
    pub url: String,
    pub service_key: String,
    pub bucket: String,
    pub table: String,
    pub timeout_secs: u64,
}

impl TelegramConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl StoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Static set of Telegram user ids allowed to drive the bot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdminList(HashSet<i64>);

impl AdminList {
    pub fn new(ids: impl IntoIterator<Item = i64>) -> Self {
        Self(ids.into_iter().collect())
    }

    pub fn contains(&self, user_id: i64) -> bool {
        self.0.contains(&user_id)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl Config {
    /// Build a config from an arbitrary key lookup. `load` passes the process
    /// environment; tests pass a map.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string());
        let required = |key: &'static str| -> Result<String, ConfigError> {
            get(key)
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::Missing(key))
        };
        let with_default = |key: &str, default: &str| {
            get(key)
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let telegram = TelegramConfig {
            bot_token: required("TG_BOT_TOKEN")?,
            chat_id: required("TG_CHAT_ID")?,
            admin_user_ids: parse_admin_ids(&get("ADMIN_USER_IDS").unwrap_or_default()),
            api_url: with_default("TG_API_URL", DEFAULT_TELEGRAM_API)
                .trim_end_matches('/')
                .to_string(),
            timeout_secs: parse_secs(
                "TELEGRAM_TIMEOUT_SECS",
                get("TELEGRAM_TIMEOUT_SECS"),
                DEFAULT_TELEGRAM_TIMEOUT_SECS,
            )?,
        };

        let store = StoreConfig {
            url: required("SUPABASE_URL")?.trim_end_matches('/').to_string(),
            service_key: required("SUPABASE_SERVICE_KEY")?,
            bucket: with_default("SUPABASE_BUCKET", DEFAULT_BUCKET),
            table: with_default("SUPABASE_TABLE", DEFAULT_TABLE),
            timeout_secs: parse_secs(
                "STORE_TIMEOUT_SECS",
                get("STORE_TIMEOUT_SECS"),
                DEFAULT_STORE_TIMEOUT_SECS,
            )?,
        };

        let cfg = Config { telegram, store };
        validate(&cfg)?;
        Ok(cfg)
    }

    /// The bot refuses to start without at least one admin.
    pub fn require_admins(&self) -> Result<AdminList, ConfigError> {
        if self.telegram.admin_user_ids.is_empty() {
            return Err(ConfigError::Missing("ADMIN_USER_IDS"));
        }
        Ok(AdminList::new(self.telegram.admin_user_ids.iter().copied()))
    }
}

/// Load configuration from the process environment.
/// - If `env_file` is given it must exist and is read before the environment.
/// - Otherwise `./.env` is read when present.
pub fn load(env_file: Option<&Path>) -> Result<Config, ConfigError> {
    match env_file {
        Some(path) => {
            dotenvy::from_path(path)?;
        }
        None => allow_missing(dotenvy::dotenv())?,
    }
    Config::from_lookup(|key| std::env::var(key).ok())
}

/// A missing `.env` is the normal case in production; a broken one is not.
fn allow_missing<T>(res: dotenvy::Result<T>) -> Result<(), ConfigError> {
    match res {
        Ok(_) => Ok(()),
        Err(e) if e.not_found() => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn parse_admin_ids(raw: &str) -> Vec<i64> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .filter_map(|part| match part.parse::<i64>() {
            Ok(id) if id > 0 => Some(id),
            _ => {
                warn!(entry = part, "ignoring malformed ADMIN_USER_IDS entry");
                None
            }
        })
        .collect()
}

fn parse_secs(key: &str, raw: Option<String>, default: u64) -> Result<u64, ConfigError> {
    match raw.filter(|v| !v.is_empty()) {
        None => Ok(default),
        Some(v) => v
            .parse::<u64>()
            .map_err(|_| ConfigError::Invalid(format!("{key} must be a whole number of seconds"))),
    }
}

fn validate(cfg: &Config) -> Result<(), ConfigError> {
    let store_url = Url::parse(&cfg.store.url)
        .map_err(|e| ConfigError::Invalid(format!("SUPABASE_URL is not a valid URL: {e}")))?;
    if !matches!(store_url.scheme(), "http" | "https") {
        return Err(ConfigError::Invalid("SUPABASE_URL must be http(s)".into()));
    }
    Url::parse(&cfg.telegram.api_url)
        .map_err(|e| ConfigError::Invalid(format!("TG_API_URL is not a valid URL: {e}")))?;

    if cfg.store.bucket.contains('/') {
        return Err(ConfigError::Invalid("SUPABASE_BUCKET must not contain '/'".into()));
    }
    if cfg.telegram.timeout_secs == 0 {
        return Err(ConfigError::Invalid("TELEGRAM_TIMEOUT_SECS must be > 0".into()));
    }
    if cfg.store.timeout_secs == 0 {
        return Err(ConfigError::Invalid("STORE_TIMEOUT_SECS must be > 0".into()));
    }
    Ok(())
}

/// Example `.env` content with every recognised key.
pub fn example() -> &'static str {
    r#"TG_BOT_TOKEN=123456:YOUR_TELEGRAM_BOT_TOKEN
TG_CHAT_ID=-1001234567890
ADMIN_USER_IDS=123456789,987654321

SUPABASE_URL=https://project.supabase.co/
SUPABASE_SERVICE_KEY=YOUR_SERVICE_ROLE_KEY
SUPABASE_BUCKET=recipe-images
"#
}
