// src/config.rs

//! Application configuration structures.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::schedule::Backoff;

/// Root application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Hacker News API client settings
    #[serde(default)]
    pub hackernews: HackerNewsConfig,

    /// Telegram delivery settings
    #[serde(default)]
    pub telegram: TelegramConfig,

    /// Poll scheduling and scanning behavior
    #[serde(default)]
    pub poller: PollerConfig,

    /// Alert dispatch behavior
    #[serde(default)]
    pub alert: AlertConfig,

    /// Per-user quotas and command rate limits
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Persistence settings
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            tracing::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.hackernews.endpoint.trim().is_empty() {
            return Err(AppError::validation("hackernews.endpoint is empty"));
        }
        url::Url::parse(&self.hackernews.endpoint)
            .map_err(|e| AppError::validation(format!("hackernews.endpoint: {e}")))?;
        if self.hackernews.timeout_secs == 0 {
            return Err(AppError::validation("hackernews.timeout_secs must be > 0"));
        }
        if self.hackernews.max_concurrent == 0 {
            return Err(AppError::validation("hackernews.max_concurrent must be > 0"));
        }
        // Rejects factor <= 1, jitter outside [0, 100) and a zero unit.
        self.poller.backoff()?;
        if self.poller.max_attempts == 0 {
            return Err(AppError::validation("poller.max_attempts must be > 0"));
        }
        if self.poller.page_size == 0 {
            return Err(AppError::validation("poller.page_size must be > 0"));
        }
        if self.poller.scan_interval_secs == 0 {
            return Err(AppError::validation("poller.scan_interval_secs must be > 0"));
        }
        if self.alert.batch_size == 0 {
            return Err(AppError::validation("alert.batch_size must be > 0"));
        }
        if self.alert.dispatch_interval_secs == 0 {
            return Err(AppError::validation(
                "alert.dispatch_interval_secs must be > 0",
            ));
        }
        if self.limits.max_watch_items == 0 {
            return Err(AppError::validation("limits.max_watch_items must be > 0"));
        }
        Ok(())
    }
}

/// Hacker News API client settings.
#[derive(Debug, Clone, Deserialize)]
pub struct HackerNewsConfig {
    /// Base URL of the item API
    #[serde(default = "defaults::hn_endpoint")]
    pub endpoint: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Maximum concurrent item fetches within one scan page
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,
}

impl Default for HackerNewsConfig {
    fn default() -> Self {
        Self {
            endpoint: defaults::hn_endpoint(),
            timeout_secs: defaults::timeout(),
            user_agent: defaults::user_agent(),
            max_concurrent: defaults::max_concurrent(),
        }
    }
}

/// Telegram Bot API settings.
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    /// Bot token. Falls back to the TELEGRAM_BOT_TOKEN environment variable.
    #[serde(default)]
    pub bot_token: String,

    /// Bot API base URL
    #[serde(default = "defaults::telegram_api")]
    pub api_base: String,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            api_base: defaults::telegram_api(),
        }
    }
}

impl TelegramConfig {
    /// Resolve the bot token from config or environment.
    pub fn token(&self) -> Result<String> {
        if !self.bot_token.trim().is_empty() {
            return Ok(self.bot_token.clone());
        }
        std::env::var("TELEGRAM_BOT_TOKEN")
            .map_err(|_| AppError::config("telegram.bot_token is not set"))
    }
}

/// Poll scheduling and scanning behavior.
#[derive(Debug, Clone, Deserialize)]
pub struct PollerConfig {
    /// Delay before the first poll of a freshly watched item, in ms
    #[serde(default = "defaults::poll_delay")]
    pub initial_delay_ms: i64,

    /// Base delay added to every reschedule, in ms
    #[serde(default = "defaults::poll_delay")]
    pub poll_delay_ms: i64,

    /// Backoff growth exponent (must be > 1)
    #[serde(default = "defaults::backoff_factor")]
    pub backoff_factor: f64,

    /// Symmetric jitter around the nominal backoff, in percent
    #[serde(default = "defaults::backoff_jitter")]
    pub backoff_jitter_percent: f64,

    /// Backoff time unit in ms (one minute by default)
    #[serde(default = "defaults::backoff_unit")]
    pub backoff_unit_ms: u64,

    /// Polls after which an item is parked until re-watched
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: u32,

    /// Items processed per scan page
    #[serde(default = "defaults::page_size")]
    pub page_size: usize,

    /// Cadence of the scan-task scheduler in seconds
    #[serde(default = "defaults::scan_interval")]
    pub scan_interval_secs: u64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: defaults::poll_delay(),
            poll_delay_ms: defaults::poll_delay(),
            backoff_factor: defaults::backoff_factor(),
            backoff_jitter_percent: defaults::backoff_jitter(),
            backoff_unit_ms: defaults::backoff_unit(),
            max_attempts: defaults::max_attempts(),
            page_size: defaults::page_size(),
            scan_interval_secs: defaults::scan_interval(),
        }
    }
}

impl PollerConfig {
    /// Build the validated backoff policy from these settings.
    pub fn backoff(&self) -> Result<Backoff> {
        Backoff::new(
            self.backoff_factor,
            self.backoff_jitter_percent,
            self.backoff_unit_ms,
        )
    }
}

/// Alert dispatch behavior.
#[derive(Debug, Clone, Deserialize)]
pub struct AlertConfig {
    /// Pending alerts attempted per dispatch batch
    #[serde(default = "defaults::batch_size")]
    pub batch_size: usize,

    /// Cadence of the dispatcher in seconds
    #[serde(default = "defaults::dispatch_interval")]
    pub dispatch_interval_secs: u64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            batch_size: defaults::batch_size(),
            dispatch_interval_secs: defaults::dispatch_interval(),
        }
    }
}

/// Per-user quotas and command rate limits.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Maximum distinct items one user may watch
    #[serde(default = "defaults::max_watch_items")]
    pub max_watch_items: usize,

    /// Minimum gap between unwatch-all commands, in ms
    #[serde(default = "defaults::ratelimit_unwatchall")]
    pub ratelimit_unwatchall_ms: i64,

    /// Minimum gap between forced-update commands, in ms
    #[serde(default = "defaults::ratelimit_update")]
    pub ratelimit_update_ms: i64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_watch_items: defaults::max_watch_items(),
            ratelimit_unwatchall_ms: defaults::ratelimit_unwatchall(),
            ratelimit_update_ms: defaults::ratelimit_update(),
        }
    }
}

/// Persistence settings.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path of the SQLite database file
    #[serde(default = "defaults::db_path")]
    pub db_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: defaults::db_path(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Default tracing filter (overridden by RUST_LOG)
    #[serde(default = "defaults::log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::log_level(),
        }
    }
}

mod defaults {
    pub fn hn_endpoint() -> String {
        "https://hacker-news.firebaseio.com".to_string()
    }

    pub fn timeout() -> u64 {
        10
    }

    pub fn user_agent() -> String {
        format!("watchdog/{}", env!("CARGO_PKG_VERSION"))
    }

    pub fn max_concurrent() -> usize {
        4
    }

    pub fn telegram_api() -> String {
        "https://api.telegram.org".to_string()
    }

    // 30 minutes
    pub fn poll_delay() -> i64 {
        30 * 60 * 1000
    }

    pub fn backoff_factor() -> f64 {
        4.0
    }

    pub fn backoff_jitter() -> f64 {
        10.0
    }

    // 1 minute
    pub fn backoff_unit() -> u64 {
        60 * 1000
    }

    pub fn max_attempts() -> u32 {
        10
    }

    pub fn page_size() -> usize {
        10
    }

    // 5 minutes
    pub fn scan_interval() -> u64 {
        5 * 60
    }

    pub fn batch_size() -> usize {
        10
    }

    // 5 minutes
    pub fn dispatch_interval() -> u64 {
        5 * 60
    }

    pub fn max_watch_items() -> usize {
        10
    }

    // 30 minutes
    pub fn ratelimit_unwatchall() -> i64 {
        30 * 60 * 1000
    }

    // 15 minutes
    pub fn ratelimit_update() -> i64 {
        15 * 60 * 1000
    }

    pub fn db_path() -> String {
        "data/watchdog.db".to_string()
    }

    pub fn log_level() -> String {
        "info".to_string()
    }
}
