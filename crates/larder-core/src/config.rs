//! Larder configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LarderConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

impl LarderConfig {
    /// Load config from the default path (~/.larder/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::error::LarderError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| crate::error::LarderError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::LarderError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Larder home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".larder")
    }
}

/// Scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between ticks of the evaluation loop.
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
    /// Reference timezone as a fixed UTC offset, in hours. All "today" and
    /// digest-time arithmetic happens in this offset, resolved once per tick.
    #[serde(default = "default_utc_offset")]
    pub utc_offset_hours: i32,
    /// Daily digest fires when the tick's local time is within
    /// [configured, configured + tolerance) of a recipient's digest time.
    #[serde(default = "default_digest_tolerance")]
    pub digest_tolerance_min: u32,
    /// Digest time used for recipients with no stored preference, "HH:MM".
    #[serde(default = "default_digest_time")]
    pub default_digest_time: String,
    /// Minimum minutes between repeat reminders for an unacknowledged
    /// expired item.
    #[serde(default = "default_reminder_interval")]
    pub reminder_interval_min: u32,
}

fn default_tick_secs() -> u64 { 60 }
fn default_utc_offset() -> i32 { 3 }
fn default_digest_tolerance() -> u32 { 15 }
fn default_digest_time() -> String { "10:00".into() }
fn default_reminder_interval() -> u32 { 60 }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_secs: default_tick_secs(),
            utc_offset_hours: default_utc_offset(),
            digest_tolerance_min: default_digest_tolerance(),
            default_digest_time: default_digest_time(),
            reminder_interval_min: default_reminder_interval(),
        }
    }
}

/// Telegram channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default = "bool_true")]
    pub enabled: bool,
    /// Bot API token. Falls back to the LARDER_BOT_TOKEN env var when empty.
    #[serde(default)]
    pub bot_token: String,
}

fn bool_true() -> bool { true }

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bot_token: String::new(),
        }
    }
}

impl TelegramConfig {
    /// Resolve the bot token from config or environment.
    pub fn resolved_token(&self) -> Option<String> {
        if !self.bot_token.is_empty() {
            return Some(self.bot_token.clone());
        }
        std::env::var("LARDER_BOT_TOKEN").ok().filter(|t| !t.is_empty())
    }
}

/// Store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

fn default_db_path() -> String { "~/.larder/larder.db".into() }

impl Default for StoreConfig {
    fn default() -> Self {
        Self { db_path: default_db_path() }
    }
}

impl StoreConfig {
    /// Database path with a leading `~/` expanded to the home directory.
    pub fn resolved_db_path(&self) -> PathBuf {
        match self.db_path.strip_prefix("~/") {
            Some(rest) => dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(rest),
            None => PathBuf::from(&self.db_path),
        }
    }
}
