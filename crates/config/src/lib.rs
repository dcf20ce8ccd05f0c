//! Application configuration.
//!
//! One immutable [`AppConfig`] is constructed at startup and passed by
//! reference into each component; core logic never does ambient lookups.
//! Secrets can be supplied via environment variables, which take precedence
//! over the file.

use std::env;
use std::fs;
use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// When and where the daily digest fires.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// IANA timezone name (e.g. `"Europe/Kyiv"`, `"America/New_York"`).
    /// Unrecognised names fall back to UTC at runtime.
    pub timezone: String,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
    /// Conversation id the scheduled digest is delivered to.
    pub destination: String,
    /// Master toggle for the scheduler loop.
    pub enabled: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            timezone: "Europe/Kyiv".to_string(),
            hour: 20,
            minute: 0,
            second: 0,
            destination: String::new(),
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Overridden at runtime by `OPENAI_API_KEY` when set.
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    /// Upper bound on one analysis or transcription call.
    pub timeout_secs: u64,
    /// Transcription language hint.
    pub language: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            timeout_secs: 75,
            language: "uk".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: ".daybook/notes.jsonl".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TelegramConfig {
    /// Overridden at runtime by `TELEGRAM_BOT_TOKEN` when set.
    pub bot_token: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub schedule: ScheduleConfig,
    pub llm: LlmConfig,
    pub store: StoreConfig,
    pub telegram: TelegramConfig,
}

impl AppConfig {
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::default();
        if let Ok(raw) = fs::read_to_string(path) {
            config = toml::from_str(&raw)?;
        }

        if let Ok(key) = env::var("OPENAI_API_KEY") {
            if !key.is_empty() {
                config.llm.api_key = key;
            }
        }
        if let Ok(token) = env::var("TELEGRAM_BOT_TOKEN") {
            if !token.is_empty() {
                config.telegram.bot_token = token;
            }
        }

        Ok(config)
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        let rendered = toml::to_string_pretty(self)?;
        fs::write(path, rendered)?;
        Ok(())
    }

    /// Whether delivery should go to Telegram rather than stdout.
    pub fn telegram_delivery(&self) -> bool {
        self.telegram.enabled && !self.telegram.bot_token.trim().is_empty()
    }
}
