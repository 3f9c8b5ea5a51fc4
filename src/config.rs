use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Upper bound on the simulated typing delay
const MAX_REPLY_DELAY_MS: u64 = 60_000;

/// Longest idle window before a session is swept (one week)
const MAX_IDLE_TIMEOUT_MINUTES: u64 = 7 * 24 * 60;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub chat: ChatConfig,
    /// Optional; when absent the console host is used instead
    #[serde(default)]
    pub telegram: Option<TelegramConfig>,
    #[serde(default)]
    pub sessions: SessionsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    #[serde(default = "default_assistant_name")]
    pub assistant_name: String,
    #[serde(default = "default_reply_delay_ms")]
    pub reply_delay_ms: u64,
    #[serde(default = "default_greeting")]
    pub greeting: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    /// Empty list allows every user
    #[serde(default)]
    pub allowed_user_ids: Vec<u64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionsConfig {
    #[serde(default = "default_idle_timeout_minutes")]
    pub idle_timeout_minutes: u64,
    #[serde(default = "default_sweep_cron")]
    pub sweep_cron: String,
}

fn default_assistant_name() -> String {
    "Fleet Assistant".to_string()
}

fn default_reply_delay_ms() -> u64 {
    1000
}

fn default_greeting() -> String {
    "Hi there! 👋 I'm your rental assistant.\n\
     Ask me about rental plans, battery swaps, KYC, earnings or booking a vehicle."
        .to_string()
}

fn default_idle_timeout_minutes() -> u64 {
    30
}

fn default_sweep_cron() -> String {
    "0 * * * * *".to_string()
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            assistant_name: default_assistant_name(),
            reply_delay_ms: default_reply_delay_ms(),
            greeting: default_greeting(),
        }
    }
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            idle_timeout_minutes: default_idle_timeout_minutes(),
            sweep_cron: default_sweep_cron(),
        }
    }
}

impl ChatConfig {
    pub fn reply_delay(&self) -> Duration {
        Duration::from_millis(self.reply_delay_ms)
    }
}

impl SessionsConfig {
    pub fn idle_timeout(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.idle_timeout_minutes as i64)
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.chat.reply_delay_ms > MAX_REPLY_DELAY_MS {
            bail!(
                "chat.reply_delay_ms must be at most {} (got {})",
                MAX_REPLY_DELAY_MS,
                self.chat.reply_delay_ms
            );
        }
        if !(1..=MAX_IDLE_TIMEOUT_MINUTES).contains(&self.sessions.idle_timeout_minutes) {
            bail!(
                "sessions.idle_timeout_minutes must be between 1 and {} (got {})",
                MAX_IDLE_TIMEOUT_MINUTES,
                self.sessions.idle_timeout_minutes
            );
        }
        if let Some(telegram) = &self.telegram {
            if telegram.bot_token.trim().is_empty() {
                bail!("telegram.bot_token must not be empty");
            }
        }
        Ok(())
    }
}
