use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_SETTINGS_PATH: &str = "data/settings.json";
pub const MAX_PAGES_LIMIT: u32 = 50;

/// Persisted monitor settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub city: String,
    pub telegram_token: String,
    pub telegram_chat_id: String,
    pub interval_minutes: f64,
    pub max_pages: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            city: String::new(),
            telegram_token: String::new(),
            telegram_chat_id: String::new(),
            interval_minutes: 30.0,
            max_pages: 5,
        }
    }
}

impl Settings {
    /// Load from `path`; a missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Invalid settings file {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write settings to {}", path.display()))
    }

    /// `TELEGRAM_BOT_TOKEN` / `TELEGRAM_CHAT_ID` win over the file.
    pub fn apply_env(&mut self) {
        self.apply_overrides(
            std::env::var("TELEGRAM_BOT_TOKEN").ok(),
            std::env::var("TELEGRAM_CHAT_ID").ok(),
        );
    }

    fn apply_overrides(&mut self, token: Option<String>, chat_id: Option<String>) {
        if let Some(t) = token.filter(|t| !t.trim().is_empty()) {
            self.telegram_token = t.trim().to_string();
        }
        if let Some(c) = chat_id.filter(|c| !c.trim().is_empty()) {
            self.telegram_chat_id = c.trim().to_string();
        }
    }

    /// Numeric fields only; usable on a half-configured file.
    pub fn check_ranges(&self) -> Result<()> {
        if !self.interval_minutes.is_finite() || self.interval_minutes <= 0.0 {
            bail!("Check interval must be a positive number of minutes");
        }
        if !(1..=MAX_PAGES_LIMIT).contains(&self.max_pages) {
            bail!("Max pages must be between 1 and {}", MAX_PAGES_LIMIT);
        }
        Ok(())
    }

    /// Check the fields a scan needs; Telegram credentials only when sending.
    pub fn validate(&self, require_telegram: bool) -> Result<()> {
        if self.city.trim().is_empty() {
            bail!("City not set (run `configure --city <name>`)");
        }
        self.check_ranges()?;
        if require_telegram {
            if self.telegram_token.trim().is_empty() {
                bail!("Telegram token not set");
            }
            if self.telegram_chat_id.trim().is_empty() {
                bail!("Telegram chat ID not set");
            }
        }
        Ok(())
    }

    pub fn masked_token(&self) -> String {
        if self.telegram_token.is_empty() {
            "Not set".to_string()
        } else {
            let head: String = self.telegram_token.chars().take(20).collect();
            format!("{}...", head)
        }
    }
}
