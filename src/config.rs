use crate::constants::{
    DEFAULT_MIN_PROGRESS_SECONDS, DEFAULT_NEAR_END_SECONDS, DEFAULT_SAVE_INTERVAL_SECONDS,
};
use crate::store::DEFAULT_TABLE;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

const ENV_STORE_URL: &str = "WATCHPOINT_STORE_URL";
const ENV_API_KEY: &str = "WATCHPOINT_API_KEY";
const ENV_ACCESS_TOKEN: &str = "WATCHPOINT_ACCESS_TOKEN";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub progress: ProgressConfig,

    #[serde(default)]
    pub playback: PlaybackConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub thumbnails: ThumbnailConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressConfig {
    /// Seconds before the end at which playback counts as finished
    #[serde(default = "default_near_end")]
    pub near_end_seconds: u64,

    /// Minimum gap between periodic saves while playing
    #[serde(default = "default_save_interval")]
    pub save_interval_seconds: u64,

    /// Positions below this are neither stored nor restored
    #[serde(default = "default_min_progress")]
    pub min_progress_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackConfig {
    #[serde(default)]
    pub autoplay: bool,

    /// Start the next episode when one finishes
    #[serde(default = "default_true")]
    pub playlist_mode: bool,

    #[serde(default = "default_seek_step")]
    pub seek_step_seconds: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    #[serde(default = "default_table")]
    pub table: String,

    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThumbnailConfig {
    #[serde(default = "default_timeout")]
    pub fetch_timeout_seconds: u64,
}

impl Config {
    /// Load from the default location, writing defaults on first run.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            info!("No config file found, using defaults");
            let config = Config::default();
            config.save_to(&config_path)?;
            Ok(config.with_env_overrides())
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", path);
        let contents = fs::read_to_string(path).context("Failed to read config file")?;
        let config: Config = toml::from_str(&contents).context("Failed to parse config file")?;
        info!("Config loaded successfully");
        Ok(config.with_env_overrides())
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, contents).context("Failed to write config file")?;

        debug!("Config saved to {:?}", path);
        Ok(())
    }

    /// Credentials from the environment win over the file.
    fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var(ENV_STORE_URL) {
            self.store.url = Some(url);
        }
        if let Ok(key) = std::env::var(ENV_API_KEY) {
            self.store.api_key = Some(key);
        }
        if let Ok(token) = std::env::var(ENV_ACCESS_TOKEN) {
            self.store.access_token = Some(token);
        }
        self
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("Failed to get config directory")?;
        Ok(config_dir.join("watchpoint").join("config.toml"))
    }
}

impl ProgressConfig {
    pub fn save_interval(&self) -> Duration {
        Duration::from_secs(self.save_interval_seconds)
    }
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            near_end_seconds: default_near_end(),
            save_interval_seconds: default_save_interval(),
            min_progress_seconds: default_min_progress(),
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            autoplay: false,
            playlist_mode: default_true(),
            seek_step_seconds: default_seek_step(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            access_token: None,
            table: default_table(),
            timeout_seconds: default_timeout(),
        }
    }
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_seconds: default_timeout(),
        }
    }
}

// Default value functions
fn default_near_end() -> u64 { DEFAULT_NEAR_END_SECONDS }
fn default_save_interval() -> u64 { DEFAULT_SAVE_INTERVAL_SECONDS }
fn default_min_progress() -> u64 { DEFAULT_MIN_PROGRESS_SECONDS }
fn default_true() -> bool { true }
fn default_seek_step() -> f64 { 10.0 }
fn default_table() -> String { DEFAULT_TABLE.to_string() }
fn default_timeout() -> u64 { 30 }

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.progress.near_end_seconds, DEFAULT_NEAR_END_SECONDS);
        assert_eq!(config.progress.save_interval(), Duration::from_secs(10));
        assert!(config.playback.playlist_mode);
        assert!(!config.playback.autoplay);
        assert_eq!(config.store.table, "watch_progress");
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [progress]
            near_end_seconds = 30

            [store]
            url = "https://example.supabase.co"
            "#,
        )
        .unwrap();

        assert_eq!(config.progress.near_end_seconds, 30);
        assert_eq!(config.progress.min_progress_seconds, DEFAULT_MIN_PROGRESS_SECONDS);
        assert_eq!(config.store.url.as_deref(), Some("https://example.supabase.co"));
        assert_eq!(config.store.timeout_seconds, 30);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.progress.save_interval_seconds = 3;
        config.playback.playlist_mode = false;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.progress.save_interval_seconds, 3);
        assert!(!loaded.playback.playlist_mode);
    }
}
