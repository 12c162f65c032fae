//! CLI configuration management.
//!
//! Configuration is stored as TOML:
//! - Linux: `~/.config/coursework/config.toml`
//! - Windows: `%APPDATA%/coursework/config.toml`
//!
//! `COURSEWORK_TOKEN` and `COURSEWORK_BASE_URL` override the file.

use std::path::{Path, PathBuf};

use coursework_submit::SubmitConfig;
use serde::{Deserialize, Serialize};

pub const TOKEN_ENV: &str = "COURSEWORK_TOKEN";
pub const BASE_URL_ENV: &str = "COURSEWORK_BASE_URL";

/// CLI configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Root URL of the coursework platform.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// API access token.
    #[serde(default)]
    pub token: String,

    /// Where encoded upload bodies are staged.
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,

    /// Where submission checkpoints are kept.
    #[serde(default = "default_store_dir")]
    pub store_dir: PathBuf,

    /// Replace same-named files instead of letting the server rename.
    #[serde(default)]
    pub overwrite: bool,

    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_base_url() -> String {
    "https://canvas.instructure.com".into()
}

fn default_staging_dir() -> PathBuf {
    data_dir().join("staging")
}

fn default_store_dir() -> PathBuf {
    data_dir().join("submissions")
}

fn default_channel_capacity() -> usize {
    256
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token: String::new(),
            staging_dir: default_staging_dir(),
            store_dir: default_store_dir(),
            overwrite: false,
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl Config {
    /// Loads configuration from the default location, creating it if missing.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&config_path())
    }

    /// Loads configuration from `path`, or writes a default there if not found.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    /// Writes the configuration to `path`.
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        // The file holds the access token.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    /// Applies overrides from the process environment.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides looked up through `var`. Empty values are ignored.
    pub fn with_overrides(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(token) = var(TOKEN_ENV).filter(|v| !v.is_empty()) {
            self.token = token;
        }
        if let Some(url) = var(BASE_URL_ENV).filter(|v| !v.is_empty()) {
            self.base_url = url;
        }
        self
    }

    pub fn submit_config(&self) -> SubmitConfig {
        SubmitConfig {
            staging_dir: self.staging_dir.clone(),
            overwrite: self.overwrite,
            channel_capacity: self.channel_capacity,
        }
    }
}

/// Returns the platform-specific configuration file path.
pub fn config_path() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(home)
            .join(".config")
            .join("coursework")
            .join("config.toml")
    }

    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        PathBuf::from(appdata).join("coursework").join("config.toml")
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        PathBuf::from("/tmp/coursework/config.toml")
    }
}

/// Returns the platform-specific directory for staged bodies and checkpoints.
fn data_dir() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(home)
            .join(".local")
            .join("share")
            .join("coursework")
    }

    #[cfg(target_os = "windows")]
    {
        let local = std::env::var("LOCALAPPDATA")
            .unwrap_or_else(|_| "C:\\Users\\Default\\AppData\\Local".into());
        PathBuf::from(local).join("coursework")
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        PathBuf::from("/tmp/coursework")
    }
}
