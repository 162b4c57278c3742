//! Configuration loading and persistence.
//!
//! Handles reading and writing the ahasend configuration file and applying
//! `AHASEND_*` environment overrides on top of it.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::{fs, path::PathBuf};

/// Configuration for the ahasend CLI.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Config {
    /// Base URL of the AhaSend API.
    pub api_url: String,
    /// API key used for REST calls and the stream WebSocket.
    #[serde(default)]
    pub api_key: String,
    /// Account the streams belong to.
    #[serde(default)]
    pub account_id: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: "https://api.ahasend.com".to_string(),
            api_key: String::new(),
            account_id: String::new(),
        }
    }
}

impl Config {
    /// Returns the configuration directory path, creating it if necessary.
    ///
    /// Directory selection priority:
    /// 1. `#[cfg(test)]` (unit tests): `tmp/ahasend-test`
    /// 2. `AHASEND_CONFIG_DIR` env var: explicit override
    /// 3. `AHASEND_ENV=test`: `tmp/ahasend-test` (integration tests)
    /// 4. Default: platform config dir (Linux: ~/.config/ahasend)
    pub fn config_dir() -> Result<PathBuf> {
        let dir = {
            #[cfg(test)]
            {
                // Unit tests: use repo's tmp/ directory (gitignored)
                PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tmp/ahasend-test")
            }

            #[cfg(not(test))]
            {
                if let Ok(dir) = std::env::var("AHASEND_CONFIG_DIR") {
                    PathBuf::from(dir)
                } else if crate::env::is_test_mode() {
                    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tmp/ahasend-test")
                } else {
                    dirs::config_dir()
                        .context("Could not determine config directory")?
                        .join("ahasend")
                }
            }
        };
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create config directory {}", dir.display()))?;
        Ok(dir)
    }

    /// Loads configuration from file, with environment variable overrides.
    pub fn load() -> Result<Self> {
        let mut config = match Self::load_from_file() {
            Ok(Some(config)) => config,
            Ok(None) => Self::default(),
            Err(e) => {
                log::warn!("Ignoring unreadable config file: {e:#}");
                Self::default()
            }
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Path of the config file inside [`Config::config_dir`].
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    /// Configuration as stored on disk, without environment overrides.
    ///
    /// Unlike [`Config::load`], an unreadable file is an error so that
    /// updating it never silently discards its contents.
    pub fn stored() -> Result<Self> {
        Ok(Self::load_from_file()?.unwrap_or_default())
    }

    fn load_from_file() -> Result<Option<Self>> {
        let config_path = Self::config_path()?;
        if !config_path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("failed to read {}", config_path.display()))?;
        let config = serde_json::from_str(&content)
            .with_context(|| format!("invalid JSON in {}", config_path.display()))?;
        Ok(Some(config))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(api_url) = std::env::var("AHASEND_API_URL") {
            self.api_url = api_url;
        }

        if let Ok(api_key) = std::env::var("AHASEND_API_KEY") {
            self.api_key = api_key;
        }

        if let Ok(account_id) = std::env::var("AHASEND_ACCOUNT_ID") {
            self.account_id = account_id;
        }
    }

    /// Persists the current configuration to disk.
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;
        fs::write(&config_path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("failed to write {}", config_path.display()))?;

        // Set restrictive permissions (owner read/write only), the file holds the API key
        #[cfg(unix)]
        fs::set_permissions(&config_path, fs::Permissions::from_mode(0o600))?;

        Ok(())
    }

    /// Fails with a readable message when credentials needed for streaming are missing.
    pub fn require_credentials(&self) -> Result<()> {
        if self.api_key.is_empty() {
            anyhow::bail!(
                "No API key configured. Set AHASEND_API_KEY or run `ahasend config --api-key <KEY>`."
            );
        }
        if self.account_id.is_empty() {
            anyhow::bail!(
                "No account id configured. Set AHASEND_ACCOUNT_ID or run `ahasend config --account-id <ID>`."
            );
        }
        Ok(())
    }

    /// Copy of the config that is safe to print.
    #[must_use]
    pub fn redacted(&self) -> Self {
        let api_key = match self.api_key.chars().count() {
            0 => String::new(),
            n if n <= 8 => "****".to_string(),
            _ => format!("{}****", self.api_key.chars().take(4).collect::<String>()),
        };
        Self {
            api_key,
            ..self.clone()
        }
    }
}
