//! `ahasend config`: update and print the configuration.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use crate::config::Config;

/// `config` arguments. Any value given is written to the config file.
#[derive(Debug, Clone, Default, Args)]
pub struct ConfigArgs {
    /// Base URL of the AhaSend API
    #[arg(long, value_name = "URL")]
    pub api_url: Option<String>,

    /// API key used for stream initiation and the WebSocket
    #[arg(long, value_name = "KEY")]
    pub api_key: Option<String>,

    /// Account the streams belong to
    #[arg(long, value_name = "ID")]
    pub account_id: Option<String>,
}

impl ConfigArgs {
    fn has_updates(&self) -> bool {
        self.api_url.is_some() || self.api_key.is_some() || self.account_id.is_some()
    }
}

/// Save any values passed in `args`, then print the effective config.
pub fn run(args: &ConfigArgs) -> Result<()> {
    if let Some(path) = save(args)? {
        println!("Saved {}", path.display());
    }
    show()
}

/// Merge `args` into the stored config file.
///
/// Environment overrides are not written back. Returns the file path, or
/// `None` when `args` carries nothing to save.
pub fn save(args: &ConfigArgs) -> Result<Option<PathBuf>> {
    if !args.has_updates() {
        return Ok(None);
    }

    let mut config = Config::stored()?;
    if let Some(api_url) = &args.api_url {
        config.api_url = api_url.trim_end_matches('/').to_string();
    }
    if let Some(api_key) = &args.api_key {
        config.api_key.clone_from(api_key);
    }
    if let Some(account_id) = &args.account_id {
        config.account_id.clone_from(account_id);
    }
    config.save()?;
    log::info!("Saved config to {}", Config::config_path()?.display());

    Config::config_path().map(Some)
}

/// Print the merged file + environment config with the API key redacted.
pub fn show() -> Result<()> {
    let config = Config::load()?;
    println!("{}", render(&config)?);
    println!("config dir: {}", Config::config_dir()?.display());
    Ok(())
}

fn render(config: &Config) -> Result<String> {
    Ok(serde_json::to_string_pretty(&config.redacted())?)
}
