// Config file + environment variable handling.
// Run with: cargo test --test config_test
//
// Tests mutate process-wide env vars, so they serialise on ENV_LOCK.

use std::env;
use std::sync::Mutex;

use ahasend::Config;
use tempfile::TempDir;

static ENV_LOCK: Mutex<()> = Mutex::new(());

const VARS: &[&str] = &[
    "AHASEND_CONFIG_DIR",
    "AHASEND_API_URL",
    "AHASEND_API_KEY",
    "AHASEND_ACCOUNT_ID",
];

/// Points the config dir at a temp directory and clears overrides.
struct EnvGuard {
    _dir: TempDir,
}

impl EnvGuard {
    fn new() -> Self {
        for var in VARS {
            env::remove_var(var);
        }
        let dir = TempDir::new().unwrap();
        env::set_var("AHASEND_CONFIG_DIR", dir.path());
        Self { _dir: dir }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for var in VARS {
            env::remove_var(var);
        }
    }
}

#[test]
fn test_load_without_file_uses_defaults() {
    let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let _guard = EnvGuard::new();

    let config = Config::load().unwrap();
    assert_eq!(config.api_url, "https://api.ahasend.com");
    assert!(config.api_key.is_empty());
    assert!(config.require_credentials().is_err());
}

#[test]
fn test_save_then_load_round_trip() {
    let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let _guard = EnvGuard::new();

    let config = Config {
        api_url: "http://localhost:8080".to_string(),
        api_key: "aha-sk-file".to_string(),
        account_id: "acc-file".to_string(),
    };
    config.save().unwrap();

    let loaded = Config::load().unwrap();
    assert_eq!(loaded.api_url, "http://localhost:8080");
    assert_eq!(loaded.api_key, "aha-sk-file");
    assert_eq!(loaded.account_id, "acc-file");
}

#[cfg(unix)]
#[test]
fn test_saved_file_is_owner_only() {
    use std::os::unix::fs::PermissionsExt;

    let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let _guard = EnvGuard::new();

    Config::default().save().unwrap();
    let path = Config::config_dir().unwrap().join("config.json");
    let mode = std::fs::metadata(path).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
}

#[test]
fn test_env_overrides_file() {
    let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let _guard = EnvGuard::new();

    Config {
        api_url: "http://from-file".to_string(),
        api_key: "file-key".to_string(),
        account_id: "file-account".to_string(),
    }
    .save()
    .unwrap();

    env::set_var("AHASEND_API_KEY", "env-key");
    env::set_var("AHASEND_ACCOUNT_ID", "env-account");

    let config = Config::load().unwrap();
    assert_eq!(config.api_url, "http://from-file");
    assert_eq!(config.api_key, "env-key");
    assert_eq!(config.account_id, "env-account");
    assert!(config.require_credentials().is_ok());
}

#[test]
fn test_corrupt_file_falls_back_to_defaults() {
    let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let _guard = EnvGuard::new();

    let path = Config::config_dir().unwrap().join("config.json");
    std::fs::write(path, "{ not json").unwrap();
    env::set_var("AHASEND_API_URL", "http://env-only");

    let config = Config::load().unwrap();
    assert_eq!(config.api_url, "http://env-only");
    assert!(config.api_key.is_empty());
}

#[test]
fn test_config_command_saves_only_given_values() {
    use ahasend::commands::config::{save, ConfigArgs};

    let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let _guard = EnvGuard::new();

    Config {
        api_url: "http://from-file".to_string(),
        api_key: "file-key".to_string(),
        account_id: "file-account".to_string(),
    }
    .save()
    .unwrap();
    // Environment values must not leak into the file.
    env::set_var("AHASEND_API_URL", "http://from-env");

    let args = ConfigArgs {
        api_key: Some("new-key".to_string()),
        ..ConfigArgs::default()
    };
    let path = save(&args).unwrap().unwrap();
    assert_eq!(path, Config::config_path().unwrap());

    let stored = Config::stored().unwrap();
    assert_eq!(stored.api_url, "http://from-file");
    assert_eq!(stored.api_key, "new-key");
    assert_eq!(stored.account_id, "file-account");
}

#[test]
fn test_config_command_refuses_to_overwrite_corrupt_file() {
    use ahasend::commands::config::{save, ConfigArgs};

    let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let _guard = EnvGuard::new();

    let path = Config::config_path().unwrap();
    std::fs::write(&path, "{ not json").unwrap();

    let args = ConfigArgs {
        account_id: Some("acc-1".to_string()),
        ..ConfigArgs::default()
    };
    assert!(save(&args).is_err());
    assert_eq!(std::fs::read_to_string(path).unwrap(), "{ not json");
}
