//! Runtime environment and logging setup inputs.
//!
//! `AHASEND_ENV` selects the environment:
//!
//! | value                | effect                                         |
//! |----------------------|------------------------------------------------|
//! | `test`               | config lives in the repo's `tmp/` directory    |
//! | `development`, `dev` | `debug` default log filter                     |
//! | anything else, unset | production: `warn` default log filter          |
//!
//! `RUST_LOG` always wins over the default filter. `AHASEND_LOG_FILE`
//! redirects logs away from stderr so they never interleave with events.

use std::path::PathBuf;

/// Variable selecting the [`Environment`].
pub const ENV_VAR: &str = "AHASEND_ENV";

/// Variable naming a log file.
pub const LOG_FILE_VAR: &str = "AHASEND_LOG_FILE";

/// Runtime environment for the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    /// Released binary.
    #[default]
    Production,
    /// Local development, verbose logging.
    Development,
    /// Integration tests driving the binary.
    Test,
}

impl Environment {
    /// Read `AHASEND_ENV`.
    #[must_use]
    pub fn current() -> Self {
        Self::from_value(std::env::var(ENV_VAR).ok().as_deref())
    }

    /// Interpret a raw `AHASEND_ENV` value.
    #[must_use]
    pub fn from_value(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some("test") => Self::Test,
            Some("development" | "dev") => Self::Development,
            _ => Self::Production,
        }
    }

    /// `true` for [`Environment::Test`].
    #[must_use]
    pub fn is_test(self) -> bool {
        self == Self::Test
    }

    /// `env_logger` filter used when `RUST_LOG` is unset.
    #[must_use]
    pub fn default_log_filter(self) -> &'static str {
        match self {
            Self::Development => "debug",
            Self::Test | Self::Production => "warn",
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Production => "production",
            Self::Development => "development",
            Self::Test => "test",
        })
    }
}

/// `AHASEND_ENV=test`.
#[must_use]
pub fn is_test_mode() -> bool {
    Environment::current().is_test()
}

/// Log file requested through `AHASEND_LOG_FILE`, if any.
#[must_use]
pub fn log_file() -> Option<PathBuf> {
    std::env::var_os(LOG_FILE_VAR)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}
