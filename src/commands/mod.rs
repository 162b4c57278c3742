//! CLI subcommand implementations for ahasend.
//!
//! - [`listen`] - Stream webhook or route events to the terminal
//! - [`config`] - Save and show the configuration
//!
//! # Usage
//!
//! Commands are invoked from the main CLI dispatcher:
//!
//! ```ignore
//! use ahasend::commands;
//!
//! let options = commands::listen::webhook_options(&args)?;
//! commands::listen::run(options, cancel).await?;
//! commands::config::run(&config_args)?;
//! ```

pub mod config;
pub mod listen;

#[doc(inline)]
pub use config::ConfigArgs;
#[doc(inline)]
pub use listen::{route_options, run as run_listen, webhook_options, RouteArgs, WebhookArgs};
