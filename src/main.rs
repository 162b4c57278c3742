//! AhaSend CLI - stream webhook and route events from the terminal.
//!
//! This is the main binary entry point. See the `ahasend` library for the
//! core functionality.

use ahasend::{commands, constants::VERSION, env::Environment};
use anyhow::Result;
use clap::{Parser, Subcommand};
use mimalloc::MiMalloc;
use tokio_util::sync::CancellationToken;

/// Global allocator configured per M-MIMALLOC-APPS guideline.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

// CLI
#[derive(Parser)]
#[command(name = "ahasend")]
#[command(version = VERSION)]
#[command(about = "AhaSend command line tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream events live to the terminal
    Listen {
        #[command(subcommand)]
        stream: ListenCommand,
    },
    /// Show the effective configuration, saving any values given
    Config(commands::ConfigArgs),
}

#[derive(Subcommand)]
enum ListenCommand {
    /// Stream webhook events
    Webhooks(commands::WebhookArgs),
    /// Stream inbound route messages
    Routes(commands::RouteArgs),
}

/// Log to stderr, or to `AHASEND_LOG_FILE` so logs never interleave with events.
fn init_logging() {
    let default_filter = Environment::current().default_log_filter();
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter));
    builder.format_timestamp_secs();

    if let Some(path) = ahasend::env::log_file() {
        match std::fs::File::create(&path) {
            Ok(file) => {
                builder.target(env_logger::Target::Pipe(Box::new(file)));
            }
            Err(e) => eprintln!("warning: cannot open log file {}: {e}", path.display()),
        }
    }

    builder.init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();

    match cli.command {
        Commands::Listen { stream } => {
            // Validate flags before touching config or the network.
            let options = match &stream {
                ListenCommand::Webhooks(args) => commands::webhook_options(args)?,
                ListenCommand::Routes(args) => commands::route_options(args)?,
            };

            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            ctrlc::set_handler(move || on_signal.cancel())?;

            log::info!("ahasend v{VERSION} listening ({})", Environment::current());
            commands::run_listen(options, cancel).await?;
        }
        Commands::Config(args) => {
            commands::config::run(&args)?;
        }
    }

    Ok(())
}
