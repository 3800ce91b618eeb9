//! rtlink - command-line client for the realtime event stream.
//!
//! Opens the shared realtime connection from the terminal: stream every
//! event the server pushes, send a single frame, or inspect the resolved
//! configuration. Useful for scripting and for debugging the server side.

mod commands;

use clap::{Parser, Subcommand};
use tracing::info;

use rt_core::config::{AppConfig, ConfigHandle};
use rt_core::error::RtResult;
use rt_core::logging;

/// rtlink - realtime event stream client.
#[derive(Parser)]
#[command(
    name = "rtlink",
    version,
    about = "Realtime event stream client",
    long_about = "A command-line client for the realtime WebSocket endpoint.\n\
                   Connects with a session token, keeps the connection alive and prints every event."
)]
struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format (text, json).
    #[arg(short = 'f', long, global = true, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// JSON output for scripting.
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect and print every event until Ctrl+C.
    Connect {
        /// Server address (overrides config).
        #[arg(short, long)]
        address: Option<String>,
        /// Session token (overrides config).
        #[arg(short, long)]
        token: Option<String>,
        /// Save the address and token to the config file.
        #[arg(long)]
        save: bool,
    },
    /// Connect, send one frame and disconnect.
    Send {
        /// Frame type, e.g. "im.message".
        #[arg(short = 'T', long = "type")]
        event_type: String,
        /// Frame payload as JSON.
        #[arg(short, long, default_value = "{}")]
        data: String,
        /// How long to wait for the connection to open.
        #[arg(long, default_value = "10000")]
        wait_ms: u64,
        /// Server address (overrides config).
        #[arg(short, long)]
        address: Option<String>,
        /// Session token (overrides config).
        #[arg(short, long)]
        token: Option<String>,
    },
    /// Show the resolved configuration and endpoint without connecting.
    Status,
}

#[tokio::main]
async fn main() -> RtResult<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match cli.config.as_deref() {
        Some(path) => AppConfig::load_from_file(std::path::Path::new(path))?,
        None => AppConfig::load_default()?,
    };

    // Initialize logging
    let log_dir = config
        .effective_log_dir()
        .unwrap_or_else(|_| std::path::PathBuf::from("logs"));
    let _guard = logging::init_logging(&config.logging, &log_dir, cli.verbose)?;

    let config_handle = ConfigHandle::new(config);

    info!("rtlink v{}", rt_core::constants::APP_VERSION);

    match cli.command {
        Commands::Connect { address, token, save } => {
            commands::connect::run(config_handle, address, token, save, cli.format).await
        }
        Commands::Send {
            event_type,
            data,
            wait_ms,
            address,
            token,
        } => {
            commands::send::run(
                config_handle,
                commands::send::SendArgs {
                    event_type,
                    data,
                    wait_ms,
                    address,
                    token,
                },
                cli.format,
            )
            .await
        }
        Commands::Status => commands::status::run(config_handle, cli.format).await,
    }
}
