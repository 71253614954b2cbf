mod cmd;
mod output;

use clap::{Parser, Subcommand};
use cmd::config::ConfigSubcommand;
use ordersync_core::config::Config;
use ordersync_core::OrderId;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "ordersync",
    about = "Detect, report and repair order status drift between the order store and its tracking cache",
    version,
    propagate_version = true
)]
struct Cli {
    /// Config file (default: ./ordersync.yaml)
    #[arg(long, global = true, env = "ORDERSYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a starter config and an empty order seed file
    Init,

    /// Inspect and validate the configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },

    /// Compare every order against its mirror (read-only)
    Check {
        /// Exit non-zero when any discrepancy is found
        #[arg(long)]
        strict: bool,
    },

    /// Overwrite one order's mirror with its authoritative status
    Repair { id: OrderId },

    /// Overwrite every mirror entry with its authoritative status
    RepairAll,

    /// Copy one order's mirrored status back into the order store
    SyncFromMirror { id: OrderId },

    /// Create a mirror entry for an order that has none
    CreateMirror { id: OrderId },

    /// Show the mirror's status history for one order
    History { id: OrderId },

    /// Show mirror totals by status
    Stats,

    /// Run the administrative HTTP server
    Serve {
        /// Port to listen on (default: server.port from config)
        #[arg(long)]
        port: Option<u16>,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Serve { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.unwrap_or_else(Config::default_path);

    let result = match cli.command {
        Commands::Init => cmd::init::run(&config_path),
        Commands::Config { subcommand } => cmd::config::run(&config_path, subcommand, cli.json),
        Commands::Check { strict } => cmd::check::run(&config_path, strict, cli.json),
        Commands::Repair { id } => cmd::repair::repair(&config_path, id, cli.json),
        Commands::RepairAll => cmd::repair::repair_all(&config_path, cli.json),
        Commands::SyncFromMirror { id } => cmd::repair::sync_from_mirror(&config_path, id, cli.json),
        Commands::CreateMirror { id } => cmd::repair::create_mirror(&config_path, id, cli.json),
        Commands::History { id } => cmd::tracking::history(&config_path, id, cli.json),
        Commands::Stats => cmd::tracking::stats(&config_path, cli.json),
        Commands::Serve { port } => cmd::serve::run(&config_path, port),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
