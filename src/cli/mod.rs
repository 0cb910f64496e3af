//! CLI module: command parsing and dispatch
//!
//! All CLI logic lives here. `main.rs` calls `cli::run()`.

pub mod config;
pub mod plan;

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};

use plugwarden::config::Config;

#[derive(Parser)]
#[command(name = "plugwarden")]
#[command(version)]
#[command(about = "Plugin lifecycle orchestrator", long_about = None)]
struct Cli {
    /// Config file (defaults to ~/.plugwarden/config.json)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the initialization order of the configured plugins
    Plan,
    /// Inspect and validate the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Show version information
    Version,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Validate the configuration file
    Check,
    /// Print the effective configuration (file plus env overrides)
    Show,
}

/// Config path chosen on the command line, or the default location.
fn config_path(explicit: Option<&Path>) -> PathBuf {
    explicit.map(Path::to_path_buf).unwrap_or_else(Config::path)
}

/// Entry point for the CLI, called from main().
pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let path = config_path(cli.config.as_deref());

    // Respect the logging section when the config loads; fall back to
    // defaults so `config check` can still report a broken file.
    let logging_cfg = Config::load_from_path(&path)
        .map(|c| c.logging)
        .unwrap_or_default();
    if let Err(e) = plugwarden::utils::logging::init_logging(&logging_cfg) {
        eprintln!("Warning: {}", e);
    }

    match cli.command {
        None => {
            let mut cmd = Cli::command();
            cmd.print_help()?;
            println!();
        }
        Some(Commands::Version) => {
            cmd_version();
        }
        Some(Commands::Plan) => {
            plan::cmd_plan(&path).await?;
        }
        Some(Commands::Config { action }) => {
            config::cmd_config(action, &path).await?;
        }
    }

    Ok(())
}

/// Display version information
fn cmd_version() {
    println!("plugwarden {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Plugin lifecycle orchestrator");
}
