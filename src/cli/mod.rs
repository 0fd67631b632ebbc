use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub mod config;
pub mod replay;
pub mod status;
pub mod version;

use config::{default_config_path, LoggingConfig, TimefundConfig};

#[derive(Parser)]
#[command(name = "timefund")]
#[command(author = "TimeFund Project")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Operator CLI for TimeFund custodial time-lock funds", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a default configuration file
    Init {
        /// Path to config file (default: ~/.config/timefund/config.toml)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Identity allowed to create milestones
        #[arg(long)]
        proposer: String,

        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Apply a JSON-lines log of authenticated calls
    Replay {
        /// Path to config file (default: ~/.config/timefund/config.toml)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Call log, one JSON call per line
        #[arg(long)]
        calls: PathBuf,

        /// Continue from an existing snapshot instead of a new fund
        #[arg(long)]
        resume: Option<PathBuf>,

        /// Write the final fund state to this snapshot file
        #[arg(long)]
        snapshot: Option<PathBuf>,
    },

    /// Show fund status from a snapshot
    Status {
        /// Snapshot file (default: ~/.local/share/timefund/fund.cbor)
        #[arg(long)]
        snapshot: Option<PathBuf>,

        /// Evaluate voting power and emergency expiry at this time
        #[arg(long)]
        at: Option<u64>,

        /// Only show events by this identity
        #[arg(long)]
        actor: Option<String>,

        /// Number of recent events to show
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Display version information
    Version,
}

/// Install the tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_logging(logging: &LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let installed = match &logging.file {
        Some(path) => {
            let file = open_log_file(path)?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
        None => builder.with_writer(std::io::stderr).try_init(),
    };
    installed.map_err(|e| format!("Failed to initialize logging: {}", e))?;

    Ok(())
}

fn open_log_file(path: &Path) -> Result<std::fs::File, Box<dyn std::error::Error>> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create log directory: {}", e))?;
    }
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| format!("Failed to open log file '{}': {}", path.display(), e))?;
    Ok(file)
}

pub fn execute(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Init {
            config,
            proposer,
            force,
        } => {
            let path = config.unwrap_or_else(default_config_path);
            if path.exists() && !force {
                return Err(format!(
                    "Config file '{}' already exists (use --force to overwrite)",
                    path.display()
                )
                .into());
            }
            TimefundConfig::create_default(&path, &proposer)?;
            println!("Wrote default configuration to {}", path.display());
            Ok(())
        }
        Commands::Replay {
            config,
            calls,
            resume,
            snapshot,
        } => {
            let config = replay::resolve_config(config)?;
            init_logging(&config.logging)?;
            replay::execute(config, calls, resume, snapshot)
        }
        Commands::Status {
            snapshot,
            at,
            actor,
            limit,
        } => {
            init_logging(&LoggingConfig::default())?;
            status::execute(snapshot, at, actor, limit)
        }
        Commands::Version => {
            version::execute();
            Ok(())
        }
    }
}
