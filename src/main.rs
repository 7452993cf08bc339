use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use viewfleet::datetime_utils::{now_utc, run_log_filename};

mod commands;

#[derive(Parser, Debug)]
#[command(
    name = "viewfleet",
    version,
    about = "Fan out channel views across a pool of accounts",
    long_about = "Watches target channels for new posts and marks them viewed (and optionally reacts) from every account in a session pool"
)]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, default_value = "config.json", global = true)]
    config: PathBuf,

    /// CSV file with one account per row: phone,api_id,api_hash,session_string
    #[arg(short, long, default_value = "sessions.csv", global = true)]
    sessions: PathBuf,

    /// Directory for the watermark and summary files
    #[arg(short, long, env = "VIEWFLEET_DATA_DIR", default_value = ".", global = true)]
    data_dir: PathBuf,

    /// Base URL of the session gateway
    #[arg(
        short,
        long,
        env = "VIEWFLEET_GATEWAY_URL",
        default_value = "http://127.0.0.1:8080/",
        global = true
    )]
    gateway_url: String,

    /// Also write logs to a timestamped file in this directory
    #[arg(long, env = "VIEWFLEET_LOG_DIR", global = true)]
    log_dir: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Watch the configured channels and dispatch views for new posts
    Monitor {
        /// Plan and log every action without sending it
        #[arg(long)]
        dry_run: bool,

        /// Run a single pass over the channels, then exit
        #[arg(long)]
        once: bool,

        /// Serve a keep-alive endpoint on this port
        #[arg(long, env = "VIEWFLEET_HEALTH_PORT")]
        health_port: Option<u16>,
    },

    /// Connect every session once and report which are still authorized
    CheckSessions,

    /// Join a channel with every account
    Join {
        /// Channel username (with or without @) or numeric id
        #[arg(required = true)]
        channel: String,
    },

    /// Send one direct message from every account
    Message {
        /// Recipient username (with or without @)
        #[arg(required = true)]
        username: String,

        /// Message text
        #[arg(required = true)]
        text: String,
    },
}

fn open_log_file(dir: &Path) -> Result<File> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
    let path = dir.join(run_log_filename(&now_utc()));
    File::create(&path).with_context(|| format!("Failed to create log file {}", path.display()))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv().ok();

    let args = Cli::parse();

    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if args.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    let file_layer = match &args.log_dir {
        Some(dir) => Some(
            fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(open_log_file(dir)?)),
        ),
        None => None,
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    if args.verbose {
        debug!("Verbose mode enabled");
    }

    if !args.data_dir.exists() {
        fs::create_dir_all(&args.data_dir).context("Failed to create data directory")?;
        info!(
            "Created data directory: {path}",
            path = args.data_dir.display()
        );
    }

    match args.command {
        Commands::Monitor {
            dry_run,
            once,
            health_port,
        } => {
            commands::monitor::execute(commands::monitor::MonitorOptions {
                config_path: &args.config,
                sessions_path: &args.sessions,
                data_dir: &args.data_dir,
                gateway_url: &args.gateway_url,
                dry_run,
                once,
                health_port,
            })
            .await?
        }
        Commands::CheckSessions => {
            commands::check_sessions::execute(&args.sessions, &args.gateway_url).await?
        }
        Commands::Join { channel } => {
            commands::join_channel::execute(&channel, &args.sessions, &args.gateway_url).await?
        }
        Commands::Message { username, text } => {
            commands::send_message::execute(&username, &text, &args.sessions, &args.gateway_url)
                .await?
        }
    }

    Ok(())
}
