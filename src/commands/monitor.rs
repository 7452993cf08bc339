use anyhow::{bail, Context, Result};
use std::path::Path;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use viewfleet::account::AccountPool;
use viewfleet::config::load_config;
use viewfleet::credentials::load_credentials;
use viewfleet::gateway::GatewaySessionFactory;
use viewfleet::health::{bind_health, serve_health};
use viewfleet::monitor::{run_to_completion, MonitorExit, MonitorLoop};
use viewfleet::summary::{SummaryReporter, SUMMARY_FILE};
use viewfleet::watermark::{ChannelWatermarkStore, WATERMARK_FILE};

/// Options for the monitor command
pub struct MonitorOptions<'a> {
    pub config_path: &'a Path,
    pub sessions_path: &'a Path,
    pub data_dir: &'a Path,
    pub gateway_url: &'a str,
    pub dry_run: bool,
    pub once: bool,
    pub health_port: Option<u16>,
}

pub async fn execute(options: MonitorOptions<'_>) -> Result<()> {
    let mut config = load_config(options.config_path);
    if options.dry_run {
        config.dry_run = true;
    }
    if options.once {
        config.continuous_monitoring = false;
    }

    if config.target_channels.is_empty() {
        bail!("No target channels specified in configuration");
    }

    let credentials = load_credentials(options.sessions_path)?;
    if credentials.is_empty() {
        bail!(
            "No sessions found in {path}",
            path = options.sessions_path.display()
        );
    }

    let watermarks = ChannelWatermarkStore::load(options.data_dir.join(WATERMARK_FILE))
        .context("Failed to load channel watermarks")?;
    let factory = GatewaySessionFactory::new(options.gateway_url)?;
    let pool = AccountPool::open(credentials, &factory, &config);

    if config.dry_run {
        info!("Dry run: no views or reactions will be sent");
    }

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        let _ = signal::ctrl_c().await;
        info!("Received shutdown signal (Ctrl+C)");
        signal_token.cancel();
    });

    if let Some(port) = options.health_port {
        let listener = bind_health(port).await?;
        let health_token = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = serve_health(listener, health_token).await {
                error!("Health endpoint stopped: {e:#}");
            }
        });
    }

    let reporter = SummaryReporter::new(options.data_dir.join(SUMMARY_FILE));
    let monitor = MonitorLoop::new(config, pool, watermarks, cancel);
    let (result, _) = run_to_completion(monitor, &reporter).await;

    match result? {
        MonitorExit::Cancelled => info!("Monitor shutdown complete"),
        MonitorExit::PassComplete => info!("Single monitoring pass complete"),
    }
    Ok(())
}
