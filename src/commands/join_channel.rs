use anyhow::{bail, Result};
use std::path::Path;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;

use viewfleet::account::AccountPool;
use viewfleet::channel::ChannelTarget;
use viewfleet::config::Config;
use viewfleet::credentials::load_credentials;
use viewfleet::gateway::GatewaySessionFactory;
use viewfleet::join::bulk_join;

/// Join one channel with every account in the credential file
pub async fn execute(channel: &str, sessions_path: &Path, gateway_url: &str) -> Result<()> {
    let channel = channel.trim().trim_start_matches('@');
    if channel.is_empty() {
        bail!("No channel provided");
    }

    let credentials = load_credentials(sessions_path)?;
    let factory = GatewaySessionFactory::new(gateway_url)?;
    let mut pool = AccountPool::open(credentials, &factory, &Config::default());
    let target = ChannelTarget::new(channel);

    info!(
        "Joining {target} with {count} sessions",
        count = pool.len()
    );

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        let _ = signal::ctrl_c().await;
        signal_token.cancel();
    });

    let report = bulk_join(&mut pool, &target, &cancel).await;
    pool.release_all().await;

    if report.joined == 0 && report.failed > 0 {
        bail!("No account could join {target}");
    }
    Ok(())
}
