use anyhow::{bail, Result};
use std::path::Path;
use tokio::signal;
use tokio_util::sync::CancellationToken;

use viewfleet::account::AccountPool;
use viewfleet::broadcast::broadcast_message;
use viewfleet::config::Config;
use viewfleet::credentials::load_credentials;
use viewfleet::gateway::GatewaySessionFactory;

/// Send one direct message to `username` from every account in the credential file
pub async fn execute(
    username: &str,
    text: &str,
    sessions_path: &Path,
    gateway_url: &str,
) -> Result<()> {
    let username = username.trim().trim_start_matches('@');
    if username.is_empty() {
        bail!("No recipient provided");
    }
    let text = text.trim();
    if text.is_empty() {
        bail!("No message provided");
    }

    let credentials = load_credentials(sessions_path)?;
    let factory = GatewaySessionFactory::new(gateway_url)?;
    let mut pool = AccountPool::open(credentials, &factory, &Config::default());

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        let _ = signal::ctrl_c().await;
        signal_token.cancel();
    });

    let report = broadcast_message(&mut pool, username, text, &cancel).await;
    if report.sent == 0 && report.failed > 0 {
        bail!("No account could message @{username}");
    }
    Ok(())
}
