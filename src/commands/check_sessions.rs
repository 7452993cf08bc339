use anyhow::Result;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use viewfleet::account::{AccountPool, LifecycleState};
use viewfleet::config::Config;
use viewfleet::credentials::load_credentials;
use viewfleet::gateway::GatewaySessionFactory;
use viewfleet::lifecycle::connect_pending;

/// Connect every session once and report which are still authorized
pub async fn execute(sessions_path: &Path, gateway_url: &str) -> Result<()> {
    let credentials = load_credentials(sessions_path)?;
    let factory = GatewaySessionFactory::new(gateway_url)?;
    let mut pool = AccountPool::open(credentials, &factory, &Config::default());

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        signal_token.cancel();
    });

    info!("Session validity check");
    connect_pending(&mut pool, &cancel).await;

    let mut ok = 0;
    let mut failed = 0;
    for account in pool.accounts() {
        match account.state() {
            LifecycleState::Active | LifecycleState::RateLimited => {
                info!("✅ {phone}", phone = account.phone());
                ok += 1;
            }
            LifecycleState::Connecting | LifecycleState::Deactivated => {
                warn!(
                    "❌ {phone} ({state})",
                    phone = account.phone(),
                    state = account.state()
                );
                failed += 1;
            }
        }
    }

    pool.release_all().await;
    info!("Sessions working: {ok}, invalid/expired: {failed}");
    Ok(())
}
