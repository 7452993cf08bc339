use futures_util::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::account::{Account, AccountPool};
use crate::lifecycle::{connect_pending, observe_failure};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub sent: usize,
    pub failed: usize,
}

/// Send `text` to `recipient` from every account in the pool at once.
///
/// Accounts that fail authorization (including a second-factor lock) are
/// deactivated and counted as failed; every session is released afterwards.
pub async fn broadcast_message(
    pool: &mut AccountPool,
    recipient: &str,
    text: &str,
    cancel: &CancellationToken,
) -> BroadcastReport {
    info!(
        "Sending to @{recipient} from {count} sessions",
        count = pool.len()
    );
    connect_pending(pool, cancel).await;

    let sends = pool
        .accounts_mut()
        .iter_mut()
        .filter(|account| account.is_active())
        .map(|account| send_one(account, recipient, text, cancel));
    let results = join_all(sends).await;

    let sent = results.iter().filter(|&&ok| ok).count();
    let report = BroadcastReport {
        sent,
        failed: pool.len() - sent,
    };
    pool.release_all().await;

    info!("Total successful messages: {sent}", sent = report.sent);
    report
}

async fn send_one(
    account: &mut Account,
    recipient: &str,
    text: &str,
    cancel: &CancellationToken,
) -> bool {
    match account.send_message(recipient, text, cancel).await {
        Ok(()) => {
            account.record_success(1);
            info!("Sent from {phone}", phone = account.phone());
            true
        }
        Err(_) if cancel.is_cancelled() => false,
        Err(e) => {
            warn!("Error with {phone}: {e}", phone = account.phone());
            observe_failure(account, None, &e).await;
            false
        }
    }
}
