use rand::Rng;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::account::{AccountPool, LifecycleState};
use crate::channel::ChannelTarget;
use crate::lifecycle::authorize;
use crate::pacing::{flood_backoff, sleep_or_cancel};
use crate::session::SessionError;

/// Flood waits at or above this are not worth sitting out for a join
const MAX_JOIN_FLOOD_WAIT_SECS: u64 = 300;

/// Pause bounds between consecutive accounts, in seconds
const JOIN_DELAY_SECS: (f64, f64) = (3.0, 8.0);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JoinReport {
    pub joined: usize,
    pub failed: usize,
}

impl JoinReport {
    /// Percentage of attempted accounts that joined
    pub fn success_rate(&self) -> f64 {
        let attempted = self.joined + self.failed;
        if attempted == 0 {
            return 0.0;
        }
        self.joined as f64 / attempted as f64 * 100.0
    }
}

/// Join `target` with every account in the pool, one account at a time
pub async fn bulk_join(
    pool: &mut AccountPool,
    target: &ChannelTarget,
    cancel: &CancellationToken,
) -> JoinReport {
    let mut report = JoinReport::default();
    let total = pool.len();

    for (position, account) in pool.accounts_mut().iter_mut().enumerate() {
        if cancel.is_cancelled() {
            break;
        }
        info!(
            "[{n}/{total}] Joining {target} with {phone}",
            n = position + 1,
            phone = account.phone()
        );

        // a flood wait on connect is sat out inside authorize; try once more after it
        let mut state = authorize(account, cancel).await;
        if state == LifecycleState::Connecting && !cancel.is_cancelled() {
            state = authorize(account, cancel).await;
        }
        if state != LifecycleState::Active {
            warn!("{phone} not authorized", phone = account.phone());
            report.failed += 1;
            continue;
        }

        let joined = match account.join(target, cancel).await {
            Ok(_) => true,
            Err(SessionError::FloodWait { seconds }) if seconds < MAX_JOIN_FLOOD_WAIT_SECS => {
                let resumed = flood_backoff(seconds, account.phone(), cancel).await;
                resumed && account.join(target, cancel).await.is_ok()
            }
            Err(e) => {
                warn!("{phone} failed to join: {e}", phone = account.phone());
                false
            }
        };

        if joined {
            info!("{phone} joined successfully", phone = account.phone());
            report.joined += 1;
        } else {
            report.failed += 1;
        }
        account.release().await;

        let delay = rand::rng().random_range(JOIN_DELAY_SECS.0..=JOIN_DELAY_SECS.1);
        if !sleep_or_cancel(Duration::from_secs_f64(delay), cancel).await {
            break;
        }
    }

    info!(
        "Join results: {joined} successful, {failed} failed, success rate {rate:.1}%",
        joined = report.joined,
        failed = report.failed,
        rate = report.success_rate()
    );
    report
}
