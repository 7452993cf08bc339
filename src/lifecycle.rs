use futures_util::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::account::{Account, AccountPool, LifecycleState};
use crate::channel::ChannelTarget;
use crate::pacing::flood_backoff;
use crate::session::SessionError;

/// What a failed remote call means for the account that issued it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Counted; the account stays in the pool
    Continue,
    /// The account is excluded from this one channel
    ChannelExcluded,
    /// The account left the pool for good
    Deactivated,
}

/// Record a failed remote call against `account` and apply the lifecycle
/// consequence of its kind. `target` is the channel the call concerned, if any.
pub async fn observe_failure(
    account: &mut Account,
    target: Option<&ChannelTarget>,
    error: &SessionError,
) -> FailureOutcome {
    account.record_error();

    match error {
        SessionError::FloodWait { .. } => FailureOutcome::Continue,
        SessionError::Transient(_) => FailureOutcome::Continue,
        SessionError::NotParticipant => {
            if let Some(target) = target {
                account.forget_entity(target);
            }
            FailureOutcome::Continue
        }
        // The platform only reports bans per channel, whichever call hit them;
        // account-wide revocation arrives as Unauthorized.
        SessionError::Banned => match target {
            Some(target) => {
                account.ban_from(target);
                FailureOutcome::ChannelExcluded
            }
            None => FailureOutcome::Continue,
        },
        SessionError::Unauthorized => {
            account.deactivate("authorization rejected by the platform").await;
            FailureOutcome::Deactivated
        }
    }
}

/// Connect one account and check its authorization.
///
/// Connecting → Active when authorized, → Deactivated when not. A failure that
/// leaves authorization undecided keeps the account in Connecting; a flood
/// wait is sat out here before returning so the caller cannot retry early.
pub async fn authorize(account: &mut Account, cancel: &CancellationToken) -> LifecycleState {
    if account.state() != LifecycleState::Connecting {
        return account.state();
    }

    match account.connect(cancel).await {
        Ok(true) => account.mark_active(),
        Ok(false) => {
            account.record_error();
            account.deactivate("session not authorized").await;
        }
        Err(_) if cancel.is_cancelled() => {}
        Err(e) => {
            warn!(
                "Failed to connect {phone}: {e}",
                phone = account.phone()
            );
            observe_failure(account, None, &e).await;
            if let SessionError::FloodWait { seconds } = e {
                flood_backoff(seconds, account.phone(), cancel).await;
            }
        }
    }

    account.state()
}

/// Try to bring every account still in Connecting online, concurrently
pub async fn connect_pending(pool: &mut AccountPool, cancel: &CancellationToken) {
    let pending: Vec<&mut Account> = pool
        .accounts_mut()
        .iter_mut()
        .filter(|account| account.state() == LifecycleState::Connecting)
        .collect();

    if pending.is_empty() {
        return;
    }

    let attempted = pending.len();
    join_all(pending.into_iter().map(|account| authorize(account, cancel))).await;

    info!(
        "Connected accounts: {active} active of {total} ({attempted} attempted this round)",
        active = pool.active_count(),
        total = pool.len()
    );
}
