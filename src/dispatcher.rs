use backoff::backoff::Backoff;
use backoff::ExponentialBackoffBuilder;
use futures_util::future::join_all;
use rand::seq::{index, IndexedRandom};
use rand::Rng;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::account::{Account, AccountPool};
use crate::channel::ChannelTarget;
use crate::config::Config;
use crate::lifecycle::{observe_failure, FailureOutcome};
use crate::pacing::{flood_backoff, jitter, sleep_or_cancel};
use crate::session::{ChannelEntity, SessionError};

/// One engagement action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Mark every listed item viewed in a single call
    View { item_ids: Vec<u64> },
    React { item_id: u64, emoji: String },
}

/// An action assigned to one account (by pool index) on one channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub account: usize,
    pub channel: String,
    pub action: Action,
}

/// The tasks generated for one set of newly discovered items
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskBatch {
    tasks: Vec<Task>,
}

impl TaskBatch {
    /// Plan the batch for `item_ids` across the `eligible` accounts.
    ///
    /// Every eligible account gets exactly one view task covering all items.
    /// With reactions enabled, each item independently gets reactions from
    /// `min(max_reactions_per_post, eligible)` distinct accounts, each with a
    /// uniformly chosen emoji.
    pub fn plan<R: Rng>(
        target: &ChannelTarget,
        item_ids: &[u64],
        eligible: &[usize],
        config: &Config,
        rng: &mut R,
    ) -> Self {
        let mut tasks = Vec::new();
        if item_ids.is_empty() || eligible.is_empty() {
            return Self { tasks };
        }

        let channel = target.watermark_key().to_string();
        for &account in eligible {
            tasks.push(Task {
                account,
                channel: channel.clone(),
                action: Action::View {
                    item_ids: item_ids.to_vec(),
                },
            });
        }

        if config.enable_reactions && !config.available_reactions.is_empty() {
            let per_item = config.max_reactions_per_post.min(eligible.len());
            for &item_id in item_ids {
                for picked in index::sample(rng, eligible.len(), per_item) {
                    let Some(emoji) = config.available_reactions.choose(rng) else {
                        continue;
                    };
                    tasks.push(Task {
                        account: eligible[picked],
                        channel: channel.clone(),
                        action: Action::React {
                            item_id,
                            emoji: emoji.clone(),
                        },
                    });
                }
            }
        }

        Self { tasks }
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Tasks for one account, views first
    pub fn tasks_for(&self, account: usize) -> Vec<&Task> {
        let mut tasks: Vec<&Task> = self.tasks.iter().filter(|t| t.account == account).collect();
        tasks.sort_by_key(|t| matches!(t.action, Action::React { .. }));
        tasks
    }

    pub fn reaction_count(&self) -> usize {
        self.tasks
            .iter()
            .filter(|t| matches!(t.action, Action::React { .. }))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// Outcome of one dispatched batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub accounts: usize,
    pub views_ok: usize,
    pub views_failed: usize,
    pub reactions_ok: usize,
    pub reactions_failed: usize,
    pub deactivated: Vec<String>,
    pub excluded: Vec<String>,
    /// At least one task was started (or simulated)
    pub attempted: bool,
    pub cancelled: bool,
}

impl BatchReport {
    /// Whether the batch's items count as handled for watermark purposes
    pub fn dispatched(&self) -> bool {
        self.attempted || self.accounts == 0
    }
}

#[derive(Debug, Default)]
struct AccountOutcome {
    phone: String,
    views_ok: usize,
    views_failed: usize,
    reactions_ok: usize,
    reactions_failed: usize,
    attempted: bool,
    cancelled: bool,
    failure: Option<FailureOutcome>,
}

impl AccountOutcome {
    fn count(&mut self, action: &Action, ok: bool) {
        match (action, ok) {
            (Action::View { .. }, true) => self.views_ok += 1,
            (Action::View { .. }, false) => self.views_failed += 1,
            (Action::React { .. }, true) => self.reactions_ok += 1,
            (Action::React { .. }, false) => self.reactions_failed += 1,
        }
    }
}

/// Fans out view and reaction tasks across the active accounts
pub struct Dispatcher<'a> {
    config: &'a Config,
    cancel: &'a CancellationToken,
}

impl<'a> Dispatcher<'a> {
    pub fn new(config: &'a Config, cancel: &'a CancellationToken) -> Self {
        Self { config, cancel }
    }

    /// Dispatch a batch for `item_ids` and wait for every task to finish.
    ///
    /// Accounts run concurrently; the tasks of a single account run in order
    /// through its own session.
    pub async fn dispatch(
        &self,
        target: &ChannelTarget,
        item_ids: &[u64],
        pool: &mut AccountPool,
    ) -> BatchReport {
        let eligible: Vec<usize> = pool
            .accounts()
            .iter()
            .enumerate()
            .filter(|(_, account)| account.is_active() && !account.is_banned_from(target))
            .map(|(index, _)| index)
            .collect();

        let batch = TaskBatch::plan(target, item_ids, &eligible, self.config, &mut rand::rng());

        info!(
            "Processing {count} new posts for {target} with {accounts} accounts ({reactions} reactions planned){dry}",
            count = item_ids.len(),
            accounts = eligible.len(),
            reactions = batch.reaction_count(),
            dry = if self.config.dry_run { " [dry run]" } else { "" }
        );

        let runs = pool
            .accounts_mut()
            .iter_mut()
            .enumerate()
            .filter_map(|(index, account)| {
                let tasks = batch.tasks_for(index);
                if tasks.is_empty() {
                    return None;
                }
                Some(self.run_account(account, target, tasks))
            });
        let outcomes = join_all(runs).await;

        let mut report = BatchReport {
            accounts: eligible.len(),
            ..BatchReport::default()
        };
        for outcome in outcomes {
            report.views_ok += outcome.views_ok;
            report.views_failed += outcome.views_failed;
            report.reactions_ok += outcome.reactions_ok;
            report.reactions_failed += outcome.reactions_failed;
            report.attempted |= outcome.attempted;
            report.cancelled |= outcome.cancelled;
            match outcome.failure {
                Some(FailureOutcome::Deactivated) => report.deactivated.push(outcome.phone),
                Some(FailureOutcome::ChannelExcluded) => report.excluded.push(outcome.phone),
                Some(FailureOutcome::Continue) | None => {}
            }
        }

        info!(
            "Batch for {target} complete: views {views_ok} ok / {views_failed} failed, reactions {reactions_ok} ok / {reactions_failed} failed",
            views_ok = report.views_ok,
            views_failed = report.views_failed,
            reactions_ok = report.reactions_ok,
            reactions_failed = report.reactions_failed
        );
        report
    }

    async fn run_account(
        &self,
        account: &mut Account,
        target: &ChannelTarget,
        tasks: Vec<&Task>,
    ) -> AccountOutcome {
        let mut outcome = AccountOutcome {
            phone: account.phone().to_string(),
            ..AccountOutcome::default()
        };

        if self.cancel.is_cancelled() {
            outcome.cancelled = true;
            return outcome;
        }

        let mut entity = if self.config.dry_run {
            None
        } else {
            match account.channel_entity(target, self.cancel).await {
                Ok(entity) => Some(entity),
                Err(_) if self.cancel.is_cancelled() => {
                    outcome.cancelled = true;
                    return outcome;
                }
                Err(e) => {
                    warn!(
                        "Unable to access {target} with {phone}: {e}",
                        phone = outcome.phone
                    );
                    outcome.attempted = true;
                    if let SessionError::FloodWait { seconds } = e {
                        flood_backoff(seconds, &outcome.phone, self.cancel).await;
                    }
                    for task in &tasks {
                        outcome.count(&task.action, false);
                    }
                    outcome.failure = Some(observe_failure(account, Some(target), &e).await);
                    return outcome;
                }
            }
        };

        for task in tasks {
            if self.cancel.is_cancelled() {
                outcome.cancelled = true;
                break;
            }
            if matches!(task.action, Action::React { .. }) {
                let delay = jitter(self.config, &mut rand::rng());
                if !sleep_or_cancel(delay, self.cancel).await {
                    outcome.cancelled = true;
                    break;
                }
            }

            outcome.attempted = true;
            let result = match &entity {
                Some(entity) => self.perform(account, entity, &task.action).await,
                None => Ok(()),
            };

            match result {
                Ok(()) => {
                    outcome.count(&task.action, true);
                    self.record_success(account, target, &task.action);
                }
                Err(_) if self.cancel.is_cancelled() => {
                    outcome.count(&task.action, false);
                    outcome.cancelled = true;
                    break;
                }
                Err(e) => {
                    outcome.count(&task.action, false);
                    warn!(
                        "{action} by {phone} in {target} failed: {e}",
                        action = describe(&task.action),
                        phone = outcome.phone
                    );
                    let failure = observe_failure(account, Some(target), &e).await;
                    if failure != FailureOutcome::Continue {
                        outcome.failure = Some(failure);
                        break;
                    }
                    if e == SessionError::NotParticipant && entity.is_some() {
                        // membership was lost mid-batch; rejoin before the next task
                        match account.channel_entity(target, self.cancel).await {
                            Ok(fresh) => entity = Some(fresh),
                            Err(_) if self.cancel.is_cancelled() => {
                                outcome.cancelled = true;
                                break;
                            }
                            Err(e) => {
                                warn!(
                                    "Unable to regain access to {target} with {phone}: {e}",
                                    phone = outcome.phone
                                );
                                let failure = observe_failure(account, Some(target), &e).await;
                                if failure != FailureOutcome::Continue {
                                    outcome.failure = Some(failure);
                                }
                                break;
                            }
                        }
                    }
                }
            }
        }

        outcome
    }

    fn record_success(&self, account: &mut Account, target: &ChannelTarget, action: &Action) {
        let prefix = if self.config.dry_run { "[dry run] " } else { "" };
        match action {
            Action::View { item_ids } => {
                account.record_success(item_ids.len() as u64);
                info!(
                    "{prefix}{phone} viewed posts {item_ids:?} in {target}",
                    phone = account.phone()
                );
            }
            Action::React { item_id, emoji } => {
                account.record_reaction();
                info!(
                    "{prefix}{phone} reacted {emoji} to post {item_id} in {target}",
                    phone = account.phone()
                );
            }
        }
    }

    /// Issue one action, retrying transient failures with exponential backoff
    /// and flood waits after the advised suspension, up to `max_retries`
    /// attempts in total
    async fn perform(
        &self,
        account: &mut Account,
        entity: &ChannelEntity,
        action: &Action,
    ) -> Result<(), SessionError> {
        let mut backoff = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_secs(1))
            .with_max_interval(Duration::from_secs(60))
            .with_multiplier(2.0)
            .with_max_elapsed_time(Some(Duration::from_secs(300)))
            .build();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let result = match action {
                Action::View { item_ids } => {
                    account.mark_viewed(entity, item_ids, self.cancel).await
                }
                Action::React { item_id, emoji } => {
                    account.react(entity, *item_id, emoji, self.cancel).await
                }
            };
            let error = match result {
                Ok(()) => return Ok(()),
                Err(error) => error,
            };
            let retries_left = attempt < self.config.max_retries;

            match &error {
                SessionError::FloodWait { seconds } => {
                    let resumed = flood_backoff(*seconds, account.phone(), self.cancel).await;
                    if !resumed || !retries_left {
                        return Err(error);
                    }
                }
                SessionError::Transient(message) if retries_left => {
                    let Some(delay) = backoff.next_backoff() else {
                        return Err(error);
                    };
                    debug!(
                        "Transient error for {phone} ({message}), retry {attempt} in {delay:?}",
                        phone = account.phone()
                    );
                    if !sleep_or_cancel(delay, self.cancel).await {
                        return Err(error);
                    }
                }
                SessionError::Transient(_)
                | SessionError::Unauthorized
                | SessionError::NotParticipant
                | SessionError::Banned => return Err(error),
            }
        }
    }
}

fn describe(action: &Action) -> String {
    match action {
        Action::View { item_ids } => format!("View of {item_ids:?}"),
        Action::React { item_id, emoji } => format!("Reaction {emoji} on {item_id}"),
    }
}
