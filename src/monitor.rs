use rand::seq::IndexedRandom;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::account::AccountPool;
use crate::channel::ChannelTarget;
use crate::config::{CheckerSelection, Config};
use crate::dispatcher::{BatchReport, Dispatcher};
use crate::lifecycle::connect_pending;
use crate::pacing::{jitter, sleep_or_cancel};
use crate::poller::Poller;
use crate::summary::{MonitorStats, SummaryReporter};
use crate::watermark::ChannelWatermarkStore;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("no target channels configured")]
    NoTargetChannels,

    #[error("no usable accounts left in the pool")]
    PoolExhausted,
}

/// Why the monitor loop returned normally
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorExit {
    /// The stop signal fired
    Cancelled,
    /// Continuous monitoring is off and the single pass finished
    PassComplete,
}

/// Drives poll → dispatch → watermark commit over the configured channels
pub struct MonitorLoop {
    config: Config,
    targets: Vec<ChannelTarget>,
    pool: AccountPool,
    watermarks: ChannelWatermarkStore,
    cancel: CancellationToken,
    checker_cursor: usize,
    stats: MonitorStats,
}

impl MonitorLoop {
    pub fn new(
        config: Config,
        pool: AccountPool,
        watermarks: ChannelWatermarkStore,
        cancel: CancellationToken,
    ) -> Self {
        let targets = config
            .target_channels
            .iter()
            .filter(|c| !c.trim().is_empty())
            .map(ChannelTarget::new)
            .collect();
        Self {
            config,
            targets,
            pool,
            watermarks,
            cancel,
            checker_cursor: 0,
            stats: MonitorStats::default(),
        }
    }

    pub fn pool(&self) -> &AccountPool {
        &self.pool
    }

    pub fn watermarks(&self) -> &ChannelWatermarkStore {
        &self.watermarks
    }

    pub fn stats(&self) -> &MonitorStats {
        &self.stats
    }

    /// Release every session; used on the way out regardless of how the loop ended
    pub async fn shutdown(&mut self) {
        self.pool.release_all().await;
    }

    /// Run passes until cancelled, until the pool is exhausted, or after one
    /// pass when continuous monitoring is disabled
    pub async fn run(&mut self) -> Result<MonitorExit, MonitorError> {
        if self.targets.is_empty() {
            error!("No target channels specified in configuration");
            return Err(MonitorError::NoTargetChannels);
        }

        info!(
            "Starting monitoring of {channels} channels with {accounts} accounts",
            channels = self.targets.len(),
            accounts = self.pool.len()
        );

        loop {
            self.run_pass().await?;

            if self.cancel.is_cancelled() {
                info!("Monitoring stopped by user");
                return Ok(MonitorExit::Cancelled);
            }
            if !self.config.continuous_monitoring {
                return Ok(MonitorExit::PassComplete);
            }
            if !sleep_or_cancel(self.config.check_interval(), &self.cancel).await {
                info!("Monitoring stopped by user");
                return Ok(MonitorExit::Cancelled);
            }
        }
    }

    /// One pass over every configured channel, in order
    pub async fn run_pass(&mut self) -> Result<(), MonitorError> {
        connect_pending(&mut self.pool, &self.cancel).await;
        self.ensure_pool()?;

        for position in 0..self.targets.len() {
            if self.cancel.is_cancelled() {
                break;
            }
            let target = self.targets[position].clone();
            self.process_channel(&target).await;
            self.ensure_pool()?;

            let delay = jitter(&self.config, &mut rand::rng());
            if !sleep_or_cancel(delay, &self.cancel).await {
                break;
            }
        }

        self.stats.passes += 1;
        SummaryReporter::log_status(&self.pool, &self.stats);
        Ok(())
    }

    fn ensure_pool(&self) -> Result<(), MonitorError> {
        if self.pool.is_exhausted() {
            error!("All accounts are deactivated, stopping");
            return Err(MonitorError::PoolExhausted);
        }
        Ok(())
    }

    async fn process_channel(&mut self, target: &ChannelTarget) {
        let Some(checker) = self.pick_checker(target) else {
            warn!("No active account available to check {target}, skipping");
            return;
        };

        let watermark = self.watermarks.get(target.watermark_key());
        let new_items = {
            let poller = Poller::new(&self.config, &self.cancel);
            let account = &mut self.pool.accounts_mut()[checker];
            poller.check(target, account, watermark).await
        };
        let Some(&max_item) = new_items.last() else {
            return;
        };

        self.stats.batches += 1;
        self.stats.items_discovered += new_items.len() as u64;

        let report = Dispatcher::new(&self.config, &self.cancel)
            .dispatch(target, &new_items, &mut self.pool)
            .await;
        self.commit(target, max_item, &report);
    }

    /// Advance and persist the watermark once the batch has been joined
    fn commit(&mut self, target: &ChannelTarget, max_item: u64, report: &BatchReport) {
        if !report.dispatched() {
            warn!("Batch for {target} was cancelled before dispatch, watermark unchanged");
            return;
        }

        if self.watermarks.advance(target.watermark_key(), max_item) {
            info!("Watermark for {target} advanced to {max_item}");
        }
        if let Err(e) = self.watermarks.persist() {
            error!("Error saving watermarks: {e}");
        }
    }

    /// Checker account for `target`: an active account not banned from it,
    /// chosen per the configured selection policy
    fn pick_checker(&mut self, target: &ChannelTarget) -> Option<usize> {
        let candidates: Vec<usize> = self
            .pool
            .accounts()
            .iter()
            .enumerate()
            .filter(|(_, account)| account.is_active() && !account.is_banned_from(target))
            .map(|(index, _)| index)
            .collect();

        match self.config.checker_selection {
            CheckerSelection::RoundRobin => {
                if candidates.is_empty() {
                    return None;
                }
                let picked = candidates[self.checker_cursor % candidates.len()];
                self.checker_cursor = self.checker_cursor.wrapping_add(1);
                Some(picked)
            }
            CheckerSelection::Random => candidates.choose(&mut rand::rng()).copied(),
        }
    }
}

/// Run the monitor, then release every session and write the summary file,
/// whichever way the loop ended
pub async fn run_to_completion(
    mut monitor: MonitorLoop,
    reporter: &SummaryReporter,
) -> (Result<MonitorExit, MonitorError>, MonitorLoop) {
    let result = monitor.run().await;
    if let Err(e) = &result {
        error!("Fatal monitoring error: {e}");
    }

    monitor.shutdown().await;
    if let Err(e) = reporter.write(monitor.pool()) {
        error!("Failed to write summary: {e:#}");
    }

    (result, monitor)
}
