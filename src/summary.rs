use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::account::{AccountPool, LifecycleState};
use crate::datetime_utils::format_for_display;
use crate::error_utils::serialize_to_json_with_context;

/// Default file name of the shutdown summary inside the data directory
pub const SUMMARY_FILE: &str = "session_summary.json";

/// Per-account entry of the summary document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSummary {
    pub phone: String,
    pub state: String,
    pub success_count: u64,
    pub reaction_count: u64,
    pub error_count: u64,
    pub last_used: Option<DateTime<Utc>>,
}

/// Running totals of the monitor, for the periodic status report
#[derive(Debug, Clone)]
pub struct MonitorStats {
    pub start_time: Instant,
    pub passes: u64,
    pub batches: u64,
    pub items_discovered: u64,
}

impl Default for MonitorStats {
    fn default() -> Self {
        Self {
            start_time: Instant::now(),
            passes: 0,
            batches: 0,
            items_discovered: 0,
        }
    }
}

/// Snapshots per-account counters for logging and the summary file
pub struct SummaryReporter {
    path: PathBuf,
}

impl SummaryReporter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn snapshot(pool: &AccountPool) -> Vec<AccountSummary> {
        pool.accounts()
            .iter()
            .map(|account| AccountSummary {
                phone: account.phone().to_string(),
                state: account.state().to_string(),
                success_count: account.success_count(),
                reaction_count: account.reaction_count(),
                error_count: account.error_count(),
                last_used: account.last_used(),
            })
            .collect()
    }

    /// Log the status report printed after every full pass
    pub fn log_status(pool: &AccountPool, stats: &MonitorStats) {
        let snapshot = Self::snapshot(pool);
        let uptime = stats.start_time.elapsed();
        let deactivated = pool
            .accounts()
            .iter()
            .filter(|a| a.state() == LifecycleState::Deactivated)
            .count();

        info!("=== Monitor Status Report ===");
        info!("Uptime: {}", format_uptime(uptime));
        info!(
            "Passes: {passes}, batches: {batches}, new posts found: {items}",
            passes = stats.passes,
            batches = stats.batches,
            items = stats.items_discovered
        );
        info!(
            "Accounts: {active} active, {deactivated} deactivated, {total} total",
            active = pool.active_count(),
            total = pool.len()
        );
        info!(
            "Totals: {views} views, {reactions} reactions, {errors} errors",
            views = snapshot.iter().map(|s| s.success_count).sum::<u64>(),
            reactions = snapshot.iter().map(|s| s.reaction_count).sum::<u64>(),
            errors = snapshot.iter().map(|s| s.error_count).sum::<u64>()
        );
        for entry in snapshot.iter().filter(|s| s.error_count > 0) {
            warn!(
                "Account {phone} ({state}) has {errors} errors, last used {last_used}",
                phone = entry.phone,
                state = entry.state,
                errors = entry.error_count,
                last_used = entry
                    .last_used
                    .as_ref()
                    .map(format_for_display)
                    .unwrap_or_else(|| "never".to_string())
            );
        }
        info!("=============================");
    }

    /// Atomically write the summary document
    pub fn write(&self, pool: &AccountPool) -> Result<()> {
        let json = serialize_to_json_with_context(&Self::snapshot(pool), "session summary")?;

        let dir = self
            .path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;

        let mut tmp = NamedTempFile::new_in(dir).context("Failed to create temporary summary")?;
        tmp.write_all(json.as_bytes())
            .context("Failed to write session summary")?;
        tmp.persist(&self.path).with_context(|| {
            format!("Failed to replace summary at {}", self.path.display())
        })?;

        info!(
            "Wrote summary for {count} accounts to {path}",
            count = pool.len(),
            path = self.path.display()
        );
        Ok(())
    }
}

fn format_uptime(uptime: Duration) -> String {
    let secs = uptime.as_secs();
    format!("{}h{:02}m{:02}s", secs / 3600, (secs % 3600) / 60, secs % 60)
}
