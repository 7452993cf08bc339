use crate::error_utils::parse_json_with_context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{error, info, warn};

/// How the monitor picks the account that probes a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CheckerSelection {
    /// Cycle through the active accounts in pool order
    #[default]
    RoundRobin,
    /// Pick uniformly at random among the active accounts
    Random,
}

/// Read-only runtime configuration.
///
/// Every field has a default so a partial (or absent) document still yields a
/// runnable configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Channels to monitor, in polling order
    pub target_channels: Vec<String>,
    /// Keep polling forever; false runs a single pass
    pub continuous_monitoring: bool,
    /// Seconds between full passes over all channels
    pub check_interval: u64,
    /// Attempts per dispatched action before it counts as failed
    pub max_retries: u32,
    /// Lower jitter bound in seconds
    pub delay_between_posts_min: f64,
    /// Upper jitter bound in seconds
    pub delay_between_posts_max: f64,
    /// Rate limit window length in seconds
    pub rate_limit_window: u64,
    /// Remote calls allowed per account per window
    pub rate_limit_max_requests: u32,
    /// Filter out items at or below the channel watermark
    pub avoid_re_viewing: bool,
    pub enable_reactions: bool,
    pub max_reactions_per_post: usize,
    pub available_reactions: Vec<String>,
    /// Skip remote calls during dispatch, simulating success
    pub dry_run: bool,
    /// Number of most recent items fetched per probe
    pub fetch_limit: usize,
    pub checker_selection: CheckerSelection,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            target_channels: Vec::new(),
            continuous_monitoring: true,
            check_interval: 10,
            max_retries: 3,
            delay_between_posts_min: 2.0,
            delay_between_posts_max: 5.0,
            rate_limit_window: 60,
            rate_limit_max_requests: 50,
            avoid_re_viewing: true,
            enable_reactions: false,
            max_reactions_per_post: 3,
            available_reactions: vec!["👍".to_string(), "❤".to_string(), "🔥".to_string()],
            dry_run: false,
            fetch_limit: 10,
            checker_selection: CheckerSelection::RoundRobin,
        }
    }
}

impl Config {
    /// Parse a configuration document, falling back to defaults for missing keys
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let config: Config = parse_json_with_context(json, "configuration")?;
        Ok(config.normalized())
    }

    /// Repair values that would otherwise break the scheduler
    pub fn normalized(mut self) -> Self {
        if !self.delay_between_posts_min.is_finite() || self.delay_between_posts_min < 0.0 {
            self.delay_between_posts_min = 0.0;
        }
        if !self.delay_between_posts_max.is_finite() || self.delay_between_posts_max < 0.0 {
            self.delay_between_posts_max = 0.0;
        }
        if self.delay_between_posts_min > self.delay_between_posts_max {
            std::mem::swap(
                &mut self.delay_between_posts_min,
                &mut self.delay_between_posts_max,
            );
        }
        self.max_retries = self.max_retries.max(1);
        self.rate_limit_max_requests = self.rate_limit_max_requests.max(1);
        self.fetch_limit = self.fetch_limit.max(1);
        self.available_reactions.retain(|emoji| !emoji.trim().is_empty());
        self
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window)
    }
}

/// Load the configuration document.
///
/// A missing or unreadable document is not fatal: the defaults are used and
/// the problem is logged.
pub fn load_config(path: &Path) -> Config {
    if !path.exists() {
        warn!(
            "Configuration file {path} not found, using defaults",
            path = path.display()
        );
        return Config::default();
    }

    let loaded = fs::read_to_string(path)
        .map_err(anyhow::Error::from)
        .and_then(|json| Config::from_json(&json));

    match loaded {
        Ok(config) => {
            info!("Configuration loaded from {path}", path = path.display());
            config
        }
        Err(e) => {
            error!(
                "Error loading config from {path}: {e:#}, using defaults",
                path = path.display()
            );
            Config::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_empty_document_yields_defaults() {
        let config = Config::from_json("{}").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_partial_document_keeps_other_defaults() {
        let config = Config::from_json(
            r#"{"target_channels": ["news", "1234"], "check_interval": 30, "dry_run": true}"#,
        )
        .unwrap();

        assert_eq!(config.target_channels, vec!["news", "1234"]);
        assert_eq!(config.check_interval, 30);
        assert!(config.dry_run);
        assert_eq!(config.rate_limit_max_requests, 50);
        assert_eq!(config.checker_selection, CheckerSelection::RoundRobin);
    }

    #[test]
    fn test_unknown_keys_are_ignored() {
        let config =
            Config::from_json(r#"{"session_rotation": true, "checker_selection": "random"}"#)
                .unwrap();
        assert_eq!(config.checker_selection, CheckerSelection::Random);
    }

    #[test]
    fn test_normalization_repairs_bounds() {
        let config = Config {
            delay_between_posts_min: 8.0,
            delay_between_posts_max: 3.0,
            max_retries: 0,
            rate_limit_max_requests: 0,
            available_reactions: vec!["".to_string(), "🔥".to_string()],
            ..Config::default()
        }
        .normalized();

        assert_eq!(config.delay_between_posts_min, 3.0);
        assert_eq!(config.delay_between_posts_max, 8.0);
        assert_eq!(config.max_retries, 1);
        assert_eq!(config.rate_limit_max_requests, 1);
        assert_eq!(config.available_reactions, vec!["🔥"]);
    }

    #[test]
    fn test_load_config_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = load_config(&dir.path().join("config.json"));
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_config_malformed_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        assert_eq!(load_config(&path), Config::default());
    }

    #[test]
    fn test_load_config_reads_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"enable_reactions": true, "max_reactions_per_post": 7}"#).unwrap();

        let config = load_config(&path);
        assert!(config.enable_reactions);
        assert_eq!(config.max_reactions_per_post, 7);
    }
}
