use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::account::Account;
use crate::channel::ChannelTarget;
use crate::config::Config;
use crate::lifecycle::{observe_failure, FailureOutcome};
use crate::pacing::flood_backoff;
use crate::session::SessionError;

/// Probes channels for items newer than their watermark
pub struct Poller<'a> {
    config: &'a Config,
    cancel: &'a CancellationToken,
}

impl<'a> Poller<'a> {
    pub fn new(config: &'a Config, cancel: &'a CancellationToken) -> Self {
        Self { config, cancel }
    }

    /// Ids of new items in `target`, ascending.
    ///
    /// Never fails: a flood wait suspends and yields nothing for this cycle,
    /// any other failure is logged, applied to the checker's lifecycle and
    /// also yields nothing.
    pub async fn check(
        &self,
        target: &ChannelTarget,
        checker: &mut Account,
        watermark: u64,
    ) -> Vec<u64> {
        match self.fetch(target, checker).await {
            Ok(recent) => {
                let new_items = select_new_items(recent, watermark, self.config.avoid_re_viewing);
                if new_items.is_empty() {
                    debug!("No new posts in {target} (watermark {watermark})");
                } else {
                    info!(
                        "Found {count} new posts in {target}: {new_items:?}",
                        count = new_items.len()
                    );
                }
                new_items
            }
            Err(_) if self.cancel.is_cancelled() => {
                debug!("Check of {target} abandoned, stop requested");
                Vec::new()
            }
            Err(SessionError::FloodWait { seconds }) => {
                observe_failure(checker, Some(target), &SessionError::FloodWait { seconds }).await;
                flood_backoff(seconds, checker.phone(), self.cancel).await;
                Vec::new()
            }
            Err(e) => {
                warn!(
                    "Error checking {target} with {phone}: {e}",
                    phone = checker.phone()
                );
                if observe_failure(checker, Some(target), &e).await == FailureOutcome::Deactivated {
                    warn!(
                        "Checker {phone} left the pool while probing {target}",
                        phone = checker.phone()
                    );
                }
                Vec::new()
            }
        }
    }

    async fn fetch(
        &self,
        target: &ChannelTarget,
        checker: &mut Account,
    ) -> Result<Vec<u64>, SessionError> {
        let entity = checker.channel_entity(target, self.cancel).await?;
        checker
            .fetch_recent(&entity, self.config.fetch_limit, self.cancel)
            .await
    }
}

/// Keep the ids above `watermark` (unless filtering is disabled), ascending
/// and without duplicates
pub fn select_new_items(mut recent: Vec<u64>, watermark: u64, filter_seen: bool) -> Vec<u64> {
    if filter_seen {
        recent.retain(|&id| id > watermark);
    }
    recent.sort_unstable();
    recent.dedup();
    recent
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_items_above_watermark_in_ascending_order() {
        assert_eq!(
            select_new_items(vec![98, 101, 103, 104], 100, true),
            vec![101, 103, 104]
        );
    }

    #[test]
    fn test_newest_first_input_is_sorted() {
        assert_eq!(
            select_new_items(vec![104, 103, 101, 98], 100, true),
            vec![101, 103, 104]
        );
    }

    #[test]
    fn test_watermark_equal_item_is_not_new() {
        assert_eq!(select_new_items(vec![100], 100, true), Vec::<u64>::new());
    }

    #[test]
    fn test_zero_watermark_keeps_everything() {
        assert_eq!(select_new_items(vec![3, 1, 2, 2], 0, true), vec![1, 2, 3]);
    }

    #[test]
    fn test_filtering_disabled_keeps_seen_items() {
        assert_eq!(
            select_new_items(vec![98, 101], 100, false),
            vec![98, 101]
        );
    }
}
