use rand::Rng;
use std::time::Duration;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::Config;

/// Added on top of every platform-advised flood wait
pub const FLOOD_WAIT_MARGIN: Duration = Duration::from_secs(5);

/// Uniform delay between the configured jitter bounds
pub fn jitter<R: Rng>(config: &Config, rng: &mut R) -> Duration {
    let (min, max) = (config.delay_between_posts_min, config.delay_between_posts_max);
    if max <= min {
        return Duration::from_secs_f64(min.max(0.0));
    }
    Duration::from_secs_f64(rng.random_range(min..=max))
}

/// Sleep for `duration` unless `cancel` fires first.
/// Returns false when the sleep was cut short by cancellation.
pub async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = time::sleep(duration) => true,
        _ = cancel.cancelled() => false,
    }
}

/// Honor a platform flood-control signal: the advised wait plus a margin
pub async fn flood_backoff(seconds: u64, who: &str, cancel: &CancellationToken) -> bool {
    let wait = Duration::from_secs(seconds) + FLOOD_WAIT_MARGIN;
    warn!(
        "FloodWait for {who}: {seconds}s - waiting {wait_secs} seconds",
        wait_secs = wait.as_secs()
    );
    sleep_or_cancel(wait, cancel).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tokio::time::Instant;

    #[test]
    fn test_jitter_stays_within_bounds() {
        let config = Config {
            delay_between_posts_min: 2.0,
            delay_between_posts_max: 5.0,
            ..Config::default()
        };
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let delay = jitter(&config, &mut rng);
            assert!(delay >= Duration::from_secs(2));
            assert!(delay <= Duration::from_secs(5));
        }
    }

    #[test]
    fn test_jitter_with_equal_bounds_is_fixed() {
        let config = Config {
            delay_between_posts_min: 1.5,
            delay_between_posts_max: 1.5,
            ..Config::default()
        };
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(jitter(&config, &mut rng), Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_flood_backoff_waits_advised_time_plus_margin() {
        let cancel = CancellationToken::new();
        let start = Instant::now();
        assert!(flood_backoff(30, "+1555", &cancel).await);
        assert_eq!(start.elapsed(), Duration::from_secs(35));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_is_cut_short_by_cancellation() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let start = Instant::now();
        assert!(!sleep_or_cancel(Duration::from_secs(600), &cancel).await);
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
