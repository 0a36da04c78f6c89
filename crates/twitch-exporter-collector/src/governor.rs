use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use tracing::warn;
use twitch_exporter_common::time::Clock;
use twitch_exporter_helix::RateLimit;

pub const DEFAULT_REMAINING_THRESHOLD: u32 = 3;

/// Cooperative back-off against the Helix rate-limit bucket.
///
/// Callers hand it the rate limit of the response they just received, once
/// per iteration of their outer loop. When the bucket is nearly empty the
/// calling task sleeps until the reset time reported by Helix.
pub struct RateLimitGovernor {
    threshold: u32,
    clock: Arc<dyn Clock>,
}

impl RateLimitGovernor {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_threshold(DEFAULT_REMAINING_THRESHOLD, clock)
    }

    pub fn with_threshold(threshold: u32, clock: Arc<dyn Clock>) -> Self {
        Self { threshold, clock }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub async fn throttle(&self, rate_limit: Option<&RateLimit>) {
        let Some(rate_limit) = rate_limit else {
            return;
        };
        let Some(wait) = backoff_for(rate_limit, self.threshold, self.clock.now()) else {
            return;
        };

        warn!(
            limit = rate_limit.limit,
            remaining = rate_limit.remaining,
            reset_at = ?rate_limit.reset_at(),
            wait_secs = wait.as_secs(),
            "close to the helix rate limit, waiting for the bucket to refill"
        );
        tokio::time::sleep(wait).await;
    }
}

/// How long to wait before the next request, or `None` when the budget is
/// above the threshold. A reset time in the past yields a zero wait.
pub fn backoff_for(rate_limit: &RateLimit, threshold: u32, now: DateTime<Utc>) -> Option<Duration> {
    if rate_limit.remaining > threshold {
        return None;
    }
    let secs = rate_limit.reset.saturating_sub(now.timestamp()).max(0);
    Some(Duration::from_secs(secs.unsigned_abs()))
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use chrono::{TimeZone, Utc};
    use twitch_exporter_common::ManualClock;
    use twitch_exporter_helix::RateLimit;

    use super::{RateLimitGovernor, backoff_for};

    fn rate(remaining: u32, reset: i64) -> RateLimit {
        RateLimit {
            limit: 800,
            remaining,
            reset,
        }
    }

    #[test]
    fn backoff_policy() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let reset = now.timestamp() + 5;

        assert_eq!(backoff_for(&rate(10, reset), 3, now), None);
        assert_eq!(backoff_for(&rate(4, reset), 3, now), None);
        assert_eq!(backoff_for(&rate(3, reset), 3, now), Some(Duration::from_secs(5)));
        assert_eq!(
            backoff_for(&rate(0, now.timestamp() - 30), 3, now),
            Some(Duration::ZERO)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn throttle_blocks_until_reset() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let governor = RateLimitGovernor::new(Arc::new(ManualClock::new(now)));

        let started = tokio::time::Instant::now();
        governor.throttle(Some(&rate(2, now.timestamp() + 5))).await;
        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(5) && waited < Duration::from_secs(6));

        let started = tokio::time::Instant::now();
        governor.throttle(Some(&rate(10, now.timestamp() + 5))).await;
        governor.throttle(None).await;
        assert_eq!(started.elapsed(), Duration::ZERO);
    }
}
