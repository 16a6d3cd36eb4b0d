use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::clock::Clock;
use governor::middleware::NoOpMiddleware;
use governor::nanos::Nanos;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};
use tokio::time::Instant;

use crate::VendorPolicy;

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, TokioClock, NoOpMiddleware<Nanos>>;

/// Governor clock reading tokio time, so a paused test runtime also pauses the quota.
#[derive(Debug, Clone, Copy)]
struct TokioClock {
    origin: Instant,
}

impl Clock for TokioClock {
    type Instant = Nanos;

    fn now(&self) -> Nanos {
        Nanos::from(self.origin.elapsed())
    }
}

/// Local request budget enforced before a vendor call leaves the process.
#[derive(Clone)]
pub struct RequestQuota {
    limiter: Arc<DirectRateLimiter>,
    clock: TokioClock,
    limit: u32,
    window: Duration,
}

impl std::fmt::Debug for RequestQuota {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestQuota")
            .field("limit", &self.limit)
            .field("window", &self.window)
            .finish()
    }
}

impl RequestQuota {
    pub fn new(window: Duration, limit: u32) -> Self {
        let clock = TokioClock {
            origin: Instant::now(),
        };
        Self {
            limiter: Arc::new(RateLimiter::direct_with_clock(
                quota_from_window(window, limit),
                &clock,
            )),
            clock,
            limit: limit.max(1),
            window,
        }
    }

    pub fn from_policy(policy: &VendorPolicy) -> Self {
        Self::new(policy.quota_window, policy.quota_limit)
    }

    /// Takes one cell of budget; `false` when the window is exhausted.
    pub fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
    }

    /// Waits for one cell of budget. Gives up with `false`, without sleeping, when the next
    /// cell refills later than `budget` from now.
    pub async fn acquire_within(&self, budget: Duration) -> bool {
        let deadline = Instant::now() + budget;
        loop {
            let wait = match self.limiter.check() {
                Ok(()) => return true,
                Err(not_until) => not_until.wait_time_from(self.clock.now()),
            };
            if Instant::now() + wait > deadline {
                return false;
            }
            tokio::time::sleep(wait).await;
        }
    }

    pub const fn limit(&self) -> u32 {
        self.limit
    }
}

fn quota_from_window(window: Duration, limit: u32) -> Quota {
    let burst = NonZeroU32::new(limit).unwrap_or(NonZeroU32::MIN);

    let seconds_per_cell = (window.as_secs_f64() / f64::from(burst.get())).max(0.001);
    let period = Duration::from_secs_f64(seconds_per_cell);

    Quota::with_period(period)
        .unwrap_or_else(|| Quota::per_second(burst))
        .allow_burst(burst)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausts_after_burst() {
        let quota = RequestQuota::new(Duration::from_secs(60), 2);

        assert!(quota.try_acquire());
        assert!(quota.try_acquire());
        assert!(!quota.try_acquire());
    }

    #[test]
    fn zero_limit_is_clamped_to_one() {
        let quota = RequestQuota::new(Duration::from_secs(60), 0);

        assert_eq!(quota.limit(), 1);
        assert!(quota.try_acquire());
        assert!(!quota.try_acquire());
    }

    #[tokio::test(start_paused = true)]
    async fn waits_for_the_next_cell_inside_the_budget() {
        let quota = RequestQuota::new(Duration::from_secs(2), 2);
        let started = Instant::now();

        for _ in 0..4 {
            assert!(quota.acquire_within(Duration::from_secs(5)).await);
        }

        // Two cells up front, then one per second.
        assert!(started.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn refuses_when_the_refill_is_beyond_the_budget() {
        let quota = RequestQuota::new(Duration::from_secs(60), 1);
        assert!(quota.acquire_within(Duration::from_secs(1)).await);

        let started = Instant::now();
        assert!(!quota.acquire_within(Duration::from_secs(10)).await);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }
}
