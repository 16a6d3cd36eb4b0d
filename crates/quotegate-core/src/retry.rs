//! Retry policy with pluggable backoff, coupled to a vendor's circuit breaker.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{CircuitBreaker, VendorError};

/// Backoff strategy for retrying failed requests.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Backoff {
    /// Same delay between every attempt.
    Fixed { delay: Duration },
    /// `base * (attempt + 1)`.
    Linear { base: Duration },
    /// `base * factor^attempt`, capped at `max`, with optional +/-50% jitter.
    Exponential {
        base: Duration,
        factor: f64,
        max: Duration,
        jitter: bool,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Exponential {
            base: Duration::from_millis(200),
            factor: 2.0,
            max: Duration::from_secs(3),
            jitter: true,
        }
    }
}

impl Backoff {
    /// Delay before the retry following the 0-based `attempt` that just failed.
    pub fn delay(self, attempt: u32) -> Duration {
        match self {
            Self::Fixed { delay } => delay,
            Self::Linear { base } => base.saturating_mul(attempt.saturating_add(1)),
            Self::Exponential {
                base,
                factor,
                max,
                jitter,
            } => {
                let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
                let seconds = base.as_secs_f64() * factor.powi(exponent);
                let capped = if seconds.is_finite() {
                    seconds.min(max.as_secs_f64())
                } else {
                    max.as_secs_f64()
                };
                let delay = Duration::from_secs_f64(capped.max(0.0));

                if !jitter {
                    return delay;
                }

                let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
                let half = millis / 2;
                let offset = fastrand::u64(0..=half.saturating_mul(2));
                Duration::from_millis(millis.saturating_sub(half).saturating_add(offset))
            }
        }
    }
}

/// Bounded retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Zero is treated as one.
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::default(),
        }
    }
}

impl RetryPolicy {
    pub fn exponential(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    pub fn fixed(delay: Duration, max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Fixed { delay },
        }
    }

    pub fn linear(base: Duration, max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Linear { base },
        }
    }

    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Runs `call` until it succeeds, fails with a non-retryable error, the breaker refuses
    /// further attempts, or the attempt budget is spent.
    ///
    /// Every outcome is reported to `breaker`. A breaker that refuses the very first attempt
    /// yields `CircuitOpen` and `call` is never invoked; a refusal between attempts returns the
    /// last vendor error.
    pub async fn execute<T, F, Fut>(
        &self,
        breaker: &CircuitBreaker,
        mut call: F,
    ) -> Result<T, VendorError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, VendorError>>,
    {
        if !breaker.allow_request() {
            return Err(VendorError::circuit_open(breaker.vendor()));
        }

        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0_u32;
        loop {
            match call().await {
                Ok(value) => {
                    breaker.record_success();
                    return Ok(value);
                }
                Err(error) => {
                    breaker.record_failure(error.kind());
                    attempt += 1;

                    if !error.retryable() {
                        return Err(error);
                    }
                    if attempt >= max_attempts {
                        tracing::debug!(
                            vendor = %breaker.vendor(),
                            attempt,
                            %error,
                            "retry budget exhausted"
                        );
                        return Err(error);
                    }
                    if !breaker.allow_request() {
                        return Err(error);
                    }

                    let delay = self.backoff.delay(attempt - 1);
                    tracing::debug!(
                        vendor = %breaker.vendor(),
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        %error,
                        "retrying vendor call"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::{CircuitBreakerConfig, CircuitState, VendorId};

    fn breaker(threshold: u32) -> CircuitBreaker {
        CircuitBreaker::new(
            VendorId::Alpaca,
            CircuitBreakerConfig {
                failure_threshold: threshold,
                reset_timeout: Duration::from_secs(60),
                half_open_trial_count: 1,
            },
        )
    }

    #[test]
    fn fixed_backoff_is_constant() {
        let backoff = Backoff::Fixed {
            delay: Duration::from_millis(100),
        };
        assert_eq!(backoff.delay(0), Duration::from_millis(100));
        assert_eq!(backoff.delay(10), Duration::from_millis(100));
    }

    #[test]
    fn linear_backoff_grows_by_base() {
        let backoff = Backoff::Linear {
            base: Duration::from_millis(100),
        };
        assert_eq!(backoff.delay(0), Duration::from_millis(100));
        assert_eq!(backoff.delay(2), Duration::from_millis(300));
    }

    #[test]
    fn exponential_backoff_is_capped() {
        let backoff = Backoff::Exponential {
            base: Duration::from_millis(100),
            factor: 2.0,
            max: Duration::from_secs(1),
            jitter: false,
        };

        assert_eq!(backoff.delay(0), Duration::from_millis(100));
        assert_eq!(backoff.delay(3), Duration::from_millis(800));
        assert_eq!(backoff.delay(4), Duration::from_secs(1));
        assert_eq!(backoff.delay(200), Duration::from_secs(1));
    }

    #[test]
    fn exponential_jitter_stays_within_half() {
        let backoff = Backoff::Exponential {
            base: Duration::from_millis(100),
            factor: 2.0,
            max: Duration::from_secs(1),
            jitter: true,
        };

        for _ in 0..20 {
            for attempt in 0..5 {
                let expected = (100.0 * 2_f64.powi(attempt as i32)).min(1000.0);
                let delay_ms = backoff.delay(attempt).as_millis() as f64;
                assert!(delay_ms >= expected * 0.5, "attempt={attempt} delay={delay_ms}");
                assert!(delay_ms <= expected * 1.5, "attempt={attempt} delay={delay_ms}");
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_retryable_errors_until_success() {
        let breaker = breaker(5);
        let calls = &AtomicU32::new(0);
        let policy = RetryPolicy::fixed(Duration::from_millis(10), 3);

        let result = policy
            .execute(&breaker, || async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(VendorError::from_status(VendorId::Alpaca, 503, "busy"))
                } else {
                    Ok(7)
                }
            })
            .await;

        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(breaker.consecutive_failures(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn client_errors_abort_immediately() {
        let breaker = breaker(5);
        let calls = &AtomicU32::new(0);

        let result: Result<(), _> = RetryPolicy::fixed(Duration::ZERO, 5)
            .execute(&breaker, || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(VendorError::from_status(VendorId::Alpaca, 403, "forbidden"))
            })
            .await;

        assert_eq!(result.expect_err("must fail").status(), Some(403));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn breaker_trip_stops_retrying() {
        let breaker = breaker(2);
        let calls = &AtomicU32::new(0);

        let result: Result<(), _> = RetryPolicy::fixed(Duration::ZERO, 10)
            .execute(&breaker, || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(VendorError::network(VendorId::Alpaca, "reset"))
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(
            result.expect_err("must fail").kind(),
            crate::VendorErrorKind::Network
        );
    }

    #[tokio::test(start_paused = true)]
    async fn open_breaker_rejects_without_calling() {
        let breaker = breaker(1);
        breaker.record_failure(crate::VendorErrorKind::Server);
        let calls = &AtomicU32::new(0);

        let result: Result<(), _> = RetryPolicy::default()
            .execute(&breaker, || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;

        assert_eq!(
            result.expect_err("must fail").kind(),
            crate::VendorErrorKind::CircuitOpen
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_returns_last_error() {
        let breaker = breaker(5);
        let calls = &AtomicU32::new(0);

        let result: Result<(), _> = RetryPolicy::linear(Duration::from_millis(5), 2)
            .execute(&breaker, || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                Err(VendorError::network(VendorId::Alpaca, format!("timeout #{n}")))
            })
            .await;

        assert_eq!(result.expect_err("must fail").message(), "timeout #1");
        assert_eq!(breaker.state(), CircuitState::Closed);
    }
}
