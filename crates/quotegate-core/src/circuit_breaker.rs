use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::notify::{titles, Notification, NotificationSink, TracingSink};
use crate::{VendorErrorKind, VendorId};

/// Runtime circuit state for one vendor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

/// Circuit breaker thresholds and timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub reset_timeout: Duration,
    /// Consecutive half-open successes needed to close again. Values below 1 are treated as 1.
    pub half_open_trial_count: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(60),
            half_open_trial_count: 2,
        }
    }
}

#[derive(Debug)]
struct CircuitInner {
    state: CircuitState,
    consecutive_failures: u32,
    half_open_successes: u32,
    last_failure: Option<Instant>,
}

impl Default for CircuitInner {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            half_open_successes: 0,
            last_failure: None,
        }
    }
}

/// Per-vendor circuit breaker.
///
/// Only retryable failure kinds count toward the threshold; client errors, local throttling
/// and refused calls never move the state machine. The open-to-half-open transition is
/// evaluated lazily in [`allow_request`](Self::allow_request).
pub struct CircuitBreaker {
    vendor: VendorId,
    config: CircuitBreakerConfig,
    inner: Mutex<CircuitInner>,
    sink: Arc<dyn NotificationSink>,
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("vendor", &self.vendor)
            .field("config", &self.config)
            .field("state", &self.state())
            .finish()
    }
}

impl CircuitBreaker {
    pub fn new(vendor: VendorId, config: CircuitBreakerConfig) -> Self {
        Self::with_sink(vendor, config, Arc::new(TracingSink))
    }

    pub fn with_sink(
        vendor: VendorId,
        config: CircuitBreakerConfig,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            vendor,
            config,
            inner: Mutex::new(CircuitInner::default()),
            sink,
        }
    }

    pub const fn vendor(&self) -> VendorId {
        self.vendor
    }

    pub const fn config(&self) -> CircuitBreakerConfig {
        self.config
    }

    fn lock(&self) -> MutexGuard<'_, CircuitInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn allow_request(&self) -> bool {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let can_probe = inner
                    .last_failure
                    .map(|at| at.elapsed() >= self.config.reset_timeout)
                    .unwrap_or(true);

                if can_probe {
                    inner.state = CircuitState::HalfOpen;
                    inner.half_open_successes = 0;
                    tracing::info!(vendor = %self.vendor, "circuit half-open, probing vendor");
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        let recovered = {
            let mut inner = self.lock();
            inner.consecutive_failures = 0;
            match inner.state {
                CircuitState::HalfOpen => {
                    inner.half_open_successes = inner.half_open_successes.saturating_add(1);
                    if inner.half_open_successes >= self.config.half_open_trial_count.max(1) {
                        inner.state = CircuitState::Closed;
                        inner.half_open_successes = 0;
                        inner.last_failure = None;
                        true
                    } else {
                        false
                    }
                }
                CircuitState::Closed | CircuitState::Open => false,
            }
        };

        if recovered {
            tracing::info!(vendor = %self.vendor, "circuit closed");
            self.sink.publish(Notification::info(
                titles::CIRCUIT_CLOSED,
                format!("{} is responding again", self.vendor),
            ));
        }
    }

    pub fn record_failure(&self, kind: VendorErrorKind) {
        if !kind.retryable() {
            return;
        }

        let opened = {
            let mut inner = self.lock();
            inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
            // Late failures from calls admitted before opening must not extend the open window.
            if inner.state != CircuitState::Open {
                inner.last_failure = Some(Instant::now());
            }

            let trip = match inner.state {
                CircuitState::HalfOpen => true,
                CircuitState::Closed => {
                    inner.consecutive_failures >= self.config.failure_threshold
                }
                CircuitState::Open => false,
            };
            if trip {
                inner.state = CircuitState::Open;
                inner.half_open_successes = 0;
            }
            trip.then_some(inner.consecutive_failures)
        };

        if let Some(failures) = opened {
            tracing::warn!(vendor = %self.vendor, failures, "circuit opened");
            self.sink.publish(Notification::error(
                titles::CIRCUIT_OPENED,
                format!(
                    "{} disabled for {} s after {failures} consecutive failures",
                    self.vendor,
                    self.config.reset_timeout.as_secs()
                ),
            ));
        }
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    /// Forces the breaker back to closed without publishing.
    pub fn reset(&self) {
        *self.lock() = CircuitInner::default();
    }
}
