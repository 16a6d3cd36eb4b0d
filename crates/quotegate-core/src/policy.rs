use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Backoff, CircuitBreakerConfig, RetryPolicy, VendorId};

/// Per-vendor resilience and quota knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VendorPolicy {
    pub vendor: VendorId,
    pub quota_window: Duration,
    pub quota_limit: u32,
    pub retry: RetryPolicy,
    pub breaker: CircuitBreakerConfig,
    pub timeout: Duration,
    /// A response reporting this many remaining requests or fewer raises a warning.
    pub rate_limit_floor: u32,
}

impl VendorPolicy {
    pub fn alpaca_default() -> Self {
        Self {
            vendor: VendorId::Alpaca,
            quota_window: Duration::from_secs(60),
            quota_limit: 200,
            retry: RetryPolicy {
                max_attempts: 3,
                backoff: Backoff::Exponential {
                    base: Duration::from_millis(500),
                    factor: 2.0,
                    max: Duration::from_secs(10),
                    jitter: true,
                },
            },
            breaker: CircuitBreakerConfig::default(),
            timeout: Duration::from_secs(10),
            rate_limit_floor: 10,
        }
    }

    pub fn polygon_default() -> Self {
        Self {
            vendor: VendorId::Polygon,
            quota_window: Duration::from_secs(60),
            quota_limit: 100,
            retry: RetryPolicy::exponential(3),
            breaker: CircuitBreakerConfig::default(),
            timeout: Duration::from_secs(10),
            rate_limit_floor: 5,
        }
    }

    pub fn fmp_default() -> Self {
        Self {
            vendor: VendorId::Fmp,
            quota_window: Duration::from_secs(60),
            quota_limit: 300,
            retry: RetryPolicy::exponential(3),
            breaker: CircuitBreakerConfig::default(),
            timeout: Duration::from_secs(10),
            rate_limit_floor: 10,
        }
    }

    pub fn default_for(vendor: VendorId) -> Self {
        match vendor {
            VendorId::Alpaca => Self::alpaca_default(),
            VendorId::Polygon => Self::polygon_default(),
            VendorId::Fmp => Self::fmp_default(),
        }
    }
}
