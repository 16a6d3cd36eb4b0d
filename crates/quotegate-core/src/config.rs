//! Gateway configuration.
//!
//! [`GatewayConfig::from_env`] reads credentials and tuning knobs from the process
//! environment. Each setting has a `QUOTEGATE_`-prefixed variable that wins over the plain
//! vendor variable.
//!
//! | Setting | Primary | Fallback |
//! |---------|---------|----------|
//! | Alpaca key id | `QUOTEGATE_ALPACA_API_KEY` | `ALPACA_API_KEY` |
//! | Alpaca secret | `QUOTEGATE_ALPACA_SECRET_KEY` | `ALPACA_SECRET_KEY` |
//! | Alpaca live trading | `QUOTEGATE_ALPACA_LIVE` | - |
//! | Polygon key | `QUOTEGATE_POLYGON_API_KEY` | `POLYGON_API_KEY` |
//! | FMP key | `QUOTEGATE_FMP_API_KEY` | `FMP_API_KEY` |
//! | FMP requests/minute | `QUOTEGATE_FMP_RATE_LIMIT` | `FMP_RATE_LIMIT` |
//! | Redis URL | `QUOTEGATE_REDIS_URL` | `REDIS_URL` |
//! | Local cache capacity | `QUOTEGATE_CACHE_CAPACITY` | - |
//! | Default cache TTL (s) | `QUOTEGATE_CACHE_TTL_SECS` | - |
//! | Prefetch interval (s) | `QUOTEGATE_PREFETCH_INTERVAL_SECS` | - |
//! | Prefetch on/off | `QUOTEGATE_PREFETCH_ENABLED` | - |

use std::collections::BTreeMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::{CacheConfig, ConfigError, PrefetchConfig, VendorId, VendorPolicy};

/// API credentials per vendor. A vendor without credentials is not registered.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct VendorCredentials {
    pub alpaca_key_id: Option<String>,
    pub alpaca_secret_key: Option<String>,
    pub polygon_api_key: Option<String>,
    pub fmp_api_key: Option<String>,
}

impl std::fmt::Debug for VendorCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VendorCredentials")
            .field("alpaca", &self.alpaca_key_id.is_some())
            .field("polygon", &self.polygon_api_key.is_some())
            .field("fmp", &self.fmp_api_key.is_some())
            .finish()
    }
}

impl VendorCredentials {
    pub fn configured(&self, vendor: VendorId) -> bool {
        match vendor {
            VendorId::Alpaca => self.alpaca_key_id.is_some() && self.alpaca_secret_key.is_some(),
            VendorId::Polygon => self.polygon_api_key.is_some(),
            VendorId::Fmp => self.fmp_api_key.is_some(),
        }
    }
}

/// Top-level gateway configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayConfig {
    pub credentials: VendorCredentials,
    pub policies: BTreeMap<VendorId, VendorPolicy>,
    pub cache: CacheConfig,
    pub prefetch: PrefetchConfig,
    /// Routes Alpaca trading calls to the live endpoint instead of paper.
    pub alpaca_live: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            credentials: VendorCredentials::default(),
            policies: VendorId::ALL
                .into_iter()
                .map(|vendor| (vendor, VendorPolicy::default_for(vendor)))
                .collect(),
            cache: CacheConfig::default(),
            prefetch: PrefetchConfig::default(),
            alpaca_live: false,
        }
    }
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |primary: &str, fallback: Option<&str>| {
            lookup(primary)
                .or_else(|| fallback.and_then(&lookup))
                .filter(|value| !value.trim().is_empty())
        };

        let mut config = Self::default();
        config.credentials = VendorCredentials {
            alpaca_key_id: read("QUOTEGATE_ALPACA_API_KEY", Some("ALPACA_API_KEY")),
            alpaca_secret_key: read("QUOTEGATE_ALPACA_SECRET_KEY", Some("ALPACA_SECRET_KEY")),
            polygon_api_key: read("QUOTEGATE_POLYGON_API_KEY", Some("POLYGON_API_KEY")),
            fmp_api_key: read("QUOTEGATE_FMP_API_KEY", Some("FMP_API_KEY")),
        };

        if let Some(raw) = read("QUOTEGATE_ALPACA_LIVE", None) {
            config.alpaca_live = parse_flag("QUOTEGATE_ALPACA_LIVE", &raw)?;
        }
        if let Some(raw) = read("QUOTEGATE_FMP_RATE_LIMIT", Some("FMP_RATE_LIMIT")) {
            let limit = parse_number::<u32>("QUOTEGATE_FMP_RATE_LIMIT", &raw)?;
            if let Some(policy) = config.policies.get_mut(&VendorId::Fmp) {
                policy.quota_limit = limit;
            }
        }

        config.cache.redis_url = read("QUOTEGATE_REDIS_URL", Some("REDIS_URL"));
        if let Some(raw) = read("QUOTEGATE_CACHE_CAPACITY", None) {
            config.cache.local_capacity = parse_number("QUOTEGATE_CACHE_CAPACITY", &raw)?;
        }
        if let Some(raw) = read("QUOTEGATE_CACHE_TTL_SECS", None) {
            config.cache.default_ttl =
                Duration::from_secs(parse_number("QUOTEGATE_CACHE_TTL_SECS", &raw)?);
        }

        if let Some(raw) = read("QUOTEGATE_PREFETCH_INTERVAL_SECS", None) {
            config.prefetch.interval =
                Duration::from_secs(parse_number("QUOTEGATE_PREFETCH_INTERVAL_SECS", &raw)?);
        }
        if let Some(raw) = read("QUOTEGATE_PREFETCH_ENABLED", None) {
            config.prefetch.enabled = parse_flag("QUOTEGATE_PREFETCH_ENABLED", &raw)?;
        }

        Ok(config)
    }

    pub fn policy(&self, vendor: VendorId) -> VendorPolicy {
        self.policies
            .get(&vendor)
            .cloned()
            .unwrap_or_else(|| VendorPolicy::default_for(vendor))
    }
}

fn parse_number<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|error| ConfigError::InvalidValue {
            key,
            value: raw.to_owned(),
            reason: error.to_string(),
        })
}

fn parse_flag(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: raw.to_owned(),
            reason: String::from("expected a boolean"),
        }),
    }
}
