//! Two-tier response cache.
//!
//! | Tier | Backing | Expiry | Capacity |
//! |------|---------|--------|----------|
//! | local | [`LocalTier`] (`tokio::sync::RwLock<HashMap>`) | checked on read | bounded, oldest fifth evicted |
//! | remote | [`RemoteStore`] ([`RedisStore`], [`MemoryStore`]) | `SET EX` seconds | unbounded |
//!
//! Values are stored as JSON framed by [`codec`]; payloads above
//! [`CacheConfig::compression_threshold`] are gzip-compressed. A failing remote tier never
//! fails a lookup: the error is logged and the cache carries on with the local tier.

pub mod codec;
mod local;
mod remote;

use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use local::LocalTier;
pub use remote::{MemoryStore, RedisStore, RemoteStore, StoreFuture};

/// How a read interacts with the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheMode {
    /// Serve live entries, write fresh results through.
    #[default]
    Use,
    /// Skip the read but still write the fresh result through.
    Refresh,
    /// Neither read nor write.
    Bypass,
}

/// Per-call cache options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CacheOptions {
    pub mode: CacheMode,
    /// Overrides the data type's default TTL.
    pub ttl: Option<Duration>,
}

impl CacheOptions {
    pub fn no_cache() -> Self {
        Self {
            mode: CacheMode::Bypass,
            ttl: None,
        }
    }

    pub fn refresh() -> Self {
        Self {
            mode: CacheMode::Refresh,
            ttl: None,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn reads_cache(&self) -> bool {
        self.mode == CacheMode::Use
    }

    pub fn writes_cache(&self) -> bool {
        self.mode != CacheMode::Bypass
    }
}

/// Deterministic key: operation name plus the JSON-serialized parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn derive<P: Serialize + ?Sized>(operation: &str, params: &P) -> Self {
        let params = serde_json::to_string(params).unwrap_or_else(|_| String::from("null"));
        Self(format!("{operation}:{params}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    pub local_capacity: usize,
    /// Used when a caller supplies no TTL and when a remote entry carries no expiry.
    pub default_ttl: Duration,
    /// Payloads larger than this many bytes are compressed.
    pub compression_threshold: usize,
    pub eviction_fraction: f64,
    /// Namespace prepended to remote keys as `{prefix}:{key}`.
    pub key_prefix: String,
    pub redis_url: Option<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            local_capacity: 1000,
            default_ttl: Duration::from_secs(300),
            compression_threshold: 1024,
            eviction_fraction: 0.2,
            key_prefix: String::from("quotegate"),
            redis_url: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Hits served by the remote tier (also counted in `hits`).
    pub remote_hits: u64,
    pub evictions: u64,
    pub local_entries: usize,
    pub remote_enabled: bool,
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache payload codec error: {0}")]
    Codec(String),

    #[error("cache value serialization error: {0}")]
    Serialize(String),

    #[error("remote cache '{backend}' error: {message}")]
    Remote {
        backend: &'static str,
        message: String,
    },
}

impl From<redis::RedisError> for CacheError {
    fn from(error: redis::RedisError) -> Self {
        Self::Remote {
            backend: "redis",
            message: error.to_string(),
        }
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialize(error.to_string())
    }
}

/// Redis `KEYS`-style matching: `*` spans any run of characters, `?` exactly one.
/// Every other byte, `[`, `]` and `\` included, matches itself.
pub(crate) fn glob_match(pattern: &str, key: &str) -> bool {
    let pattern = pattern.as_bytes();
    let key = key.as_bytes();
    let (mut p, mut k) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while k < key.len() {
        match pattern.get(p) {
            Some(b'*') => {
                backtrack = Some((p, k));
                p += 1;
            }
            Some(&c) if c == b'?' || c == key[k] => {
                p += 1;
                k += 1;
            }
            _ => match backtrack {
                Some((star, matched)) => {
                    p = star + 1;
                    k = matched + 1;
                    backtrack = Some((star, matched + 1));
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|&c| c == b'*')
}

/// Local tier in front of an optional shared remote tier.
pub struct TieredCache {
    config: CacheConfig,
    local: LocalTier,
    remote: Option<Arc<dyn RemoteStore>>,
    hits: AtomicU64,
    misses: AtomicU64,
    remote_hits: AtomicU64,
    evictions: AtomicU64,
}

impl std::fmt::Debug for TieredCache {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TieredCache")
            .field("config", &self.config)
            .field("remote", &self.remote.as_ref().map(|remote| remote.name()))
            .finish_non_exhaustive()
    }
}

impl Default for TieredCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl TieredCache {
    /// Local-only cache.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            local: LocalTier::new(config.local_capacity, config.eviction_fraction),
            config,
            remote: None,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            remote_hits: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn with_remote(config: CacheConfig, remote: Arc<dyn RemoteStore>) -> Self {
        Self {
            remote: Some(remote),
            ..Self::new(config)
        }
    }

    /// Connects to `config.redis_url` when set. An unreachable server leaves the cache
    /// running local-only.
    pub async fn connect(config: CacheConfig) -> Self {
        let Some(url) = config.redis_url.clone() else {
            return Self::new(config);
        };
        match RedisStore::connect(&url).await {
            Ok(store) => {
                tracing::info!(backend = "redis", "remote cache tier connected");
                Self::with_remote(config, Arc::new(store))
            }
            Err(error) => {
                tracing::warn!(%error, "remote cache unavailable; continuing with local tier only");
                Self::new(config)
            }
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.config.default_ttl
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        if let Some(stored) = self.local.get(key).await {
            match decode_value(&stored) {
                Ok(value) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(key, tier = "local", "cache hit");
                    return Some(value);
                }
                Err(error) => {
                    tracing::warn!(key, %error, "dropping undecodable local cache entry");
                    self.local.remove(key).await;
                }
            }
        }

        if let Some(value) = self.get_remote(key).await {
            self.hits.fetch_add(1, Ordering::Relaxed);
            self.remote_hits.fetch_add(1, Ordering::Relaxed);
            return Some(value);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(key, "cache miss");
        None
    }

    async fn get_remote<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let remote = self.remote.as_ref()?;
        let remote_key = self.remote_key(key);

        let stored = match remote.get(&remote_key).await {
            Ok(stored) => stored?,
            Err(error) => {
                tracing::warn!(key, %error, "remote cache read failed; using local tier only");
                return None;
            }
        };
        let value = match decode_value(&stored) {
            Ok(value) => value,
            Err(error) => {
                tracing::warn!(key, %error, "undecodable remote cache entry");
                return None;
            }
        };

        // Promote with whatever lifetime the remote entry has left.
        match remote.ttl(&remote_key).await {
            Ok(Some(remaining)) if remaining.is_zero() => {}
            Ok(remaining) => {
                let ttl = remaining.unwrap_or(self.config.default_ttl);
                let evicted = self.local.set(key, stored, ttl).await;
                self.evictions.fetch_add(evicted as u64, Ordering::Relaxed);
            }
            Err(error) => {
                tracing::warn!(key, %error, "remote cache ttl lookup failed; not promoting");
            }
        }
        tracing::debug!(key, tier = "remote", "cache hit");
        Some(value)
    }

    /// Writes `value` to both tiers. A zero `ttl` stores nothing.
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        if ttl.is_zero() {
            return Ok(());
        }
        let json = serde_json::to_vec(value)?;
        let stored = codec::encode(&json, self.config.compression_threshold)?;

        if let Some(remote) = &self.remote {
            let seconds = ttl.as_millis().div_ceil(1000).max(1);
            let seconds = u64::try_from(seconds).unwrap_or(u64::MAX);
            if let Err(error) = remote
                .set_ex(&self.remote_key(key), stored.clone(), seconds)
                .await
            {
                tracing::warn!(key, %error, "remote cache write failed; stored locally only");
            }
        }

        let evicted = self.local.set(key, stored, ttl).await;
        self.evictions.fetch_add(evicted as u64, Ordering::Relaxed);
        Ok(())
    }

    /// Removes every key matching `pattern` from both tiers. Returns the local count.
    pub async fn invalidate(&self, pattern: &str) -> usize {
        let removed = self.local.invalidate(pattern).await;

        if let Some(remote) = &self.remote {
            let remote_pattern = self.remote_key(pattern);
            match remote.keys(&remote_pattern).await {
                Ok(keys) => {
                    if let Err(error) = remote.del(&keys).await {
                        tracing::warn!(pattern, %error, "remote cache invalidation failed");
                    }
                }
                Err(error) => {
                    tracing::warn!(pattern, %error, "remote cache key scan failed");
                }
            }
        }

        tracing::debug!(pattern, removed, "cache invalidated");
        removed
    }

    pub async fn clear(&self) {
        self.invalidate("*").await;
    }

    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            remote_hits: self.remote_hits.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            local_entries: self.local.len().await,
            remote_enabled: self.remote.is_some(),
        }
    }

    fn remote_key(&self, key: &str) -> String {
        format!("{}:{key}", self.config.key_prefix)
    }
}

fn decode_value<T: DeserializeOwned>(stored: &[u8]) -> Result<T, CacheError> {
    let json = codec::decode(stored)?;
    Ok(serde_json::from_slice(&json)?)
}
