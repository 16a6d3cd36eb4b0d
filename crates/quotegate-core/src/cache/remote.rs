use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::time::Instant;

use super::{glob_match, CacheError};

/// Boxed future returned by [`RemoteStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, CacheError>> + Send + 'a>>;

/// Shared key-value tier with `GET`, `SET EX`, `DEL`, `EXISTS`, `TTL` and `KEYS` semantics.
pub trait RemoteStore: Send + Sync {
    fn name(&self) -> &'static str;

    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<Vec<u8>>>;

    /// Stores `value` for `ttl_secs` seconds.
    fn set_ex<'a>(&'a self, key: &'a str, value: Vec<u8>, ttl_secs: u64) -> StoreFuture<'a, ()>;

    fn del<'a>(&'a self, keys: &'a [String]) -> StoreFuture<'a, usize>;

    fn exists<'a>(&'a self, key: &'a str) -> StoreFuture<'a, bool>;

    /// Remaining lifetime; `None` when the key is missing or has no expiry.
    fn ttl<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<Duration>>;

    fn keys<'a>(&'a self, pattern: &'a str) -> StoreFuture<'a, Vec<String>>;
}

/// Redis-backed remote tier.
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore").finish_non_exhaustive()
    }
}

impl RedisStore {
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

    /// Opens a managed connection, failing if the server does not answer in time.
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(url)?;
        let connection =
            tokio::time::timeout(Self::CONNECT_TIMEOUT, client.get_connection_manager())
                .await
                .map_err(|_| CacheError::Remote {
                    backend: "redis",
                    message: format!(
                        "connection timed out after {} s",
                        Self::CONNECT_TIMEOUT.as_secs()
                    ),
                })??;
        Ok(Self { connection })
    }
}

impl RemoteStore for RedisStore {
    fn name(&self) -> &'static str {
        "redis"
    }

    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<Vec<u8>>> {
        let mut connection = self.connection.clone();
        Box::pin(async move { Ok(connection.get::<_, Option<Vec<u8>>>(key).await?) })
    }

    fn set_ex<'a>(&'a self, key: &'a str, value: Vec<u8>, ttl_secs: u64) -> StoreFuture<'a, ()> {
        let mut connection = self.connection.clone();
        Box::pin(async move {
            connection
                .set_ex::<_, _, ()>(key, value, ttl_secs.max(1))
                .await?;
            Ok(())
        })
    }

    fn del<'a>(&'a self, keys: &'a [String]) -> StoreFuture<'a, usize> {
        let mut connection = self.connection.clone();
        Box::pin(async move {
            if keys.is_empty() {
                return Ok(0);
            }
            Ok(connection.del::<_, usize>(keys).await?)
        })
    }

    fn exists<'a>(&'a self, key: &'a str) -> StoreFuture<'a, bool> {
        let mut connection = self.connection.clone();
        Box::pin(async move { Ok(connection.exists::<_, bool>(key).await?) })
    }

    fn ttl<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<Duration>> {
        let mut connection = self.connection.clone();
        Box::pin(async move {
            let seconds = connection.ttl::<_, i64>(key).await?;
            // -2: missing, -1: no expiry.
            Ok(u64::try_from(seconds).ok().map(Duration::from_secs))
        })
    }

    fn keys<'a>(&'a self, pattern: &'a str) -> StoreFuture<'a, Vec<String>> {
        let mut connection = self.connection.clone();
        let pattern = escape_class_syntax(pattern);
        Box::pin(async move { Ok(connection.keys::<_, Vec<String>>(pattern).await?) })
    }
}

/// Escapes `[`, `]` and `\` so Redis matches them literally, as the local tier does.
/// Cache keys embed JSON arrays, which Redis would otherwise read as character classes.
fn escape_class_syntax(pattern: &str) -> String {
    let mut escaped = String::with_capacity(pattern.len());
    for ch in pattern.chars() {
        if matches!(ch, '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

#[derive(Debug, Clone)]
struct StoredValue {
    bytes: Vec<u8>,
    expires_at: Instant,
}

/// In-process stand-in for a shared store, with second-granularity expiry like Redis.
///
/// `set_unavailable(true)` makes every call fail, which exercises degraded operation.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, StoredValue>>,
    unavailable: Mutex<bool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.lock().unwrap_or_else(PoisonError::into_inner) = unavailable;
    }

    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.lock()
            .values()
            .filter(|value| value.expires_at > now)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, StoredValue>> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check(&self) -> Result<(), CacheError> {
        if *self.unavailable.lock().unwrap_or_else(PoisonError::into_inner) {
            return Err(CacheError::Remote {
                backend: "memory",
                message: String::from("store unavailable"),
            });
        }
        Ok(())
    }

    fn live(&self, key: &str) -> Option<StoredValue> {
        let now = Instant::now();
        let mut values = self.lock();
        match values.get(key) {
            Some(value) if value.expires_at > now => Some(value.clone()),
            Some(_) => {
                values.remove(key);
                None
            }
            None => None,
        }
    }
}

impl RemoteStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<Vec<u8>>> {
        Box::pin(async move {
            self.check()?;
            Ok(self.live(key).map(|value| value.bytes))
        })
    }

    fn set_ex<'a>(&'a self, key: &'a str, value: Vec<u8>, ttl_secs: u64) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.check()?;
            self.lock().insert(
                key.to_owned(),
                StoredValue {
                    bytes: value,
                    expires_at: Instant::now() + Duration::from_secs(ttl_secs.max(1)),
                },
            );
            Ok(())
        })
    }

    fn del<'a>(&'a self, keys: &'a [String]) -> StoreFuture<'a, usize> {
        Box::pin(async move {
            self.check()?;
            let mut values = self.lock();
            Ok(keys
                .iter()
                .filter(|key| values.remove(key.as_str()).is_some())
                .count())
        })
    }

    fn exists<'a>(&'a self, key: &'a str) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            self.check()?;
            Ok(self.live(key).is_some())
        })
    }

    fn ttl<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<Duration>> {
        Box::pin(async move {
            self.check()?;
            Ok(self.live(key).map(|value| {
                // Redis reports whole seconds.
                let remaining = value.expires_at.saturating_duration_since(Instant::now());
                Duration::from_secs(remaining.as_secs())
            }))
        })
    }

    fn keys<'a>(&'a self, pattern: &'a str) -> StoreFuture<'a, Vec<String>> {
        Box::pin(async move {
            self.check()?;
            let now = Instant::now();
            let mut keys = self
                .lock()
                .iter()
                .filter(|(key, value)| value.expires_at > now && glob_match(pattern, key))
                .map(|(key, _)| key.clone())
                .collect::<Vec<_>>();
            keys.sort();
            Ok(keys)
        })
    }
}
