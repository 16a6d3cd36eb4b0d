use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;

use super::glob_match;

#[derive(Debug, Clone)]
struct LocalEntry {
    bytes: Vec<u8>,
    stored_at: Instant,
    expires_at: Instant,
    /// Insertion order; breaks `stored_at` ties.
    seq: u64,
}

impl LocalEntry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

#[derive(Debug, Default)]
struct LocalInner {
    map: HashMap<String, LocalEntry>,
    next_seq: u64,
}

/// Bounded in-process tier. Expired entries are dropped on read; a full tier sheds its
/// oldest entries by store time.
#[derive(Debug)]
pub struct LocalTier {
    inner: RwLock<LocalInner>,
    capacity: usize,
    eviction_fraction: f64,
}

impl LocalTier {
    pub fn new(capacity: usize, eviction_fraction: f64) -> Self {
        Self {
            inner: RwLock::new(LocalInner::default()),
            capacity: capacity.max(1),
            eviction_fraction: eviction_fraction.clamp(0.0, 1.0),
        }
    }

    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let now = Instant::now();
        {
            let store = self.inner.read().await;
            match store.map.get(key) {
                None => return None,
                Some(entry) if entry.is_live(now) => return Some(entry.bytes.clone()),
                Some(_) => {}
            }
        }

        let mut store = self.inner.write().await;
        if store
            .map
            .get(key)
            .is_some_and(|entry| !entry.is_live(Instant::now()))
        {
            store.map.remove(key);
        }
        None
    }

    /// Stores `bytes` for `ttl`. Returns how many entries were evicted to make room.
    pub async fn set(&self, key: &str, bytes: Vec<u8>, ttl: Duration) -> usize {
        let now = Instant::now();
        let mut store = self.inner.write().await;

        let evicted = if !store.map.contains_key(key) && store.map.len() >= self.capacity {
            self.evict_oldest(&mut store)
        } else {
            0
        };

        let seq = store.next_seq;
        store.next_seq = store.next_seq.wrapping_add(1);
        store.map.insert(
            key.to_owned(),
            LocalEntry {
                bytes,
                stored_at: now,
                expires_at: now + ttl,
                seq,
            },
        );
        evicted
    }

    fn evict_oldest(&self, store: &mut LocalInner) -> usize {
        let len = store.map.len();
        let count = ((len as f64 * self.eviction_fraction).ceil() as usize).clamp(1, len);

        let mut by_age = store
            .map
            .iter()
            .map(|(key, entry)| (entry.stored_at, entry.seq, key.clone()))
            .collect::<Vec<_>>();
        by_age.sort_unstable_by(|left, right| (left.0, left.1).cmp(&(right.0, right.1)));

        for (_, _, key) in by_age.into_iter().take(count) {
            store.map.remove(&key);
        }
        tracing::debug!(evicted = count, capacity = self.capacity, "local cache eviction");
        count
    }

    pub async fn remove(&self, key: &str) -> bool {
        self.inner.write().await.map.remove(key).is_some()
    }

    pub async fn invalidate(&self, pattern: &str) -> usize {
        let mut store = self.inner.write().await;
        let before = store.map.len();
        store.map.retain(|key, _| !glob_match(pattern, key));
        before - store.map.len()
    }

    pub async fn clear(&self) {
        self.inner.write().await.map.clear();
    }

    /// Entry count including entries that expired but were not read since.
    pub async fn len(&self) -> usize {
        self.inner.read().await.map.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn expired_entries_are_deleted_on_read() {
        let tier = LocalTier::new(10, 0.2);
        tier.set("k", vec![1], Duration::from_millis(1000)).await;

        assert_eq!(tier.get("k").await, Some(vec![1]));
        tokio::time::advance(Duration::from_millis(1001)).await;
        assert_eq!(tier.get("k").await, None);
        assert!(tier.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn full_tier_evicts_oldest_fifth() {
        let tier = LocalTier::new(10, 0.2);
        for index in 0..10 {
            tier.set(&format!("k{index}"), vec![index], Duration::from_secs(60))
                .await;
            tokio::time::advance(Duration::from_millis(1)).await;
        }

        let evicted = tier.set("newest", vec![99], Duration::from_secs(60)).await;

        assert_eq!(evicted, 2);
        assert_eq!(tier.len().await, 9);
        assert_eq!(tier.get("k0").await, None);
        assert_eq!(tier.get("k1").await, None);
        assert_eq!(tier.get("k2").await, Some(vec![2]));
        assert_eq!(tier.get("newest").await, Some(vec![99]));
    }

    #[tokio::test(start_paused = true)]
    async fn same_instant_entries_evict_in_insertion_order() {
        let tier = LocalTier::new(5, 0.2);
        for index in 0..5 {
            tier.set(&format!("k{index}"), vec![index], Duration::from_secs(60))
                .await;
        }

        tier.set("extra", vec![5], Duration::from_secs(60)).await;

        assert_eq!(tier.get("k0").await, None);
        assert_eq!(tier.get("k1").await, Some(vec![1]));
    }

    #[tokio::test]
    async fn overwrite_does_not_evict() {
        let tier = LocalTier::new(2, 0.2);
        tier.set("a", vec![1], Duration::from_secs(60)).await;
        tier.set("b", vec![2], Duration::from_secs(60)).await;

        assert_eq!(tier.set("a", vec![3], Duration::from_secs(60)).await, 0);
        assert_eq!(tier.get("a").await, Some(vec![3]));
        assert_eq!(tier.get("b").await, Some(vec![2]));
    }

    #[tokio::test]
    async fn invalidate_removes_matching_keys() {
        let tier = LocalTier::new(10, 0.2);
        tier.set("get_quote:[\"AAPL\"]", vec![1], Duration::from_secs(60)).await;
        tier.set("get_quote:[\"MSFT\"]", vec![2], Duration::from_secs(60)).await;
        tier.set("get_news:[\"AAPL\",5]", vec![3], Duration::from_secs(60)).await;

        assert_eq!(tier.invalidate("get_quote:*").await, 2);
        assert_eq!(tier.len().await, 1);
    }
}
