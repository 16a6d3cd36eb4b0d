//! Behaviour tests for the tiered cache: expiry, eviction, promotion, compression,
//! invalidation and degraded operation.

use std::sync::Arc;
use std::time::Duration;

use quotegate_core::cache::codec;
use quotegate_core::{CacheConfig, MemoryStore, RemoteStore, TieredCache};

fn shared_cache(remote: &Arc<MemoryStore>) -> TieredCache {
    TieredCache::with_remote(CacheConfig::default(), Arc::clone(remote) as Arc<dyn RemoteStore>)
}

// =============================================================================
// Expiry
// =============================================================================

#[tokio::test(start_paused = true)]
async fn value_is_served_until_ttl_and_missed_one_millisecond_later() {
    // Given: a value stored for 1000 ms in both tiers
    let remote = Arc::new(MemoryStore::new());
    let cache = shared_cache(&remote);
    cache
        .set("get_quote:AAPL", &185.2_f64, Duration::from_millis(1000))
        .await
        .expect("set");

    // When / Then: an immediate read hits
    assert_eq!(cache.get::<f64>("get_quote:AAPL").await, Some(185.2));

    // When / Then: a read 1001 ms later misses in both tiers
    tokio::time::advance(Duration::from_millis(1001)).await;
    assert_eq!(cache.get::<f64>("get_quote:AAPL").await, None);
    assert!(remote.is_empty());
}

// =============================================================================
// Eviction
// =============================================================================

#[tokio::test(start_paused = true)]
async fn full_local_tier_sheds_oldest_fifth_and_keeps_newest() {
    // Given: a local tier of 10 entries filled one millisecond apart
    let cache = TieredCache::new(CacheConfig {
        local_capacity: 10,
        ..CacheConfig::default()
    });
    for index in 0..10_u32 {
        cache
            .set(&format!("key-{index}"), &index, Duration::from_secs(300))
            .await
            .expect("set");
        tokio::time::advance(Duration::from_millis(1)).await;
    }

    // When: one more entry is added
    cache
        .set("key-new", &99_u32, Duration::from_secs(300))
        .await
        .expect("set");

    // Then: the two oldest are gone and the newest is readable
    let stats = cache.stats().await;
    assert_eq!(stats.evictions, 2);
    assert_eq!(stats.local_entries, 9);
    assert_eq!(cache.get::<u32>("key-0").await, None);
    assert_eq!(cache.get::<u32>("key-1").await, None);
    assert_eq!(cache.get::<u32>("key-2").await, Some(2));
    assert_eq!(cache.get::<u32>("key-new").await, Some(99));
}

// =============================================================================
// Remote tier
// =============================================================================

#[tokio::test(start_paused = true)]
async fn remote_hit_is_promoted_with_remaining_lifetime() {
    // Given: one process wrote a value with 10 s TTL to the shared tier
    let remote = Arc::new(MemoryStore::new());
    shared_cache(&remote)
        .set("get_news:AAPL", &vec!["headline"], Duration::from_secs(10))
        .await
        .expect("set");
    tokio::time::advance(Duration::from_secs(4)).await;

    // When: another process reads it
    let reader = shared_cache(&remote);
    let news = reader.get::<Vec<String>>("get_news:AAPL").await;

    // Then: it is served and copied locally for the remaining ~6 s only
    assert_eq!(news, Some(vec![String::from("headline")]));
    assert_eq!(reader.stats().await.remote_hits, 1);
    assert_eq!(reader.stats().await.local_entries, 1);

    tokio::time::advance(Duration::from_secs(7)).await;
    assert_eq!(reader.get::<Vec<String>>("get_news:AAPL").await, None);
}

#[tokio::test]
async fn large_payloads_are_compressed_in_the_shared_tier() {
    // Given: a payload well above the 1 KiB threshold
    let remote = Arc::new(MemoryStore::new());
    let cache = shared_cache(&remote);
    let bars = (0..500).map(|index| format!("bar-{index}")).collect::<Vec<_>>();

    // When: it is stored
    cache
        .set("get_bars:AAPL", &bars, Duration::from_secs(60))
        .await
        .expect("set");

    // Then: the stored bytes are flagged as compressed and decode transparently
    let stored = remote
        .get("quotegate:get_bars:AAPL")
        .await
        .expect("remote get")
        .expect("present");
    assert!(codec::is_compressed(&stored));
    let fresh = shared_cache(&remote);
    assert_eq!(fresh.get::<Vec<String>>("get_bars:AAPL").await, Some(bars));
}

#[tokio::test]
async fn invalidate_removes_matching_keys_from_both_tiers() {
    // Given: quotes and news cached in both tiers
    let remote = Arc::new(MemoryStore::new());
    let cache = shared_cache(&remote);
    for key in ["get_quote:AAPL", "get_quote:MSFT", "get_news:AAPL"] {
        cache.set(key, &1_u8, Duration::from_secs(60)).await.expect("set");
    }

    // When: every quote is invalidated
    let removed = cache.invalidate("get_quote:*").await;

    // Then: news survives everywhere, quotes are gone everywhere
    assert_eq!(removed, 2);
    assert_eq!(
        remote.keys("quotegate:*").await.expect("keys"),
        vec![String::from("quotegate:get_news:AAPL")]
    );
    assert_eq!(cache.get::<u8>("get_quote:AAPL").await, None);
    assert_eq!(cache.get::<u8>("get_news:AAPL").await, Some(1));
}

#[tokio::test]
async fn remote_outage_degrades_to_local_tier() {
    // Given: a shared tier that stops answering
    let remote = Arc::new(MemoryStore::new());
    let cache = shared_cache(&remote);
    remote.set_unavailable(true);

    // When: values are written and read
    cache
        .set("get_quote:AAPL", &1.5_f64, Duration::from_secs(60))
        .await
        .expect("set succeeds locally");

    // Then: the local tier keeps serving
    assert_eq!(cache.get::<f64>("get_quote:AAPL").await, Some(1.5));
    assert!(cache.stats().await.remote_enabled);
}

#[tokio::test]
async fn unreachable_redis_leaves_a_local_only_cache() {
    // Given: a Redis URL nothing listens on
    let config = CacheConfig {
        redis_url: Some(String::from("redis://127.0.0.1:1/0")),
        ..CacheConfig::default()
    };

    // When: the cache connects
    let cache = TieredCache::connect(config).await;

    // Then: it runs without a remote tier
    assert!(!cache.has_remote());
    cache.set("k", &1_u8, Duration::from_secs(1)).await.expect("set");
    assert_eq!(cache.get::<u8>("k").await, Some(1));
}
