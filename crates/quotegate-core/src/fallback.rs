//! Cache-aware, sequential vendor fallback.
//!
//! Vendors are attempted one after another in the order given (the primary first, then the
//! static priority order of the data type). The first success is written through to the cache
//! and returned; individual vendor errors never escape, they are collected into
//! [`GatewayError::AllSourcesFailed`].

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::time::Instant;

use crate::cache::{CacheKey, CacheOptions, TieredCache};
use crate::data_source::VendorFuture;
use crate::notify::{titles, Notification, NotificationSink};
use crate::{Completeness, DataSource, DataType, GatewayError, QualityScorer, VendorFailure};

const PRIMARY_RELIABILITY: f64 = 1.0;
const FALLBACK_RELIABILITY: f64 = 0.8;

pub struct FallbackExecutor {
    cache: Arc<TieredCache>,
    quality: Arc<QualityScorer>,
    sink: Arc<dyn NotificationSink>,
}

impl FallbackExecutor {
    pub fn new(
        cache: Arc<TieredCache>,
        quality: Arc<QualityScorer>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            cache,
            quality,
            sink,
        }
    }

    pub fn cache(&self) -> &Arc<TieredCache> {
        &self.cache
    }

    pub fn quality(&self) -> &Arc<QualityScorer> {
        &self.quality
    }

    /// Serves `key` from the cache when allowed, otherwise walks `sources` until one succeeds.
    ///
    /// `invoke` builds the vendor call for a source; it is only invoked for sources that are
    /// actually attempted.
    pub async fn execute_with_fallback<'s, T, F>(
        &self,
        data_type: DataType,
        key: Option<&CacheKey>,
        sources: &'s [Arc<dyn DataSource>],
        options: CacheOptions,
        mut invoke: F,
    ) -> Result<T, GatewayError>
    where
        T: Serialize + DeserializeOwned + Completeness + Send,
        F: FnMut(&'s dyn DataSource) -> VendorFuture<'s, T> + Send,
    {
        if let Some(key) = key.filter(|_| options.reads_cache()) {
            if let Some(cached) = self.cache.get::<T>(key.as_str()).await {
                return Ok(cached);
            }
        }

        let mut failures = Vec::with_capacity(sources.len());
        for (position, source) in sources.iter().enumerate() {
            let vendor = source.id();
            let started = Instant::now();
            tracing::debug!(%vendor, %data_type, position, "attempting vendor");

            match invoke(source.as_ref()).await {
                Ok(data) => {
                    let reliability = if position == 0 {
                        PRIMARY_RELIABILITY
                    } else {
                        FALLBACK_RELIABILITY
                    };
                    self.quality.record_outcome(
                        vendor,
                        data_type,
                        elapsed_ms(started),
                        data.completeness(),
                        reliability,
                    );

                    if let Some(primary) = sources.first().filter(|_| position > 0) {
                        self.sink.publish(Notification::warning(
                            titles::FALLBACK_USED,
                            format!(
                                "{} unavailable for {data_type}; served by {vendor}",
                                primary.id()
                            ),
                        ));
                    }

                    if let Some(key) = key.filter(|_| options.writes_cache()) {
                        let ttl = options.ttl.unwrap_or_else(|| data_type.default_ttl());
                        if let Err(error) = self.cache.set(key.as_str(), &data, ttl).await {
                            tracing::warn!(%key, %error, "cache write-through failed");
                        }
                    }
                    return Ok(data);
                }
                Err(error) => {
                    self.quality
                        .record_outcome(vendor, data_type, elapsed_ms(started), 0.0, 0.0);
                    tracing::warn!(%vendor, %data_type, %error, "vendor call failed");
                    failures.push(VendorFailure { vendor, error });
                }
            }
        }

        let attempted = failures
            .iter()
            .map(|failure| failure.vendor.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        self.sink.publish(Notification::error(
            titles::RETRIEVAL_FAILED,
            format!("no vendor could serve {data_type} (tried: {attempted})"),
        ));
        Err(GatewayError::AllSourcesFailed {
            data_type,
            failures,
        })
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::data_source::{CapabilitySet, VendorError};
    use crate::domain::{BarSeries, CompanyProfile, MarketStatus, NewsArticle, Quote};
    use crate::notify::MemorySink;
    use crate::{BarsRequest, CircuitState, Symbol, UtcDateTime, VendorId};

    /// Serves fixed quotes, or fails every call when `fail` is set.
    struct FixedSource {
        vendor: VendorId,
        fail: bool,
        calls: AtomicU32,
    }

    impl FixedSource {
        fn new(vendor: VendorId, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                vendor,
                fail,
                calls: AtomicU32::new(0),
            })
        }
    }

    impl DataSource for FixedSource {
        fn id(&self) -> VendorId {
            self.vendor
        }

        fn capabilities(&self) -> CapabilitySet {
            CapabilitySet::full()
        }

        fn circuit_state(&self) -> CircuitState {
            CircuitState::Closed
        }

        fn quote<'a>(&'a self, symbol: &'a Symbol) -> VendorFuture<'a, Quote> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                if self.fail {
                    return Err(VendorError::from_status(self.vendor, 503, "down"));
                }
                Quote::new(symbol.clone(), 100.0, None, None, None, "USD", UtcDateTime::now())
                    .map_err(|error| VendorError::decode(self.vendor, error.to_string()))
            })
        }

        fn quotes<'a>(&'a self, _symbols: &'a [Symbol]) -> VendorFuture<'a, Vec<Quote>> {
            Box::pin(async move { Ok(Vec::new()) })
        }

        fn bars<'a>(&'a self, _req: &'a BarsRequest) -> VendorFuture<'a, BarSeries> {
            Box::pin(async move { Err(VendorError::unsupported(self.vendor, "bars")) })
        }

        fn company_info<'a>(&'a self, _symbol: &'a Symbol) -> VendorFuture<'a, CompanyProfile> {
            Box::pin(async move { Err(VendorError::unsupported(self.vendor, "company_info")) })
        }

        fn news<'a>(
            &'a self,
            _symbol: &'a Symbol,
            _limit: usize,
        ) -> VendorFuture<'a, Vec<NewsArticle>> {
            Box::pin(async move { Ok(Vec::new()) })
        }

        fn market_status<'a>(&'a self) -> VendorFuture<'a, MarketStatus> {
            Box::pin(async move { Err(VendorError::unsupported(self.vendor, "market_status")) })
        }
    }

    fn executor(sink: Arc<MemorySink>) -> FallbackExecutor {
        FallbackExecutor::new(
            Arc::new(TieredCache::default()),
            Arc::new(QualityScorer::new()),
            sink,
        )
    }

    fn symbol() -> Symbol {
        Symbol::parse("AAPL").expect("valid symbol")
    }

    #[tokio::test]
    async fn fallback_success_is_cached_and_announced_once() {
        let sink = Arc::new(MemorySink::new());
        let executor = executor(sink.clone());
        let primary = FixedSource::new(VendorId::Alpaca, true);
        let secondary = FixedSource::new(VendorId::Polygon, false);
        let sources: Vec<Arc<dyn DataSource>> = vec![primary.clone(), secondary.clone()];
        let symbol = symbol();
        let key = CacheKey::derive("get_quote", &symbol);

        let quote = executor
            .execute_with_fallback(
                DataType::Quote,
                Some(&key),
                &sources,
                CacheOptions::default(),
                |source| source.quote(&symbol),
            )
            .await
            .expect("fallback succeeds");
        assert_eq!(quote.price, 100.0);
        assert_eq!(sink.count_titled(titles::FALLBACK_USED), 1);

        let record = executor
            .quality()
            .record(VendorId::Polygon, DataType::Quote)
            .expect("fallback scored");
        assert_eq!(record.reliability, 0.8);

        executor
            .execute_with_fallback(
                DataType::Quote,
                Some(&key),
                &sources,
                CacheOptions::default(),
                |source| source.quote(&symbol),
            )
            .await
            .expect("cached");
        assert_eq!(primary.calls.load(Ordering::SeqCst), 1);
        assert_eq!(secondary.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausted_sources_report_every_failure() {
        let sink = Arc::new(MemorySink::new());
        let executor = executor(sink.clone());
        let sources: Vec<Arc<dyn DataSource>> = vec![
            FixedSource::new(VendorId::Alpaca, true),
            FixedSource::new(VendorId::Polygon, true),
        ];
        let symbol = symbol();

        let error = executor
            .execute_with_fallback(
                DataType::Quote,
                None,
                &sources,
                CacheOptions::default(),
                |source| source.quote(&symbol),
            )
            .await
            .expect_err("all fail");

        let vendors = error.failures().iter().map(|f| f.vendor).collect::<Vec<_>>();
        assert_eq!(vendors, vec![VendorId::Alpaca, VendorId::Polygon]);
        assert_eq!(sink.count_titled(titles::RETRIEVAL_FAILED), 1);
        assert_eq!(sink.count_titled(titles::FALLBACK_USED), 0);
    }

    #[tokio::test]
    async fn bypass_neither_reads_nor_writes() {
        let executor = executor(Arc::new(MemorySink::new()));
        let source = FixedSource::new(VendorId::Alpaca, false);
        let sources: Vec<Arc<dyn DataSource>> = vec![source.clone()];
        let symbol = symbol();
        let key = CacheKey::derive("get_quote", &symbol);

        for _ in 0..2 {
            executor
                .execute_with_fallback(
                    DataType::Quote,
                    Some(&key),
                    &sources,
                    CacheOptions::no_cache(),
                    |source| source.quote(&symbol),
                )
                .await
                .expect("quote");
        }

        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        assert_eq!(executor.cache().stats().await.local_entries, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_ttl_overrides_data_type_default() {
        let executor = executor(Arc::new(MemorySink::new()));
        let source = FixedSource::new(VendorId::Alpaca, false);
        let sources: Vec<Arc<dyn DataSource>> = vec![source.clone()];
        let symbol = symbol();
        let key = CacheKey::derive("get_quote", &symbol);
        let options = CacheOptions::default().with_ttl(Duration::from_millis(200));

        for _ in 0..2 {
            executor
                .execute_with_fallback(DataType::Quote, Some(&key), &sources, options, |source| {
                    source.quote(&symbol)
                })
                .await
                .expect("quote");
            tokio::time::advance(Duration::from_millis(250)).await;
        }

        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }
}
