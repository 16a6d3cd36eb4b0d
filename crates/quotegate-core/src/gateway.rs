//! Single entry point over every registered vendor.
//!
//! | Method | Data type | Cached |
//! |--------|-----------|--------|
//! | [`get_quote`](UnifiedGateway::get_quote) | `quote` | yes |
//! | [`get_quotes`](UnifiedGateway::get_quotes) | `quotes` | yes |
//! | [`get_bars`](UnifiedGateway::get_bars) | `bars` | yes |
//! | [`get_company_info`](UnifiedGateway::get_company_info) | `company_info` | yes |
//! | [`get_news`](UnifiedGateway::get_news) | `news` | yes |
//! | [`get_market_status`](UnifiedGateway::get_market_status) | `market_status` | yes |
//! | [`get_account`](UnifiedGateway::get_account) | `account` | yes |
//! | [`get_positions`](UnifiedGateway::get_positions), [`get_position`](UnifiedGateway::get_position) | `positions` | yes |
//! | [`get_orders`](UnifiedGateway::get_orders) | `orders` | yes |
//! | [`place_order`](UnifiedGateway::place_order), [`cancel_order`](UnifiedGateway::cancel_order) | `trading` | never |
//!
//! Order placement and cancellation invalidate cached account, position and order entries.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use crate::adapters::{AlpacaAdapter, FmpAdapter, PolygonAdapter};
use crate::cache::{CacheOptions, CacheStats, RemoteStore, TieredCache};
use crate::domain::{
    Account, BarSeries, CompanyProfile, MarketStatus, NewsArticle, Order, OrderRequest,
    OrdersQuery, Position, Quote,
};
use crate::fallback::FallbackExecutor;
use crate::http_client::{HttpClient, ReqwestHttpClient};
use crate::notify::{NotificationSink, TracingSink};
use crate::prefetch::{
    PrefetchHandle, PrefetchRefresher, PrefetchReport, QueryReplayer, ReplayFuture,
};
use crate::query::{GatewayQuery, TRADING_STATE_PATTERNS};
use crate::{
    BarsRequest, CapabilitySet, CircuitState, DataSource, DataType, GatewayConfig, GatewayError,
    QualityScorer, Symbol, ValidationError, VendorId,
};

/// Registered vendor as reported by [`UnifiedGateway::vendors`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VendorSnapshot {
    pub id: VendorId,
    pub capabilities: CapabilitySet,
    pub circuit: CircuitState,
}

pub struct UnifiedGateway {
    sources: BTreeMap<VendorId, Arc<dyn DataSource>>,
    executor: FallbackExecutor,
    prefetch: Arc<PrefetchRefresher>,
    sink: Arc<dyn NotificationSink>,
}

impl std::fmt::Debug for UnifiedGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnifiedGateway")
            .field("vendors", &self.sources.keys().collect::<Vec<_>>())
            .field("cache", self.executor.cache())
            .finish_non_exhaustive()
    }
}

impl UnifiedGateway {
    pub fn builder(config: GatewayConfig) -> GatewayBuilder {
        GatewayBuilder::new(config)
    }

    /// Registered vendors that serve `data_type`, in its static priority order.
    fn sources_for(&self, data_type: DataType) -> Vec<Arc<dyn DataSource>> {
        data_type
            .priority()
            .iter()
            .filter_map(|vendor| self.sources.get(vendor))
            .filter(|source| source.capabilities().supports(data_type))
            .cloned()
            .collect()
    }

    /// Queues successful foreground reads for background refresh.
    fn remember(&self, query: GatewayQuery, options: CacheOptions) {
        if options.reads_cache() {
            self.prefetch.enqueue(query);
        }
    }

    pub async fn get_quote(
        &self,
        symbol: &Symbol,
        options: CacheOptions,
    ) -> Result<Quote, GatewayError> {
        let query = GatewayQuery::Quote {
            symbol: symbol.clone(),
        };
        let sources = self.sources_for(DataType::Quote);
        let quote = self
            .executor
            .execute_with_fallback(
                DataType::Quote,
                Some(&query.cache_key()),
                &sources,
                options,
                |source| source.quote(symbol),
            )
            .await?;
        self.remember(query, options);
        Ok(quote)
    }

    pub async fn get_quotes(
        &self,
        symbols: &[Symbol],
        options: CacheOptions,
    ) -> Result<Vec<Quote>, GatewayError> {
        if symbols.is_empty() {
            return Err(ValidationError::EmptySymbolList.into());
        }
        let query = GatewayQuery::Quotes {
            symbols: symbols.to_vec(),
        };
        let sources = self.sources_for(DataType::Quotes);
        let quotes = self
            .executor
            .execute_with_fallback(
                DataType::Quotes,
                Some(&query.cache_key()),
                &sources,
                options,
                |source| source.quotes(symbols),
            )
            .await?;
        self.remember(query, options);
        Ok(quotes)
    }

    pub async fn get_bars(
        &self,
        request: &BarsRequest,
        options: CacheOptions,
    ) -> Result<BarSeries, GatewayError> {
        let query = GatewayQuery::Bars {
            request: request.clone(),
        };
        let sources = self.sources_for(DataType::Bars);
        let series = self
            .executor
            .execute_with_fallback(
                DataType::Bars,
                Some(&query.cache_key()),
                &sources,
                options,
                |source| source.bars(request),
            )
            .await?;
        self.remember(query, options);
        Ok(series)
    }

    pub async fn get_company_info(
        &self,
        symbol: &Symbol,
        options: CacheOptions,
    ) -> Result<CompanyProfile, GatewayError> {
        let query = GatewayQuery::CompanyInfo {
            symbol: symbol.clone(),
        };
        let sources = self.sources_for(DataType::CompanyInfo);
        let profile = self
            .executor
            .execute_with_fallback(
                DataType::CompanyInfo,
                Some(&query.cache_key()),
                &sources,
                options,
                |source| source.company_info(symbol),
            )
            .await?;
        self.remember(query, options);
        Ok(profile)
    }

    pub async fn get_news(
        &self,
        symbol: &Symbol,
        limit: usize,
        options: CacheOptions,
    ) -> Result<Vec<NewsArticle>, GatewayError> {
        if limit == 0 {
            return Err(ValidationError::ZeroLimit.into());
        }
        let query = GatewayQuery::News {
            symbol: symbol.clone(),
            limit,
        };
        let sources = self.sources_for(DataType::News);
        let articles = self
            .executor
            .execute_with_fallback(
                DataType::News,
                Some(&query.cache_key()),
                &sources,
                options,
                |source| source.news(symbol, limit),
            )
            .await?;
        self.remember(query, options);
        Ok(articles)
    }

    pub async fn get_market_status(
        &self,
        options: CacheOptions,
    ) -> Result<MarketStatus, GatewayError> {
        let query = GatewayQuery::MarketStatus;
        let sources = self.sources_for(DataType::MarketStatus);
        let status = self
            .executor
            .execute_with_fallback(
                DataType::MarketStatus,
                Some(&query.cache_key()),
                &sources,
                options,
                |source| source.market_status(),
            )
            .await?;
        self.remember(query, options);
        Ok(status)
    }

    pub async fn get_account(&self, options: CacheOptions) -> Result<Account, GatewayError> {
        let query = GatewayQuery::Account;
        let sources = self.sources_for(DataType::Account);
        let account = self
            .executor
            .execute_with_fallback(
                DataType::Account,
                Some(&query.cache_key()),
                &sources,
                options,
                |source| source.account(),
            )
            .await?;
        self.remember(query, options);
        Ok(account)
    }

    pub async fn get_positions(
        &self,
        options: CacheOptions,
    ) -> Result<Vec<Position>, GatewayError> {
        let query = GatewayQuery::Positions;
        let sources = self.sources_for(DataType::Positions);
        let positions = self
            .executor
            .execute_with_fallback(
                DataType::Positions,
                Some(&query.cache_key()),
                &sources,
                options,
                |source| source.positions(),
            )
            .await?;
        self.remember(query, options);
        Ok(positions)
    }

    /// `Ok(None)` when the broker holds no position in `symbol`.
    pub async fn get_position(
        &self,
        symbol: &Symbol,
        options: CacheOptions,
    ) -> Result<Option<Position>, GatewayError> {
        let query = GatewayQuery::Position {
            symbol: symbol.clone(),
        };
        let sources = self.sources_for(DataType::Positions);
        let position = self
            .executor
            .execute_with_fallback(
                DataType::Positions,
                Some(&query.cache_key()),
                &sources,
                options,
                |source| source.position(symbol),
            )
            .await?;
        self.remember(query, options);
        Ok(position)
    }

    pub async fn get_orders(
        &self,
        orders: &OrdersQuery,
        options: CacheOptions,
    ) -> Result<Vec<Order>, GatewayError> {
        let query = GatewayQuery::Orders {
            query: orders.clone(),
        };
        let sources = self.sources_for(DataType::Orders);
        let listed = self
            .executor
            .execute_with_fallback(
                DataType::Orders,
                Some(&query.cache_key()),
                &sources,
                options,
                |source| source.orders(orders),
            )
            .await?;
        self.remember(query, options);
        Ok(listed)
    }

    pub async fn place_order(&self, order: &OrderRequest) -> Result<Order, GatewayError> {
        let sources = self.sources_for(DataType::Trading);
        let placed = self
            .executor
            .execute_with_fallback(
                DataType::Trading,
                None,
                &sources,
                CacheOptions::no_cache(),
                |source| source.place_order(order),
            )
            .await?;
        tracing::info!(
            order_id = %placed.id,
            client_order_id = %order.client_order_id,
            symbol = %order.symbol,
            "order placed"
        );
        self.invalidate_trading_state().await;
        Ok(placed)
    }

    pub async fn cancel_order(&self, order_id: &str) -> Result<(), GatewayError> {
        if order_id.trim().is_empty() {
            return Err(ValidationError::EmptyOrderId.into());
        }
        let sources = self.sources_for(DataType::Trading);
        self.executor
            .execute_with_fallback(
                DataType::Trading,
                None,
                &sources,
                CacheOptions::no_cache(),
                |source| source.cancel_order(order_id),
            )
            .await?;
        tracing::info!(order_id, "order canceled");
        self.invalidate_trading_state().await;
        Ok(())
    }

    async fn invalidate_trading_state(&self) {
        for pattern in TRADING_STATE_PATTERNS {
            self.executor.cache().invalidate(pattern).await;
        }
    }

    /// Vendors ordered best-first by recorded quality for `data_type`.
    pub fn vendor_ranking(&self, data_type: DataType) -> Vec<VendorId> {
        self.executor.quality().rank(data_type)
    }

    pub fn quality(&self) -> &QualityScorer {
        self.executor.quality()
    }

    pub fn circuit_states(&self) -> BTreeMap<VendorId, CircuitState> {
        self.sources
            .iter()
            .map(|(vendor, source)| (*vendor, source.circuit_state()))
            .collect()
    }

    pub fn vendors(&self) -> Vec<VendorSnapshot> {
        self.sources
            .values()
            .map(|source| VendorSnapshot {
                id: source.id(),
                capabilities: source.capabilities(),
                circuit: source.circuit_state(),
            })
            .collect()
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.executor.cache().stats().await
    }

    pub fn cache(&self) -> &TieredCache {
        self.executor.cache()
    }

    pub fn notifications(&self) -> &Arc<dyn NotificationSink> {
        &self.sink
    }

    pub fn prefetch(&self) -> &PrefetchRefresher {
        &self.prefetch
    }

    /// Runs one prefetch pass immediately.
    pub async fn refresh_pending(&self) -> PrefetchReport {
        self.prefetch.tick(self).await
    }

    /// Starts the periodic refresher, or `None` when prefetch is disabled.
    pub fn start_prefetch(self: &Arc<Self>) -> Option<PrefetchHandle> {
        if !self.prefetch.config().enabled {
            return None;
        }
        let replayer: Arc<dyn QueryReplayer> = Arc::clone(self) as Arc<dyn QueryReplayer>;
        Some(self.prefetch.spawn(replayer))
    }
}

impl QueryReplayer for UnifiedGateway {
    fn replay<'a>(&'a self, query: &'a GatewayQuery) -> ReplayFuture<'a> {
        Box::pin(async move {
            let options = CacheOptions::refresh();
            match query {
                GatewayQuery::Quote { symbol } => self.get_quote(symbol, options).await.map(drop),
                GatewayQuery::Quotes { symbols } => {
                    self.get_quotes(symbols, options).await.map(drop)
                }
                GatewayQuery::Bars { request } => self.get_bars(request, options).await.map(drop),
                GatewayQuery::CompanyInfo { symbol } => {
                    self.get_company_info(symbol, options).await.map(drop)
                }
                GatewayQuery::News { symbol, limit } => {
                    self.get_news(symbol, *limit, options).await.map(drop)
                }
                GatewayQuery::MarketStatus => self.get_market_status(options).await.map(drop),
                GatewayQuery::Account => self.get_account(options).await.map(drop),
                GatewayQuery::Positions => self.get_positions(options).await.map(drop),
                GatewayQuery::Position { symbol } => {
                    self.get_position(symbol, options).await.map(drop)
                }
                GatewayQuery::Orders { query } => self.get_orders(query, options).await.map(drop),
            }
        })
    }
}

/// Assembles a [`UnifiedGateway`] from configuration and injected collaborators.
///
/// Vendors with credentials in [`GatewayConfig::credentials`] are registered automatically;
/// [`with_vendor`](Self::with_vendor) adds or replaces a vendor explicitly.
pub struct GatewayBuilder {
    config: GatewayConfig,
    http: Option<Arc<dyn HttpClient>>,
    sink: Option<Arc<dyn NotificationSink>>,
    cache: Option<Arc<TieredCache>>,
    remote: Option<Arc<dyn RemoteStore>>,
    quality: Option<Arc<QualityScorer>>,
    vendors: Vec<Arc<dyn DataSource>>,
}

impl GatewayBuilder {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config,
            http: None,
            sink: None,
            cache: None,
            remote: None,
            quality: None,
            vendors: Vec::new(),
        }
    }

    pub fn with_http_client(mut self, http: Arc<dyn HttpClient>) -> Self {
        self.http = Some(http);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_cache(mut self, cache: Arc<TieredCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_remote_store(mut self, remote: Arc<dyn RemoteStore>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn with_quality(mut self, quality: Arc<QualityScorer>) -> Self {
        self.quality = Some(quality);
        self
    }

    pub fn with_vendor(mut self, vendor: Arc<dyn DataSource>) -> Self {
        self.vendors.push(vendor);
        self
    }

    /// Like [`build`](Self::build), but first connects to `config.cache.redis_url` when no
    /// cache or remote store was injected.
    pub async fn connect(mut self) -> GatewayBuilder {
        if self.cache.is_none() && self.remote.is_none() && self.config.cache.redis_url.is_some() {
            self.cache = Some(Arc::new(TieredCache::connect(self.config.cache.clone()).await));
        }
        self
    }

    pub fn build(self) -> UnifiedGateway {
        let sink = self
            .sink
            .unwrap_or_else(|| Arc::new(TracingSink) as Arc<dyn NotificationSink>);
        let http = self
            .http
            .unwrap_or_else(|| Arc::new(ReqwestHttpClient::new()) as Arc<dyn HttpClient>);
        let cache = self.cache.unwrap_or_else(|| {
            Arc::new(match self.remote {
                Some(remote) => TieredCache::with_remote(self.config.cache.clone(), remote),
                None => TieredCache::new(self.config.cache.clone()),
            })
        });
        let quality = self.quality.unwrap_or_default();

        let mut sources = credentialed_sources(&self.config, &http, &sink);
        for vendor in self.vendors {
            sources.insert(vendor.id(), vendor);
        }
        if sources.is_empty() {
            tracing::warn!("gateway built without any vendor; every request will fail");
        } else {
            tracing::debug!(
                vendors = ?sources.keys().collect::<Vec<_>>(),
                "gateway vendors registered"
            );
        }

        UnifiedGateway {
            sources,
            executor: FallbackExecutor::new(cache, quality, Arc::clone(&sink)),
            prefetch: Arc::new(PrefetchRefresher::new(self.config.prefetch.clone())),
            sink,
        }
    }
}

fn credentialed_sources(
    config: &GatewayConfig,
    http: &Arc<dyn HttpClient>,
    sink: &Arc<dyn NotificationSink>,
) -> BTreeMap<VendorId, Arc<dyn DataSource>> {
    let credentials = &config.credentials;
    let mut sources: BTreeMap<VendorId, Arc<dyn DataSource>> = BTreeMap::new();

    if let (Some(key_id), Some(secret)) = (
        credentials.alpaca_key_id.as_deref(),
        credentials.alpaca_secret_key.as_deref(),
    ) {
        let adapter = AlpacaAdapter::new(
            &config.policy(VendorId::Alpaca),
            Arc::clone(http),
            key_id,
            secret,
            Arc::clone(sink),
        )
        .with_live_trading(config.alpaca_live);
        sources.insert(VendorId::Alpaca, Arc::new(adapter));
    }
    if let Some(api_key) = credentials.polygon_api_key.as_deref() {
        let adapter = PolygonAdapter::new(
            &config.policy(VendorId::Polygon),
            Arc::clone(http),
            api_key,
            Arc::clone(sink),
        );
        sources.insert(VendorId::Polygon, Arc::new(adapter));
    }
    if let Some(api_key) = credentials.fmp_api_key.as_deref() {
        let adapter = FmpAdapter::new(
            &config.policy(VendorId::Fmp),
            Arc::clone(http),
            api_key,
            Arc::clone(sink),
        );
        sources.insert(VendorId::Fmp, Arc::new(adapter));
    }
    sources
}
