//! # Quotegate Core
//!
//! Resilient market data gateway over several upstream vendors.
//!
//! ## Overview
//!
//! - **Canonical domain models** for quotes, bars, company data, news and brokerage state
//! - **Vendor adapters** for Alpaca, Polygon and Financial Modeling Prep
//! - **Circuit breaker and retry policy** wrapped around every vendor call
//! - **Sequential fallback** across vendors in a static priority order per data type
//! - **Tiered cache** (in-process plus optional Redis) with compression and eviction
//! - **Prefetch refresher** that renews recently requested entries in the background
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`adapters`] | Vendor adapters (Alpaca, Polygon, FMP) |
//! | [`cache`] | Local and remote cache tiers |
//! | [`circuit_breaker`] | Per-vendor circuit breaker |
//! | [`config`] | Gateway configuration and environment loading |
//! | [`data_source`] | Vendor trait, data types and vendor errors |
//! | [`domain`] | Domain models |
//! | [`error`] | Gateway, validation and config errors |
//! | [`fallback`] | Cache-aware fallback executor |
//! | [`gateway`] | Unified gateway and builder |
//! | [`http_client`] | HTTP transport abstraction |
//! | [`notify`] | Operator notifications |
//! | [`policy`] | Per-vendor quota, retry, breaker and timeout policy |
//! | [`prefetch`] | Background refresh |
//! | [`quality`] | Vendor quality scoring |
//! | [`query`] | Replayable gateway queries |
//! | [`retry`] | Retry policy and backoff |
//! | [`throttling`] | Client-side request quotas |
//! | [`vendor_client`] | Resilient HTTP client shared by adapters |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use quotegate_core::{CacheOptions, GatewayConfig, Symbol, UnifiedGateway};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let gateway = UnifiedGateway::builder(GatewayConfig::from_env()?)
//!         .connect()
//!         .await
//!         .build();
//!
//!     let quote = gateway
//!         .get_quote(&Symbol::parse("AAPL")?, CacheOptions::default())
//!         .await?;
//!     println!("AAPL {:.2} {}", quote.price, quote.currency);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Unified Gateway │────▶│ Prefetch         │
//! └────────┬────────┘     └──────────────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Fallback        │────▶│ Tiered Cache     │
//! │ Executor        │     │ (local + Redis)  │
//! └────────┬────────┘     └──────────────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Vendor Adapter  │────▶│ Vendor Client    │
//! │ (DataSource)    │     │ quota, breaker,  │
//! └─────────────────┘     │ retry, timeout   │
//!                         └────────┬─────────┘
//!                                  ▼
//!                         ┌──────────────────┐
//!                         │ HTTP Client      │
//!                         └──────────────────┘
//! ```
//!
//! ## Error Handling
//!
//! Gateway methods return [`GatewayError`]. Vendor errors never reach the caller on their own;
//! they are collected, in attempt order, inside [`GatewayError::AllSourcesFailed`]:
//!
//! ```rust
//! use quotegate_core::{GatewayError, VendorErrorKind};
//!
//! fn describe(error: &GatewayError) -> &'static str {
//!     match error.last_failure().map(|failure| failure.error.kind()) {
//!         Some(VendorErrorKind::CircuitOpen) => "vendor cooling down",
//!         Some(VendorErrorKind::RateLimited | VendorErrorKind::Throttled) => "rate limited",
//!         Some(_) => "vendor failure",
//!         None => "invalid request",
//!     }
//! }
//! ```
//!
//! ## Security
//!
//! - API keys are read from the environment and never logged
//! - Query-string keys are redacted from request logs

pub mod adapters;
pub mod cache;
pub mod circuit_breaker;
pub mod config;
pub mod data_source;
pub mod domain;
pub mod error;
pub mod fallback;
pub mod gateway;
pub mod http_client;
pub mod notify;
pub mod policy;
pub mod prefetch;
pub mod quality;
pub mod query;
pub mod retry;
pub mod throttling;
pub mod vendor;
pub mod vendor_client;

// Adapter implementations
pub use adapters::{AlpacaAdapter, FmpAdapter, PolygonAdapter};

// Resilience
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use retry::{Backoff, RetryPolicy};
pub use throttling::RequestQuota;

// Caching
pub use cache::{
    CacheConfig, CacheError, CacheKey, CacheMode, CacheOptions, CacheStats, MemoryStore,
    RedisStore, RemoteStore, TieredCache,
};

// Configuration
pub use config::{GatewayConfig, VendorCredentials};
pub use policy::VendorPolicy;

// Data source trait and types
pub use data_source::{
    BarsRequest, CapabilitySet, Completeness, DataSource, DataType, VendorError, VendorErrorKind,
    VendorFuture,
};

// Domain models
pub use domain::{
    Account, Bar, BarSeries, CompanyProfile, MarketStatus, NewsArticle, Order, OrderRequest,
    OrderSide, OrderStatus, OrderStatusFilter, OrderType, OrdersQuery, Position, PositionSide,
    Quote, Symbol, TimeInForce, Timeframe, UtcDateTime,
};

// Errors
pub use error::{ConfigError, GatewayError, ValidationError, VendorFailure};

// Gateway
pub use fallback::FallbackExecutor;
pub use gateway::{GatewayBuilder, UnifiedGateway, VendorSnapshot};
pub use notify::{
    BroadcastSink, MemorySink, Notification, NotificationLevel, NotificationSink, TracingSink,
};
pub use prefetch::{PrefetchConfig, PrefetchHandle, PrefetchRefresher, PrefetchReport};
pub use quality::{QualityRecord, QualityScorer};
pub use query::GatewayQuery;
pub use vendor::VendorId;
pub use vendor_client::VendorClient;
