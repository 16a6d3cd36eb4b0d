//! Shared fixtures for the behaviour tests: scripted vendor payloads and fast policies.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use quotegate_core::http_client::ScriptedHttpClient;
use quotegate_core::{
    AlpacaAdapter, CircuitBreakerConfig, FmpAdapter, GatewayConfig, MemorySink,
    NotificationSink, PolygonAdapter, RetryPolicy, Symbol, UnifiedGateway, VendorId,
    VendorPolicy,
};

pub const ALPACA_SNAPSHOT: &str = r#"{"AAPL":{"latestTrade":{"t":"2024-01-02T20:59:59.5Z","p":185.2},
"latestQuote":{"bp":185.1,"ap":185.3},
"dailyBar":{"t":"2024-01-02T05:00:00Z","o":184,"h":186,"l":183,"c":185.2,"v":1000}}}"#;

pub const POLYGON_SNAPSHOT: &str = r#"{"status":"OK","ticker":{"ticker":"AAPL",
"day":{"o":1,"h":2,"l":1,"c":1.5,"v":1200.0,"vw":1.4},
"lastTrade":{"p":190.25,"t":1704229199000000000},
"lastQuote":{"p":190.2,"P":190.3},"updated":1704229199000000000}}"#;

pub const FMP_QUOTE: &str =
    r#"[{"symbol":"AAPL","price":187.1,"volume":5000,"timestamp":1704229200}]"#;

pub const FMP_PROFILE: &str = r#"[{"symbol":"AAPL","companyName":"Apple Inc.","currency":"USD",
"exchangeShortName":"NASDAQ","sector":"Technology","industry":"Consumer Electronics",
"mktCap":3000000000000,"description":"Phones","website":"https://apple.com"}]"#;

pub const ALPACA_CLOCK: &str = r#"{"timestamp":"2024-01-02T15:00:00Z","is_open":true,
"next_open":"2024-01-03T14:30:00Z","next_close":"2024-01-02T21:00:00Z"}"#;

pub const ALPACA_ACCOUNT: &str = r#"{"id":"acc-1","status":"ACTIVE","currency":"USD","cash":"1000.50",
"buying_power":"2001","equity":"1500.25","portfolio_value":"1500.25"}"#;

pub const ALPACA_ORDER: &str = r#"{"id":"ord-1","client_order_id":"cid","symbol":"AAPL","side":"buy",
"type":"market","time_in_force":"day","qty":"1","filled_qty":"0","limit_price":null,
"stop_price":null,"status":"accepted","submitted_at":"2024-01-02T15:00:00Z"}"#;

pub fn symbol(raw: &str) -> Symbol {
    Symbol::parse(raw).expect("valid symbol")
}

/// Vendor defaults with short fixed backoff so retries do not dominate test time.
pub fn fast_policy(vendor: VendorId, max_attempts: u32) -> VendorPolicy {
    VendorPolicy {
        retry: RetryPolicy::fixed(Duration::from_millis(10), max_attempts),
        ..VendorPolicy::default_for(vendor)
    }
}

pub fn with_breaker(
    mut policy: VendorPolicy,
    failure_threshold: u32,
    reset_timeout: Duration,
) -> VendorPolicy {
    policy.breaker = CircuitBreakerConfig {
        failure_threshold,
        reset_timeout,
        ..policy.breaker
    };
    policy
}

pub fn alpaca(
    http: &ScriptedHttpClient,
    policy: &VendorPolicy,
    sink: Arc<dyn NotificationSink>,
) -> AlpacaAdapter {
    AlpacaAdapter::new(policy, Arc::new(http.clone()), "key-id", "secret-key", sink)
}

pub fn polygon(
    http: &ScriptedHttpClient,
    policy: &VendorPolicy,
    sink: Arc<dyn NotificationSink>,
) -> PolygonAdapter {
    PolygonAdapter::new(policy, Arc::new(http.clone()), "poly-key", sink)
}

pub fn fmp(
    http: &ScriptedHttpClient,
    policy: &VendorPolicy,
    sink: Arc<dyn NotificationSink>,
) -> FmpAdapter {
    FmpAdapter::new(policy, Arc::new(http.clone()), "fmp-key", sink)
}

/// Gateway over all three vendors sharing one scripted transport, single-attempt policies.
pub fn gateway(http: &ScriptedHttpClient, sink: &Arc<MemorySink>) -> UnifiedGateway {
    gateway_with(http, sink, GatewayConfig::default())
}

pub fn gateway_with(
    http: &ScriptedHttpClient,
    sink: &Arc<MemorySink>,
    config: GatewayConfig,
) -> UnifiedGateway {
    let shared: Arc<dyn NotificationSink> = sink.clone();
    UnifiedGateway::builder(config)
        .with_http_client(Arc::new(http.clone()))
        .with_sink(Arc::clone(&shared))
        .with_vendor(Arc::new(alpaca(
            http,
            &fast_policy(VendorId::Alpaca, 1),
            Arc::clone(&shared),
        )))
        .with_vendor(Arc::new(polygon(
            http,
            &fast_policy(VendorId::Polygon, 1),
            Arc::clone(&shared),
        )))
        .with_vendor(Arc::new(fmp(http, &fast_policy(VendorId::Fmp, 1), shared)))
        .build()
}
