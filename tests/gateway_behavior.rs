//! Behaviour tests for the unified gateway: fallback order, caching, quality ranking,
//! trading cache invalidation and prefetch.

mod support;

use std::sync::Arc;
use std::time::Duration;

use quotegate_core::http_client::{ScriptedHttpClient, ScriptedReply};
use quotegate_core::notify::titles;
use quotegate_core::{
    CacheOptions, DataType, GatewayError, GatewayQuery, MemorySink, OrderRequest, OrderSide,
    QualityScorer, VendorErrorKind, VendorId,
};

use support::{
    gateway, symbol, ALPACA_ACCOUNT, ALPACA_CLOCK, ALPACA_ORDER, ALPACA_SNAPSHOT, FMP_PROFILE,
    FMP_QUOTE, POLYGON_SNAPSHOT,
};

// =============================================================================
// Fallback
// =============================================================================

#[tokio::test]
async fn when_primary_fails_first_fallback_serves_and_is_announced_once() {
    // Given: Alpaca down, Polygon healthy, FMP healthy
    let http = ScriptedHttpClient::new();
    http.on("/snapshots", ScriptedReply::status(503, "down"));
    http.on("/tickers/AAPL", ScriptedReply::json(POLYGON_SNAPSHOT));
    http.on("/quote/AAPL", ScriptedReply::json(FMP_QUOTE));
    let sink = Arc::new(MemorySink::new());
    let gateway = gateway(&http, &sink);

    // When: a quote is requested
    let quote = gateway
        .get_quote(&symbol("AAPL"), CacheOptions::default())
        .await
        .expect("fallback quote");

    // Then: Polygon answered, FMP was never asked, one fallback notification
    assert_eq!(quote.price, 190.25);
    assert_eq!(http.request_count("/quote/AAPL"), 0);
    assert_eq!(sink.count_titled(titles::FALLBACK_USED), 1);
    assert_eq!(sink.count_titled(titles::RETRIEVAL_FAILED), 0);
}

#[tokio::test]
async fn when_every_vendor_fails_caller_gets_all_sources_failed_in_attempt_order() {
    // Given: all three vendors failing in different ways
    let http = ScriptedHttpClient::new();
    http.on("/snapshots", ScriptedReply::status(503, "down"));
    http.on("/tickers/AAPL", ScriptedReply::transport_error("dns failure"));
    http.on("/quote/AAPL", ScriptedReply::json("not json"));
    let sink = Arc::new(MemorySink::new());
    let gateway = gateway(&http, &sink);

    // When: a quote is requested
    let error = gateway
        .get_quote(&symbol("AAPL"), CacheOptions::default())
        .await
        .expect_err("all vendors fail");

    // Then: one aggregated error lists each vendor's cause
    let GatewayError::AllSourcesFailed {
        data_type,
        failures,
    } = &error
    else {
        panic!("expected AllSourcesFailed, got {error:?}");
    };
    assert_eq!(*data_type, DataType::Quote);
    let causes = failures
        .iter()
        .map(|failure| (failure.vendor, failure.error.kind()))
        .collect::<Vec<_>>();
    assert_eq!(
        causes,
        vec![
            (VendorId::Alpaca, VendorErrorKind::Server),
            (VendorId::Polygon, VendorErrorKind::Network),
            (VendorId::Fmp, VendorErrorKind::Decode),
        ]
    );
    assert_eq!(sink.count_titled(titles::RETRIEVAL_FAILED), 1);
}

#[tokio::test]
async fn company_info_prefers_fmp() {
    // Given: FMP serving a profile
    let http = ScriptedHttpClient::new();
    http.on("/profile/AAPL", ScriptedReply::json(FMP_PROFILE));
    let sink = Arc::new(MemorySink::new());
    let gateway = gateway(&http, &sink);

    // When: company information is requested
    let profile = gateway
        .get_company_info(&symbol("AAPL"), CacheOptions::default())
        .await
        .expect("profile");

    // Then: FMP answered first-hand, no fallback was needed
    assert_eq!(profile.name, "Apple Inc.");
    assert_eq!(sink.count_titled(titles::FALLBACK_USED), 0);
    assert_eq!(http.requests().len(), 1);
}

// =============================================================================
// Quality ranking
// =============================================================================

#[tokio::test]
async fn failed_vendor_ranks_below_the_vendor_that_served() {
    // Given: Alpaca failing and Polygon serving quotes
    let http = ScriptedHttpClient::new();
    http.on("/snapshots", ScriptedReply::status(500, "boom"));
    http.on("/tickers/AAPL", ScriptedReply::json(POLYGON_SNAPSHOT));
    let gateway = gateway(&http, &Arc::new(MemorySink::new()));

    // When: a quote goes through the fallback chain
    gateway
        .get_quote(&symbol("AAPL"), CacheOptions::default())
        .await
        .expect("quote");

    // Then: Polygon outranks Alpaca, unscored FMP trails in default order
    assert_eq!(
        gateway.vendor_ranking(DataType::Quote),
        vec![VendorId::Polygon, VendorId::Alpaca, VendorId::Fmp]
    );
    let polygon = gateway
        .quality()
        .record(VendorId::Polygon, DataType::Quote)
        .expect("scored");
    assert_eq!(polygon.reliability, 0.8);
}

#[test]
fn scorer_ranks_success_above_failure_for_same_data_type() {
    let scorer = QualityScorer::new();
    scorer.record_outcome(VendorId::Alpaca, DataType::News, 120, 0.0, 0.0);
    scorer.record_outcome(VendorId::Fmp, DataType::News, 900, 1.0, 1.0);

    let ranked = scorer.rank(DataType::News);

    assert_eq!(ranked[0], VendorId::Fmp);
    assert_eq!(ranked[1], VendorId::Alpaca);
}

// =============================================================================
// Caching through the gateway
// =============================================================================

#[tokio::test]
async fn repeated_reads_are_served_from_cache_until_refresh() {
    // Given: a healthy primary
    let http = ScriptedHttpClient::new();
    http.on("/snapshots", ScriptedReply::json(ALPACA_SNAPSHOT));
    let gateway = gateway(&http, &Arc::new(MemorySink::new()));
    let aapl = symbol("AAPL");

    // When: the same quote is read twice, then refreshed
    gateway.get_quote(&aapl, CacheOptions::default()).await.expect("miss");
    gateway.get_quote(&aapl, CacheOptions::default()).await.expect("hit");
    gateway.get_quote(&aapl, CacheOptions::refresh()).await.expect("refresh");

    // Then: only the first and the refresh reached the vendor
    assert_eq!(http.request_count("/snapshots"), 2);
    let stats = gateway.cache_stats().await;
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.local_entries, 1);
}

#[tokio::test(start_paused = true)]
async fn caller_ttl_controls_freshness() {
    // Given: a quote cached for 2 s
    let http = ScriptedHttpClient::new();
    http.on("/clock", ScriptedReply::json(ALPACA_CLOCK));
    let gateway = gateway(&http, &Arc::new(MemorySink::new()));
    let options = CacheOptions::default().with_ttl(Duration::from_secs(2));

    // When: it is read within and after the TTL
    gateway.get_market_status(options).await.expect("first");
    tokio::time::advance(Duration::from_millis(1500)).await;
    gateway.get_market_status(options).await.expect("cached");
    tokio::time::advance(Duration::from_millis(600)).await;
    gateway.get_market_status(options).await.expect("expired");

    // Then: the vendor was called again only after expiry
    assert_eq!(http.request_count("/clock"), 2);
}

// =============================================================================
// Trading
// =============================================================================

#[tokio::test]
async fn placing_an_order_invalidates_cached_account_state() {
    // Given: a cached account
    let http = ScriptedHttpClient::new();
    http.on("/account", ScriptedReply::json(ALPACA_ACCOUNT));
    http.on("/orders", ScriptedReply::json(ALPACA_ORDER));
    let gateway = gateway(&http, &Arc::new(MemorySink::new()));
    gateway.get_account(CacheOptions::default()).await.expect("account");
    gateway.get_account(CacheOptions::default()).await.expect("cached");
    assert_eq!(http.request_count("/account"), 1);

    // When: an order is placed
    let request = OrderRequest::market(symbol("AAPL"), OrderSide::Buy, 1.0).expect("order");
    let order = gateway.place_order(&request).await.expect("placed");

    // Then: the next account read goes back to the broker
    assert_eq!(order.id, "ord-1");
    gateway.get_account(CacheOptions::default()).await.expect("fresh");
    assert_eq!(http.request_count("/account"), 2);
}

#[tokio::test]
async fn missing_position_resolves_to_none() {
    // Given: the broker has no TSLA position
    let http = ScriptedHttpClient::new();
    http.on(
        "/positions/TSLA",
        ScriptedReply::status(404, r#"{"message":"position does not exist"}"#),
    );
    let sink = Arc::new(MemorySink::new());
    let gateway = gateway(&http, &sink);

    // When: the position is requested
    let position = gateway
        .get_position(&symbol("TSLA"), CacheOptions::default())
        .await
        .expect("no error");

    // Then: the answer is "no position", not a failure
    assert_eq!(position, None);
    assert_eq!(sink.count_titled(titles::RETRIEVAL_FAILED), 0);
}

#[tokio::test]
async fn trading_never_falls_back_to_market_data_vendors() {
    // Given: the broker rejects the order
    let http = ScriptedHttpClient::new();
    http.on("/orders", ScriptedReply::status(422, r#"{"message":"insufficient buying power"}"#));
    let gateway = gateway(&http, &Arc::new(MemorySink::new()));

    // When: an order is placed
    let request = OrderRequest::market(symbol("AAPL"), OrderSide::Buy, 1.0).expect("order");
    let error = gateway.place_order(&request).await.expect_err("rejected");

    // Then: only Alpaca was attempted
    let vendors = error
        .failures()
        .iter()
        .map(|failure| failure.vendor)
        .collect::<Vec<_>>();
    assert_eq!(vendors, vec![VendorId::Alpaca]);
    assert_eq!(http.requests().len(), 1);
}

// =============================================================================
// Prefetch
// =============================================================================

#[tokio::test]
async fn same_read_twice_is_queued_once_and_refreshed_by_replay() {
    // Given: two identical cached reads
    let http = ScriptedHttpClient::new();
    http.on("/snapshots", ScriptedReply::json(ALPACA_SNAPSHOT));
    let gateway = gateway(&http, &Arc::new(MemorySink::new()));
    let aapl = symbol("AAPL");
    gateway.get_quote(&aapl, CacheOptions::default()).await.expect("miss");
    gateway.get_quote(&aapl, CacheOptions::default()).await.expect("hit");

    // Then: exactly one queued entry
    assert_eq!(
        gateway.prefetch().pending_queries(),
        vec![GatewayQuery::Quote {
            symbol: aapl.clone()
        }]
    );

    // When: the refresher runs
    let report = gateway.refresh_pending().await;

    // Then: the vendor was asked again, bypassing the cached copy, and nothing was re-queued
    assert_eq!(report.refreshed, 1);
    assert_eq!(http.request_count("/snapshots"), 2);
    assert_eq!(gateway.prefetch().pending(), 0);
}

#[tokio::test(start_paused = true)]
async fn started_refresher_keeps_entries_warm_until_shutdown() {
    // Given: a gateway with the refresher running every 60 s
    let http = ScriptedHttpClient::new();
    http.on("/clock", ScriptedReply::json(ALPACA_CLOCK));
    let gateway = Arc::new(gateway(&http, &Arc::new(MemorySink::new())));
    let handle = gateway.start_prefetch().expect("prefetch enabled");

    // When: one read is made and a refresh interval passes
    gateway
        .get_market_status(CacheOptions::default())
        .await
        .expect("status");
    tokio::time::sleep(Duration::from_secs(61)).await;

    // Then: the refresher replayed the read in the background
    assert_eq!(http.request_count("/clock"), 2);
    handle.shutdown().await;
}
