//! Contract every vendor adapter must honour, checked against scripted transports.

#[path = "../support/mod.rs"]
mod support;

use std::sync::Arc;

use quotegate_core::http_client::{ScriptedHttpClient, ScriptedReply};
use quotegate_core::{
    BarsRequest, CircuitState, DataSource, DataType, MemorySink, NotificationSink, OrderRequest,
    OrderSide, OrdersQuery, Timeframe, UtcDateTime, VendorErrorKind, VendorId,
};

use support::{
    alpaca, fast_policy, fmp, polygon, symbol, ALPACA_SNAPSHOT, FMP_QUOTE, POLYGON_SNAPSHOT,
};

struct VendorCase {
    id: VendorId,
    source: Arc<dyn DataSource>,
    http: ScriptedHttpClient,
    trip_breaker: Box<dyn Fn()>,
    trading: bool,
}

fn vendor_cases() -> Vec<VendorCase> {
    let sink: Arc<dyn NotificationSink> = Arc::new(MemorySink::new());
    let mut cases = Vec::new();

    let http = ScriptedHttpClient::new();
    http.on("/snapshots", ScriptedReply::json(ALPACA_SNAPSHOT));
    let adapter = Arc::new(alpaca(&http, &fast_policy(VendorId::Alpaca, 1), Arc::clone(&sink)));
    let target = Arc::clone(&adapter);
    cases.push(VendorCase {
        id: VendorId::Alpaca,
        source: adapter,
        http,
        trip_breaker: Box::new(move || trip(target.client().breaker())),
        trading: true,
    });

    let http = ScriptedHttpClient::new();
    http.on("/tickers/AAPL", ScriptedReply::json(POLYGON_SNAPSHOT));
    let adapter = Arc::new(polygon(&http, &fast_policy(VendorId::Polygon, 1), Arc::clone(&sink)));
    let target = Arc::clone(&adapter);
    cases.push(VendorCase {
        id: VendorId::Polygon,
        source: adapter,
        http,
        trip_breaker: Box::new(move || trip(target.client().breaker())),
        trading: false,
    });

    let http = ScriptedHttpClient::new();
    http.on("/quote/AAPL", ScriptedReply::json(FMP_QUOTE));
    let adapter = Arc::new(fmp(&http, &fast_policy(VendorId::Fmp, 1), sink));
    let target = Arc::clone(&adapter);
    cases.push(VendorCase {
        id: VendorId::Fmp,
        source: adapter,
        http,
        trip_breaker: Box::new(move || trip(target.client().breaker())),
        trading: false,
    });

    cases
}

fn trip(breaker: &quotegate_core::CircuitBreaker) {
    for _ in 0..breaker.config().failure_threshold {
        breaker.record_failure(VendorErrorKind::Server);
    }
}

fn bars_request() -> BarsRequest {
    BarsRequest::new(
        symbol("AAPL"),
        Timeframe::OneDay,
        UtcDateTime::parse("2024-01-01T00:00:00Z").expect("ts"),
        UtcDateTime::parse("2024-01-05T00:00:00Z").expect("ts"),
    )
    .expect("valid request")
}

#[tokio::test]
async fn quote_returns_normalized_structure_for_all_vendors() {
    for case in vendor_cases() {
        let quote = case
            .source
            .quote(&symbol("AAPL"))
            .await
            .unwrap_or_else(|error| panic!("vendor '{}' quote failed: {error}", case.id));

        assert_eq!(case.source.id(), case.id);
        assert_eq!(quote.symbol.as_str(), "AAPL", "vendor '{}': symbol", case.id);
        assert!(quote.price > 0.0, "vendor '{}': price must be positive", case.id);
        assert_eq!(quote.currency, "USD", "vendor '{}': currency", case.id);
    }
}

#[tokio::test]
async fn open_circuit_rejects_every_operation_without_network() {
    let aapl = symbol("AAPL");
    let bars = bars_request();
    let orders = OrdersQuery::default();
    let order = OrderRequest::market(symbol("AAPL"), OrderSide::Buy, 1.0).expect("order");

    for case in vendor_cases() {
        (case.trip_breaker)();
        assert_eq!(case.source.circuit_state(), CircuitState::Open, "vendor '{}'", case.id);

        let mut kinds = vec![
            case.source.quote(&aapl).await.map(drop),
            case.source.quotes(std::slice::from_ref(&aapl)).await.map(drop),
            case.source.bars(&bars).await.map(drop),
            case.source.company_info(&aapl).await.map(drop),
            case.source.news(&aapl, 5).await.map(drop),
            case.source.market_status().await.map(drop),
        ];
        if case.trading {
            kinds.extend([
                case.source.account().await.map(drop),
                case.source.positions().await.map(drop),
                case.source.position(&aapl).await.map(drop),
                case.source.orders(&orders).await.map(drop),
                case.source.place_order(&order).await.map(drop),
                case.source.cancel_order("ord-1").await.map(drop),
            ]);
        }

        for outcome in kinds {
            let error = outcome.expect_err("open circuit must reject");
            assert_eq!(
                error.kind(),
                VendorErrorKind::CircuitOpen,
                "vendor '{}': {error}",
                case.id
            );
        }
        assert!(
            case.http.requests().is_empty(),
            "vendor '{}' reached the network while open",
            case.id
        );
    }
}

#[tokio::test]
async fn market_data_vendors_do_not_trade() {
    let order = OrderRequest::market(symbol("AAPL"), OrderSide::Sell, 1.0).expect("order");

    for case in vendor_cases().into_iter().filter(|case| !case.trading) {
        assert!(!case.source.capabilities().supports(DataType::Trading));
        let error = case
            .source
            .place_order(&order)
            .await
            .expect_err("unsupported");
        assert_eq!(error.kind(), VendorErrorKind::Unsupported, "vendor '{}'", case.id);
        assert!(case.http.requests().is_empty());
    }
}

#[test]
fn capabilities_cover_every_data_type_in_its_priority_list() {
    for case in vendor_cases() {
        let capabilities = case.source.capabilities();
        for data_type in DataType::ALL {
            if data_type.priority().contains(&case.id) {
                assert!(
                    capabilities.supports(data_type),
                    "vendor '{}' is listed for {data_type} but does not support it",
                    case.id
                );
            }
        }
    }
}
