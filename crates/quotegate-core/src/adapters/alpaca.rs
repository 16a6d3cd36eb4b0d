use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{invalid_payload, lenient_f64};
use crate::data_source::{BarsRequest, CapabilitySet, DataSource, VendorFuture};
use crate::domain::join_symbols;
use crate::http_client::{HttpAuth, HttpClient, HttpRequest};
use crate::notify::NotificationSink;
use crate::{
    Account, Bar, BarSeries, CircuitState, CompanyProfile, MarketStatus, NewsArticle, Order,
    OrderRequest, OrderSide, OrderStatus, OrderType, OrdersQuery, Position, PositionSide, Quote,
    Symbol, TimeInForce, Timeframe, UtcDateTime, VendorClient, VendorError, VendorId,
    VendorPolicy,
};

const VENDOR: VendorId = VendorId::Alpaca;

/// Alpaca market data, news and brokerage adapter.
#[derive(Debug)]
pub struct AlpacaAdapter {
    client: VendorClient,
    data_base_url: String,
    trading_base_url: String,
}

impl AlpacaAdapter {
    pub const DATA_BASE_URL: &'static str = "https://data.alpaca.markets";
    pub const PAPER_TRADING_BASE_URL: &'static str = "https://paper-api.alpaca.markets/v2";
    pub const LIVE_TRADING_BASE_URL: &'static str = "https://api.alpaca.markets/v2";

    pub fn new(
        policy: &VendorPolicy,
        http: Arc<dyn HttpClient>,
        key_id: impl Into<String>,
        secret_key: impl Into<String>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        let auth = HttpAuth::Headers(vec![
            (String::from("APCA-API-KEY-ID"), key_id.into()),
            (String::from("APCA-API-SECRET-KEY"), secret_key.into()),
        ]);
        Self {
            client: VendorClient::new(policy, http, auth, sink),
            data_base_url: String::from(Self::DATA_BASE_URL),
            trading_base_url: String::from(Self::PAPER_TRADING_BASE_URL),
        }
    }

    pub fn with_live_trading(mut self, live: bool) -> Self {
        self.trading_base_url = String::from(if live {
            Self::LIVE_TRADING_BASE_URL
        } else {
            Self::PAPER_TRADING_BASE_URL
        });
        self
    }

    pub fn with_base_urls(mut self, data: impl Into<String>, trading: impl Into<String>) -> Self {
        self.data_base_url = data.into();
        self.trading_base_url = trading.into();
        self
    }

    pub fn client(&self) -> &VendorClient {
        &self.client
    }

    async fn snapshots(&self, symbols: &[Symbol]) -> Result<Vec<Quote>, VendorError> {
        let url = format!(
            "{}/v2/stocks/snapshots?symbols={}",
            self.data_base_url,
            urlencoding::encode(&join_symbols(symbols))
        );
        let payload: HashMap<String, AlpacaSnapshot> = self.client.get_json(url).await?;

        let mut quotes = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            if let Some(snapshot) = payload.get(symbol.as_str()) {
                quotes.push(normalize_snapshot(symbol.clone(), snapshot)?);
            }
        }
        Ok(quotes)
    }
}

impl DataSource for AlpacaAdapter {
    fn id(&self) -> VendorId {
        VENDOR
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::full()
    }

    fn circuit_state(&self) -> CircuitState {
        self.client.circuit_state()
    }

    fn quote<'a>(&'a self, symbol: &'a Symbol) -> VendorFuture<'a, Quote> {
        Box::pin(async move {
            self.snapshots(std::slice::from_ref(symbol))
                .await?
                .pop()
                .ok_or_else(|| {
                    VendorError::from_status(
                        VENDOR,
                        404,
                        format!("no alpaca snapshot for {symbol}"),
                    )
                })
        })
    }

    fn quotes<'a>(&'a self, symbols: &'a [Symbol]) -> VendorFuture<'a, Vec<Quote>> {
        Box::pin(async move { self.snapshots(symbols).await })
    }

    fn bars<'a>(&'a self, req: &'a BarsRequest) -> VendorFuture<'a, BarSeries> {
        Box::pin(async move {
            let url = format!(
                "{}/v2/stocks/{}/bars?timeframe={}&start={}&end={}&limit=10000&adjustment=raw",
                self.data_base_url,
                urlencoding::encode(req.symbol.as_str()),
                alpaca_timeframe(req.timeframe),
                urlencoding::encode(&req.start.format_rfc3339()),
                urlencoding::encode(&req.end.format_rfc3339()),
            );
            let payload: AlpacaBarsResponse = self.client.get_json(url).await?;

            let bars = payload
                .bars
                .unwrap_or_default()
                .into_iter()
                .map(normalize_bar)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(BarSeries::new(req.symbol.clone(), req.timeframe, bars))
        })
    }

    fn company_info<'a>(&'a self, symbol: &'a Symbol) -> VendorFuture<'a, CompanyProfile> {
        Box::pin(async move {
            let url = format!(
                "{}/assets/{}",
                self.trading_base_url,
                urlencoding::encode(symbol.as_str())
            );
            let asset: AlpacaAsset = self.client.get_json(url).await?;

            let mut profile = CompanyProfile::new(symbol.clone(), asset.name, "USD")
                .map_err(invalid_payload(VENDOR))?;
            profile.exchange = asset.exchange;
            Ok(profile)
        })
    }

    fn news<'a>(&'a self, symbol: &'a Symbol, limit: usize) -> VendorFuture<'a, Vec<NewsArticle>> {
        Box::pin(async move {
            let url = format!(
                "{}/v1beta1/news?symbols={}&limit={limit}",
                self.data_base_url,
                urlencoding::encode(symbol.as_str())
            );
            let payload: AlpacaNewsResponse = self.client.get_json(url).await?;

            payload
                .news
                .into_iter()
                .take(limit)
                .map(normalize_news)
                .collect()
        })
    }

    fn market_status<'a>(&'a self) -> VendorFuture<'a, MarketStatus> {
        Box::pin(async move {
            let clock: AlpacaClock = self
                .client
                .get_json(format!("{}/clock", self.trading_base_url))
                .await?;
            let parse =
                |raw: &str| UtcDateTime::parse_any_offset(raw).map_err(invalid_payload(VENDOR));

            Ok(MarketStatus {
                is_open: clock.is_open,
                session: String::from(if clock.is_open { "regular" } else { "closed" }),
                as_of: parse(&clock.timestamp)?,
                next_open: clock.next_open.as_deref().map(parse).transpose()?,
                next_close: clock.next_close.as_deref().map(parse).transpose()?,
            })
        })
    }

    fn account<'a>(&'a self) -> VendorFuture<'a, Account> {
        Box::pin(async move {
            let account: AlpacaAccount = self
                .client
                .get_json(format!("{}/account", self.trading_base_url))
                .await?;
            Ok(Account {
                account_id: account.id,
                status: account.status,
                currency: account.currency,
                cash: account.cash,
                buying_power: account.buying_power,
                equity: account.equity,
                portfolio_value: account.portfolio_value.unwrap_or(account.equity),
            })
        })
    }

    fn positions<'a>(&'a self) -> VendorFuture<'a, Vec<Position>> {
        Box::pin(async move {
            let payload: Vec<AlpacaPosition> = self
                .client
                .get_json(format!("{}/positions", self.trading_base_url))
                .await?;
            payload.into_iter().map(normalize_position).collect()
        })
    }

    fn position<'a>(&'a self, symbol: &'a Symbol) -> VendorFuture<'a, Option<Position>> {
        Box::pin(async move {
            let url = format!(
                "{}/positions/{}",
                self.trading_base_url,
                urlencoding::encode(symbol.as_str())
            );
            match self.client.get_json::<AlpacaPosition>(url).await {
                Ok(position) => normalize_position(position).map(Some),
                Err(error) if error.is_not_found() => Ok(None),
                Err(error) => Err(error),
            }
        })
    }

    fn orders<'a>(&'a self, query: &'a OrdersQuery) -> VendorFuture<'a, Vec<Order>> {
        Box::pin(async move {
            let mut url = format!(
                "{}/orders?status={}&limit={}&direction=desc",
                self.trading_base_url,
                query.status.as_str(),
                query.limit
            );
            if !query.symbols.is_empty() {
                url.push_str("&symbols=");
                url.push_str(&urlencoding::encode(&join_symbols(&query.symbols)));
            }
            let payload: Vec<AlpacaOrder> = self.client.get_json(url).await?;
            payload.into_iter().map(normalize_order).collect()
        })
    }

    fn place_order<'a>(&'a self, order: &'a OrderRequest) -> VendorFuture<'a, Order> {
        Box::pin(async move {
            let body = serde_json::to_string(&AlpacaOrderBody::from(order)).map_err(|error| {
                VendorError::decode(VENDOR, format!("failed to encode order: {error}"))
            })?;
            let request =
                HttpRequest::post(format!("{}/orders", self.trading_base_url)).with_json_body(body);
            let placed: AlpacaOrder = self.client.send_json(request).await?;
            normalize_order(placed)
        })
    }

    fn cancel_order<'a>(&'a self, order_id: &'a str) -> VendorFuture<'a, ()> {
        Box::pin(async move {
            let url = format!(
                "{}/orders/{}",
                self.trading_base_url,
                urlencoding::encode(order_id)
            );
            self.client.send(HttpRequest::delete(url)).await.map(|_| ())
        })
    }
}

const fn alpaca_timeframe(timeframe: Timeframe) -> &'static str {
    match timeframe {
        Timeframe::OneMinute => "1Min",
        Timeframe::FiveMinutes => "5Min",
        Timeframe::FifteenMinutes => "15Min",
        Timeframe::OneHour => "1Hour",
        Timeframe::OneDay => "1Day",
    }
}

#[derive(Debug, Clone, Deserialize)]
struct AlpacaSnapshot {
    #[serde(rename = "latestTrade")]
    latest_trade: Option<AlpacaTrade>,
    #[serde(rename = "latestQuote")]
    latest_quote: Option<AlpacaQuote>,
    #[serde(rename = "dailyBar")]
    daily_bar: Option<AlpacaBar>,
}

#[derive(Debug, Clone, Deserialize)]
struct AlpacaTrade {
    t: String,
    p: f64,
}

#[derive(Debug, Clone, Deserialize)]
struct AlpacaQuote {
    bp: Option<f64>,
    ap: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
struct AlpacaBar {
    t: String,
    o: f64,
    h: f64,
    l: f64,
    c: f64,
    v: Option<u64>,
    vw: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
struct AlpacaBarsResponse {
    bars: Option<Vec<AlpacaBar>>,
}

#[derive(Debug, Clone, Deserialize)]
struct AlpacaAsset {
    name: String,
    exchange: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct AlpacaNewsResponse {
    #[serde(default)]
    news: Vec<AlpacaNewsItem>,
}

#[derive(Debug, Clone, Deserialize)]
struct AlpacaNewsItem {
    id: u64,
    headline: String,
    summary: Option<String>,
    source: Option<String>,
    url: Option<String>,
    #[serde(default)]
    symbols: Vec<String>,
    created_at: String,
}

#[derive(Debug, Clone, Deserialize)]
struct AlpacaClock {
    timestamp: String,
    is_open: bool,
    next_open: Option<String>,
    next_close: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct AlpacaAccount {
    id: String,
    status: String,
    currency: String,
    #[serde(deserialize_with = "lenient_f64::deserialize")]
    cash: f64,
    #[serde(deserialize_with = "lenient_f64::deserialize")]
    buying_power: f64,
    #[serde(deserialize_with = "lenient_f64::deserialize")]
    equity: f64,
    #[serde(default, deserialize_with = "lenient_f64::option")]
    portfolio_value: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
struct AlpacaPosition {
    symbol: String,
    #[serde(deserialize_with = "lenient_f64::deserialize")]
    qty: f64,
    side: String,
    #[serde(deserialize_with = "lenient_f64::deserialize")]
    avg_entry_price: f64,
    #[serde(default, deserialize_with = "lenient_f64::option")]
    market_value: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64::option")]
    current_price: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64::option")]
    unrealized_pl: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
struct AlpacaOrder {
    id: String,
    client_order_id: Option<String>,
    symbol: String,
    side: OrderSide,
    #[serde(rename = "type")]
    order_type: OrderType,
    time_in_force: TimeInForce,
    #[serde(default, deserialize_with = "lenient_f64::option")]
    qty: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64::option")]
    filled_qty: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64::option")]
    limit_price: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64::option")]
    stop_price: Option<f64>,
    status: String,
    submitted_at: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
struct AlpacaOrderBody<'a> {
    symbol: &'a str,
    qty: String,
    side: OrderSide,
    #[serde(rename = "type")]
    order_type: OrderType,
    time_in_force: TimeInForce,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit_price: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_price: Option<String>,
    client_order_id: &'a str,
}

impl<'a> From<&'a OrderRequest> for AlpacaOrderBody<'a> {
    fn from(order: &'a OrderRequest) -> Self {
        Self {
            symbol: order.symbol.as_str(),
            qty: order.qty.to_string(),
            side: order.side,
            order_type: order.order_type,
            time_in_force: order.time_in_force,
            limit_price: order.limit_price.map(|price| price.to_string()),
            stop_price: order.stop_price.map(|price| price.to_string()),
            client_order_id: &order.client_order_id,
        }
    }
}

fn normalize_snapshot(symbol: Symbol, snapshot: &AlpacaSnapshot) -> Result<Quote, VendorError> {
    let (price, as_of) = match (&snapshot.latest_trade, &snapshot.daily_bar) {
        (Some(trade), _) => (trade.p, trade.t.as_str()),
        (None, Some(bar)) => (bar.c, bar.t.as_str()),
        (None, None) => {
            return Err(VendorError::decode(
                VENDOR,
                format!("alpaca snapshot for {symbol} has no trade or bar"),
            ))
        }
    };
    let as_of = UtcDateTime::parse_any_offset(as_of).map_err(invalid_payload(VENDOR))?;
    let quote = snapshot.latest_quote.as_ref();

    Quote::new(
        symbol,
        price,
        quote.and_then(|q| q.bp).filter(|bid| *bid > 0.0),
        quote.and_then(|q| q.ap).filter(|ask| *ask > 0.0),
        snapshot.daily_bar.as_ref().and_then(|bar| bar.v),
        "USD",
        as_of,
    )
    .map_err(invalid_payload(VENDOR))
}

fn normalize_bar(bar: AlpacaBar) -> Result<Bar, VendorError> {
    let ts = UtcDateTime::parse_any_offset(&bar.t).map_err(invalid_payload(VENDOR))?;
    Bar::new(ts, bar.o, bar.h, bar.l, bar.c, bar.v, bar.vw).map_err(invalid_payload(VENDOR))
}

fn normalize_news(item: AlpacaNewsItem) -> Result<NewsArticle, VendorError> {
    Ok(NewsArticle {
        id: item.id.to_string(),
        headline: item.headline,
        summary: item.summary.filter(|summary| !summary.is_empty()),
        source: item.source.unwrap_or_else(|| String::from("alpaca")),
        url: item.url.unwrap_or_default(),
        symbols: item
            .symbols
            .iter()
            .filter_map(|raw| Symbol::parse(raw).ok())
            .collect(),
        published_at: UtcDateTime::parse_any_offset(&item.created_at)
            .map_err(invalid_payload(VENDOR))?,
    })
}

fn normalize_position(position: AlpacaPosition) -> Result<Position, VendorError> {
    let side = if position.side.eq_ignore_ascii_case("short") || position.qty < 0.0 {
        PositionSide::Short
    } else {
        PositionSide::Long
    };
    Ok(Position {
        symbol: Symbol::parse(&position.symbol).map_err(invalid_payload(VENDOR))?,
        qty: position.qty.abs(),
        side,
        avg_entry_price: position.avg_entry_price,
        market_value: position.market_value,
        current_price: position.current_price,
        unrealized_pl: position.unrealized_pl,
    })
}

fn normalize_order(order: AlpacaOrder) -> Result<Order, VendorError> {
    Ok(Order {
        id: order.id,
        client_order_id: order.client_order_id,
        symbol: Symbol::parse(&order.symbol).map_err(invalid_payload(VENDOR))?,
        side: order.side,
        order_type: order.order_type,
        time_in_force: order.time_in_force,
        qty: order.qty.unwrap_or(0.0),
        filled_qty: order.filled_qty.unwrap_or(0.0),
        limit_price: order.limit_price,
        stop_price: order.stop_price,
        status: OrderStatus::from_vendor(&order.status),
        submitted_at: order
            .submitted_at
            .as_deref()
            .map(UtcDateTime::parse_any_offset)
            .transpose()
            .map_err(invalid_payload(VENDOR))?,
    })
}
