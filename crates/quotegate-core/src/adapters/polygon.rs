use std::sync::Arc;

use serde::Deserialize;

use super::invalid_payload;
use crate::data_source::{BarsRequest, CapabilitySet, DataSource, VendorFuture};
use crate::domain::join_symbols;
use crate::http_client::{HttpAuth, HttpClient};
use crate::notify::NotificationSink;
use crate::{
    Bar, BarSeries, CircuitState, CompanyProfile, MarketStatus, NewsArticle, Quote, Symbol,
    UtcDateTime, VendorClient, VendorError, VendorId, VendorPolicy,
};

const VENDOR: VendorId = VendorId::Polygon;

/// Polygon.io market data and reference adapter. Trading is not offered.
#[derive(Debug)]
pub struct PolygonAdapter {
    client: VendorClient,
    base_url: String,
}

impl PolygonAdapter {
    pub const BASE_URL: &'static str = "https://api.polygon.io";

    pub fn new(
        policy: &VendorPolicy,
        http: Arc<dyn HttpClient>,
        api_key: impl Into<String>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            client: VendorClient::new(policy, http, HttpAuth::BearerToken(api_key.into()), sink),
            base_url: String::from(Self::BASE_URL),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn client(&self) -> &VendorClient {
        &self.client
    }
}

impl DataSource for PolygonAdapter {
    fn id(&self) -> VendorId {
        VENDOR
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::new(true, true, true, true, false)
    }

    fn circuit_state(&self) -> CircuitState {
        self.client.circuit_state()
    }

    fn quote<'a>(&'a self, symbol: &'a Symbol) -> VendorFuture<'a, Quote> {
        Box::pin(async move {
            let url = format!(
                "{}/v2/snapshot/locale/us/markets/stocks/tickers/{}",
                self.base_url,
                urlencoding::encode(symbol.as_str())
            );
            let payload: PolygonSingleSnapshot = self.client.get_json(url).await?;
            normalize_snapshot(&payload.ticker)
        })
    }

    fn quotes<'a>(&'a self, symbols: &'a [Symbol]) -> VendorFuture<'a, Vec<Quote>> {
        Box::pin(async move {
            let url = format!(
                "{}/v2/snapshot/locale/us/markets/stocks/tickers?tickers={}",
                self.base_url,
                urlencoding::encode(&join_symbols(symbols))
            );
            let payload: PolygonSnapshotList = self.client.get_json(url).await?;
            payload.tickers.iter().map(normalize_snapshot).collect()
        })
    }

    fn bars<'a>(&'a self, req: &'a BarsRequest) -> VendorFuture<'a, BarSeries> {
        Box::pin(async move {
            let (multiplier, unit) = req.timeframe.span();
            let url = format!(
                "{}/v2/aggs/ticker/{}/range/{multiplier}/{unit}/{}/{}?adjusted=true&sort=asc&limit=50000",
                self.base_url,
                urlencoding::encode(req.symbol.as_str()),
                req.start.unix_millis(),
                req.end.unix_millis(),
            );
            let payload: PolygonAggregates = self.client.get_json(url).await?;

            let bars = payload
                .results
                .into_iter()
                .map(normalize_aggregate)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(BarSeries::new(req.symbol.clone(), req.timeframe, bars))
        })
    }

    fn company_info<'a>(&'a self, symbol: &'a Symbol) -> VendorFuture<'a, CompanyProfile> {
        Box::pin(async move {
            let url = format!(
                "{}/v3/reference/tickers/{}",
                self.base_url,
                urlencoding::encode(symbol.as_str())
            );
            let payload: PolygonTickerDetails = self.client.get_json(url).await?;
            let details = payload.results;

            let mut profile = CompanyProfile::new(
                symbol.clone(),
                details.name,
                details.currency_name.as_deref().unwrap_or("USD"),
            )
            .and_then(|profile| profile.with_market_cap(details.market_cap))
            .map_err(invalid_payload(VENDOR))?;
            profile.exchange = details.primary_exchange;
            profile.industry = details.sic_description;
            profile.description = details.description;
            profile.website = details.homepage_url;
            Ok(profile)
        })
    }

    fn news<'a>(&'a self, symbol: &'a Symbol, limit: usize) -> VendorFuture<'a, Vec<NewsArticle>> {
        Box::pin(async move {
            let url = format!(
                "{}/v2/reference/news?ticker={}&limit={limit}&order=desc",
                self.base_url,
                urlencoding::encode(symbol.as_str())
            );
            let payload: PolygonNews = self.client.get_json(url).await?;

            payload
                .results
                .into_iter()
                .take(limit)
                .map(|item| {
                    Ok(NewsArticle {
                        id: item.id,
                        headline: item.title,
                        summary: item.description,
                        source: item
                            .publisher
                            .map(|publisher| publisher.name)
                            .unwrap_or_else(|| String::from("polygon")),
                        url: item.article_url,
                        symbols: item
                            .tickers
                            .iter()
                            .filter_map(|raw| Symbol::parse(raw).ok())
                            .collect(),
                        published_at: UtcDateTime::parse_any_offset(&item.published_utc)
                            .map_err(invalid_payload(VENDOR))?,
                    })
                })
                .collect()
        })
    }

    fn market_status<'a>(&'a self) -> VendorFuture<'a, MarketStatus> {
        Box::pin(async move {
            let payload: PolygonMarketStatus = self
                .client
                .get_json(format!("{}/v1/marketstatus/now", self.base_url))
                .await?;

            let session = if payload.early_hours {
                "pre_market"
            } else if payload.after_hours {
                "after_hours"
            } else if payload.market == "open" {
                "regular"
            } else {
                "closed"
            };
            Ok(MarketStatus {
                is_open: payload.market == "open",
                session: String::from(session),
                as_of: UtcDateTime::parse_any_offset(&payload.server_time)
                    .map_err(invalid_payload(VENDOR))?,
                next_open: None,
                next_close: None,
            })
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
struct PolygonSingleSnapshot {
    ticker: PolygonTickerSnapshot,
}

#[derive(Debug, Clone, Deserialize)]
struct PolygonSnapshotList {
    #[serde(default)]
    tickers: Vec<PolygonTickerSnapshot>,
}

#[derive(Debug, Clone, Deserialize)]
struct PolygonTickerSnapshot {
    ticker: String,
    day: Option<PolygonDay>,
    #[serde(rename = "lastTrade")]
    last_trade: Option<PolygonLastTrade>,
    #[serde(rename = "lastQuote")]
    last_quote: Option<PolygonLastQuote>,
    #[serde(rename = "prevDay")]
    prev_day: Option<PolygonDay>,
    updated: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
struct PolygonDay {
    c: f64,
    v: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
struct PolygonLastTrade {
    p: f64,
    /// Nanoseconds since epoch.
    t: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
struct PolygonLastQuote {
    #[serde(rename = "p")]
    bid: Option<f64>,
    #[serde(rename = "P")]
    ask: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
struct PolygonAggregates {
    #[serde(default)]
    results: Vec<PolygonAggregate>,
}

#[derive(Debug, Clone, Deserialize)]
struct PolygonAggregate {
    /// Milliseconds since epoch.
    t: i64,
    o: f64,
    h: f64,
    l: f64,
    c: f64,
    v: Option<f64>,
    vw: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
struct PolygonTickerDetails {
    results: PolygonTickerResult,
}

#[derive(Debug, Clone, Deserialize)]
struct PolygonTickerResult {
    name: String,
    primary_exchange: Option<String>,
    market_cap: Option<f64>,
    description: Option<String>,
    homepage_url: Option<String>,
    currency_name: Option<String>,
    sic_description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct PolygonNews {
    #[serde(default)]
    results: Vec<PolygonNewsItem>,
}

#[derive(Debug, Clone, Deserialize)]
struct PolygonNewsItem {
    id: String,
    title: String,
    description: Option<String>,
    publisher: Option<PolygonPublisher>,
    article_url: String,
    #[serde(default)]
    tickers: Vec<String>,
    published_utc: String,
}

#[derive(Debug, Clone, Deserialize)]
struct PolygonPublisher {
    name: String,
}

#[derive(Debug, Clone, Deserialize)]
struct PolygonMarketStatus {
    market: String,
    #[serde(rename = "serverTime")]
    server_time: String,
    #[serde(rename = "earlyHours", default)]
    early_hours: bool,
    #[serde(rename = "afterHours", default)]
    after_hours: bool,
}

fn normalize_snapshot(snapshot: &PolygonTickerSnapshot) -> Result<Quote, VendorError> {
    let symbol = Symbol::parse(&snapshot.ticker).map_err(invalid_payload(VENDOR))?;

    // Outside market hours `day` is zeroed; prevDay still carries the last close.
    let session_close = snapshot
        .day
        .as_ref()
        .filter(|day| day.c > 0.0)
        .or(snapshot.prev_day.as_ref());
    let price = snapshot
        .last_trade
        .as_ref()
        .map(|trade| trade.p)
        .or_else(|| session_close.map(|day| day.c))
        .ok_or_else(|| {
            VendorError::decode(VENDOR, format!("polygon snapshot for {symbol} has no price"))
        })?;

    let nanos = snapshot
        .last_trade
        .as_ref()
        .and_then(|trade| trade.t)
        .or(snapshot.updated);
    let as_of = match nanos {
        Some(nanos) => {
            UtcDateTime::from_unix_millis(nanos / 1_000_000).map_err(invalid_payload(VENDOR))?
        }
        None => UtcDateTime::now(),
    };

    let quote = snapshot.last_quote.as_ref();
    Quote::new(
        symbol,
        price,
        quote.and_then(|q| q.bid).filter(|bid| *bid > 0.0),
        quote.and_then(|q| q.ask).filter(|ask| *ask > 0.0),
        session_close.and_then(|day| day.v).map(volume_from_f64),
        "USD",
        as_of,
    )
    .map_err(invalid_payload(VENDOR))
}

fn normalize_aggregate(aggregate: PolygonAggregate) -> Result<Bar, VendorError> {
    let ts = UtcDateTime::from_unix_millis(aggregate.t).map_err(invalid_payload(VENDOR))?;
    Bar::new(
        ts,
        aggregate.o,
        aggregate.h,
        aggregate.l,
        aggregate.c,
        aggregate.v.map(volume_from_f64),
        aggregate.vw,
    )
    .map_err(invalid_payload(VENDOR))
}

fn volume_from_f64(value: f64) -> u64 {
    if value.is_finite() && value > 0.0 {
        value.round() as u64
    } else {
        0
    }
}
