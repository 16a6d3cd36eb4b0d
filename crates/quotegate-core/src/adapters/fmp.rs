use std::sync::Arc;

use serde::Deserialize;

use super::invalid_payload;
use crate::data_source::{BarsRequest, CapabilitySet, DataSource, VendorFuture};
use crate::domain::join_symbols;
use crate::http_client::{HttpAuth, HttpClient};
use crate::notify::NotificationSink;
use crate::{
    Bar, BarSeries, CircuitState, CompanyProfile, MarketStatus, NewsArticle, Quote, Symbol,
    Timeframe, UtcDateTime, VendorClient, VendorError, VendorId, VendorPolicy,
};

const VENDOR: VendorId = VendorId::Fmp;

/// Financial Modeling Prep adapter. Trading is not offered.
///
/// FMP reports intraday bar and news times without an offset; they are read as UTC.
#[derive(Debug)]
pub struct FmpAdapter {
    client: VendorClient,
    base_url: String,
}

impl FmpAdapter {
    pub const BASE_URL: &'static str = "https://financialmodelingprep.com/api/v3";

    pub fn new(
        policy: &VendorPolicy,
        http: Arc<dyn HttpClient>,
        api_key: impl Into<String>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        let auth = HttpAuth::QueryParam {
            name: String::from("apikey"),
            value: api_key.into(),
        };
        Self {
            client: VendorClient::new(policy, http, auth, sink),
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

    async fn fetch_quotes(&self, symbols: &[Symbol]) -> Result<Vec<Quote>, VendorError> {
        let url = format!(
            "{}/quote/{}",
            self.base_url,
            urlencoding::encode(&join_symbols(symbols))
        );
        let payload: Vec<FmpQuote> = self.client.get_json(url).await?;
        payload.into_iter().map(normalize_quote).collect()
    }
}

impl DataSource for FmpAdapter {
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
            self.fetch_quotes(std::slice::from_ref(symbol))
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| {
                    VendorError::from_status(VENDOR, 404, format!("fmp has no quote for {symbol}"))
                })
        })
    }

    fn quotes<'a>(&'a self, symbols: &'a [Symbol]) -> VendorFuture<'a, Vec<Quote>> {
        Box::pin(async move { self.fetch_quotes(symbols).await })
    }

    fn bars<'a>(&'a self, req: &'a BarsRequest) -> VendorFuture<'a, BarSeries> {
        Box::pin(async move {
            let symbol = urlencoding::encode(req.symbol.as_str());
            let range = format!(
                "from={}&to={}",
                req.start.date_string(),
                req.end.date_string()
            );

            let raw = match fmp_interval(req.timeframe) {
                None => {
                    let url = format!("{}/historical-price-full/{symbol}?{range}", self.base_url);
                    self.client
                        .get_json::<FmpDailyHistory>(url)
                        .await?
                        .historical
                }
                Some(interval) => {
                    let url = format!(
                        "{}/historical-chart/{interval}/{symbol}?{range}",
                        self.base_url
                    );
                    self.client.get_json::<Vec<FmpBar>>(url).await?
                }
            };

            let bars = raw
                .into_iter()
                .map(normalize_bar)
                .filter(|bar| {
                    bar.as_ref()
                        .map_or(true, |bar| bar.ts >= req.start && bar.ts <= req.end)
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(BarSeries::new(req.symbol.clone(), req.timeframe, bars))
        })
    }

    fn company_info<'a>(&'a self, symbol: &'a Symbol) -> VendorFuture<'a, CompanyProfile> {
        Box::pin(async move {
            let url = format!(
                "{}/profile/{}",
                self.base_url,
                urlencoding::encode(symbol.as_str())
            );
            let payload: Vec<FmpProfile> = self.client.get_json(url).await?;
            let Some(raw) = payload.into_iter().next() else {
                return Err(VendorError::from_status(
                    VENDOR,
                    404,
                    format!("fmp has no profile for {symbol}"),
                ));
            };

            let mut profile = CompanyProfile::new(
                symbol.clone(),
                raw.company_name,
                raw.currency.as_deref().unwrap_or("USD"),
            )
            .and_then(|profile| profile.with_market_cap(raw.mkt_cap))
            .map_err(invalid_payload(VENDOR))?;
            profile.exchange = raw.exchange_short_name;
            profile.sector = raw.sector.filter(|value| !value.is_empty());
            profile.industry = raw.industry.filter(|value| !value.is_empty());
            profile.description = raw.description;
            profile.website = raw.website.filter(|value| !value.is_empty());
            Ok(profile)
        })
    }

    fn news<'a>(&'a self, symbol: &'a Symbol, limit: usize) -> VendorFuture<'a, Vec<NewsArticle>> {
        Box::pin(async move {
            let url = format!(
                "{}/stock_news?tickers={}&limit={limit}",
                self.base_url,
                urlencoding::encode(symbol.as_str())
            );
            let payload: Vec<FmpNews> = self.client.get_json(url).await?;

            payload
                .into_iter()
                .take(limit)
                .map(|item| {
                    let published_at = UtcDateTime::parse_naive(&item.published_date)
                        .map_err(invalid_payload(VENDOR))?;
                    Ok(NewsArticle {
                        id: format!("{}-{}", item.symbol, published_at.unix_millis()),
                        headline: item.title,
                        summary: item.text.filter(|text| !text.is_empty()),
                        source: item.site.unwrap_or_else(|| String::from("fmp")),
                        symbols: Symbol::parse(&item.symbol).into_iter().collect(),
                        url: item.url,
                        published_at,
                    })
                })
                .collect()
        })
    }

    fn market_status<'a>(&'a self) -> VendorFuture<'a, MarketStatus> {
        Box::pin(async move {
            let payload: FmpMarketOpen = self
                .client
                .get_json(format!("{}/is-the-market-open", self.base_url))
                .await?;
            Ok(MarketStatus {
                is_open: payload.is_open,
                session: String::from(if payload.is_open { "regular" } else { "closed" }),
                as_of: UtcDateTime::now(),
                next_open: None,
                next_close: None,
            })
        })
    }
}

const fn fmp_interval(timeframe: Timeframe) -> Option<&'static str> {
    match timeframe {
        Timeframe::OneMinute => Some("1min"),
        Timeframe::FiveMinutes => Some("5min"),
        Timeframe::FifteenMinutes => Some("15min"),
        Timeframe::OneHour => Some("1hour"),
        Timeframe::OneDay => None,
    }
}

#[derive(Debug, Clone, Deserialize)]
struct FmpQuote {
    symbol: String,
    price: f64,
    volume: Option<f64>,
    /// Seconds since epoch.
    timestamp: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
struct FmpDailyHistory {
    #[serde(default)]
    historical: Vec<FmpBar>,
}

#[derive(Debug, Clone, Deserialize)]
struct FmpBar {
    date: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: Option<f64>,
    vwap: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FmpProfile {
    company_name: String,
    exchange_short_name: Option<String>,
    sector: Option<String>,
    industry: Option<String>,
    mkt_cap: Option<f64>,
    description: Option<String>,
    website: Option<String>,
    currency: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FmpNews {
    symbol: String,
    published_date: String,
    title: String,
    site: Option<String>,
    text: Option<String>,
    url: String,
}

#[derive(Debug, Clone, Deserialize)]
struct FmpMarketOpen {
    #[serde(rename = "isTheStockMarketOpen")]
    is_open: bool,
}

fn normalize_quote(raw: FmpQuote) -> Result<Quote, VendorError> {
    let as_of = match raw.timestamp {
        Some(seconds) => UtcDateTime::from_unix_seconds(seconds).map_err(invalid_payload(VENDOR))?,
        None => UtcDateTime::now(),
    };
    Quote::new(
        Symbol::parse(&raw.symbol).map_err(invalid_payload(VENDOR))?,
        raw.price,
        None,
        None,
        raw.volume
            .filter(|volume| volume.is_finite() && *volume >= 0.0)
            .map(|volume| volume.round() as u64),
        "USD",
        as_of,
    )
    .map_err(invalid_payload(VENDOR))
}

fn normalize_bar(raw: FmpBar) -> Result<Bar, VendorError> {
    let ts = UtcDateTime::parse_naive(&raw.date).map_err(invalid_payload(VENDOR))?;
    Bar::new(
        ts,
        raw.open,
        raw.high,
        raw.low,
        raw.close,
        raw.volume
            .filter(|volume| volume.is_finite() && *volume >= 0.0)
            .map(|volume| volume.round() as u64),
        raw.vwap,
    )
    .map_err(invalid_payload(VENDOR))
}
