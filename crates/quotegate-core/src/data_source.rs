//! Vendor contract and per-call types.
//!
//! This module defines the adapter contract (`DataSource`) that every vendor client follows,
//! the data type taxonomy used for routing, caching and quality telemetry, and the
//! classified [`VendorError`] every vendor operation returns on failure.
//!
//! # Data types
//!
//! | Data type | Default TTL | Vendor priority |
//! |-----------|-------------|-----------------|
//! | `quote`, `quotes` | 15 s | alpaca, polygon, fmp |
//! | `bars` | 5 min | alpaca, polygon, fmp |
//! | `company_info` | 24 h | fmp, polygon, alpaca |
//! | `news` | 5 min | alpaca, polygon, fmp |
//! | `market_status` | 60 s | alpaca, polygon, fmp |
//! | `account`, `positions` | 30 s | alpaca |
//! | `orders` | 10 s | alpaca |
//! | `trading` | not cached | alpaca |

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    Account, BarSeries, CircuitState, CompanyProfile, MarketStatus, NewsArticle, Order,
    OrderRequest, OrdersQuery, Position, Quote, Symbol, Timeframe, UtcDateTime,
    ValidationError, VendorId,
};

/// Boxed future returned by every vendor operation.
pub type VendorFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, VendorError>> + Send + 'a>>;

/// Category of data requested, used for vendor ordering, TTLs and quality records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Quote,
    Quotes,
    Bars,
    CompanyInfo,
    News,
    MarketStatus,
    Account,
    Positions,
    Orders,
    Trading,
}

const MARKET_DATA_ORDER: &[VendorId] = &[VendorId::Alpaca, VendorId::Polygon, VendorId::Fmp];
const REFERENCE_ORDER: &[VendorId] = &[VendorId::Fmp, VendorId::Polygon, VendorId::Alpaca];
const BROKER_ORDER: &[VendorId] = &[VendorId::Alpaca];

impl DataType {
    pub const ALL: [Self; 10] = [
        Self::Quote,
        Self::Quotes,
        Self::Bars,
        Self::CompanyInfo,
        Self::News,
        Self::MarketStatus,
        Self::Account,
        Self::Positions,
        Self::Orders,
        Self::Trading,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Quote => "quote",
            Self::Quotes => "quotes",
            Self::Bars => "bars",
            Self::CompanyInfo => "company_info",
            Self::News => "news",
            Self::MarketStatus => "market_status",
            Self::Account => "account",
            Self::Positions => "positions",
            Self::Orders => "orders",
            Self::Trading => "trading",
        }
    }

    /// Static vendor priority; the first entry is the primary.
    pub const fn priority(self) -> &'static [VendorId] {
        match self {
            Self::CompanyInfo => REFERENCE_ORDER,
            Self::Account | Self::Positions | Self::Orders | Self::Trading => BROKER_ORDER,
            Self::Quote | Self::Quotes | Self::Bars | Self::News | Self::MarketStatus => {
                MARKET_DATA_ORDER
            }
        }
    }

    /// TTL applied on write-through when the caller does not supply one.
    pub const fn default_ttl(self) -> Duration {
        match self {
            Self::Quote | Self::Quotes => Duration::from_secs(15),
            Self::Bars | Self::News => Duration::from_secs(5 * 60),
            Self::CompanyInfo => Duration::from_secs(24 * 60 * 60),
            Self::MarketStatus => Duration::from_secs(60),
            Self::Account | Self::Positions => Duration::from_secs(30),
            Self::Orders => Duration::from_secs(10),
            Self::Trading => Duration::ZERO,
        }
    }
}

impl Display for DataType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operations a vendor can serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySet {
    pub market_data: bool,
    pub reference: bool,
    pub news: bool,
    pub market_status: bool,
    pub trading: bool,
}

impl CapabilitySet {
    pub const fn new(
        market_data: bool,
        reference: bool,
        news: bool,
        market_status: bool,
        trading: bool,
    ) -> Self {
        Self {
            market_data,
            reference,
            news,
            market_status,
            trading,
        }
    }

    pub const fn full() -> Self {
        Self::new(true, true, true, true, true)
    }

    pub const fn supports(self, data_type: DataType) -> bool {
        match data_type {
            DataType::Quote | DataType::Quotes | DataType::Bars => self.market_data,
            DataType::CompanyInfo => self.reference,
            DataType::News => self.news,
            DataType::MarketStatus => self.market_status,
            DataType::Account | DataType::Positions | DataType::Orders | DataType::Trading => {
                self.trading
            }
        }
    }

    pub fn supported(self) -> Vec<&'static str> {
        let mut values = Vec::with_capacity(5);
        if self.market_data {
            values.push("market_data");
        }
        if self.reference {
            values.push("reference");
        }
        if self.news {
            values.push("news");
        }
        if self.market_status {
            values.push("market_status");
        }
        if self.trading {
            values.push("trading");
        }
        values
    }
}

/// Vendor-level error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VendorErrorKind {
    /// Transport failure or request timeout.
    Network,
    /// HTTP 429.
    RateLimited,
    /// HTTP 5xx.
    Server,
    /// HTTP 4xx other than 429.
    Client,
    /// Breaker refused the call; no request was made.
    CircuitOpen,
    /// Local request quota would not refill within the request timeout; no request was made.
    Throttled,
    /// Payload could not be normalised.
    Decode,
    Unsupported,
}

impl VendorErrorKind {
    pub const fn retryable(self) -> bool {
        matches!(self, Self::Network | Self::RateLimited | Self::Server)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::RateLimited => "rate_limited",
            Self::Server => "server",
            Self::Client => "client",
            Self::CircuitOpen => "circuit_open",
            Self::Throttled => "throttled",
            Self::Decode => "decode",
            Self::Unsupported => "unsupported",
        }
    }
}

/// Structured vendor error consumed by the retry policy and fallback executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VendorError {
    vendor: VendorId,
    kind: VendorErrorKind,
    status: Option<u16>,
    message: String,
}

impl VendorError {
    pub fn new(vendor: VendorId, kind: VendorErrorKind, message: impl Into<String>) -> Self {
        Self {
            vendor,
            kind,
            status: None,
            message: message.into(),
        }
    }

    pub fn network(vendor: VendorId, message: impl Into<String>) -> Self {
        Self::new(vendor, VendorErrorKind::Network, message)
    }

    pub fn timeout(vendor: VendorId, timeout: Duration) -> Self {
        Self::network(
            vendor,
            format!("request timed out after {} ms", timeout.as_millis()),
        )
    }

    pub fn circuit_open(vendor: VendorId) -> Self {
        Self::new(
            vendor,
            VendorErrorKind::CircuitOpen,
            format!("vendor '{vendor}' is unavailable (circuit open)"),
        )
    }

    pub fn throttled(vendor: VendorId) -> Self {
        Self::new(
            vendor,
            VendorErrorKind::Throttled,
            format!("local request quota for '{vendor}' is exhausted"),
        )
    }

    pub fn decode(vendor: VendorId, message: impl Into<String>) -> Self {
        Self::new(vendor, VendorErrorKind::Decode, message)
    }

    pub fn unsupported(vendor: VendorId, operation: &str) -> Self {
        Self::new(
            vendor,
            VendorErrorKind::Unsupported,
            format!("operation '{operation}' is not supported by '{vendor}'"),
        )
    }

    /// Classifies a non-success HTTP status.
    pub fn from_status(vendor: VendorId, status: u16, message: impl Into<String>) -> Self {
        let kind = match status {
            429 => VendorErrorKind::RateLimited,
            500..=599 => VendorErrorKind::Server,
            _ => VendorErrorKind::Client,
        };
        Self {
            vendor,
            kind,
            status: Some(status),
            message: message.into(),
        }
    }

    pub const fn vendor(&self) -> VendorId {
        self.vendor
    }

    pub const fn kind(&self) -> VendorErrorKind {
        self.kind
    }

    pub const fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn retryable(&self) -> bool {
        self.kind.retryable()
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == VendorErrorKind::Client && self.status == Some(404)
    }
}

impl Display for VendorError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(status) => write!(
                f,
                "{} [{}:{} {}]",
                self.message,
                self.vendor,
                self.kind.as_str(),
                status
            ),
            None => write!(f, "{} [{}:{}]", self.message, self.vendor, self.kind.as_str()),
        }
    }
}

impl std::error::Error for VendorError {}

/// Request payload for bar endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BarsRequest {
    pub symbol: Symbol,
    pub timeframe: Timeframe,
    pub start: UtcDateTime,
    pub end: UtcDateTime,
}

impl BarsRequest {
    pub fn new(
        symbol: Symbol,
        timeframe: Timeframe,
        start: UtcDateTime,
        end: UtcDateTime,
    ) -> Result<Self, ValidationError> {
        if start >= end {
            return Err(ValidationError::InvalidRange);
        }
        Ok(Self {
            symbol,
            timeframe,
            start,
            end,
        })
    }
}

/// Fraction of a result considered usable by the quality scorer.
pub trait Completeness {
    fn completeness(&self) -> f64;
}

macro_rules! complete_when_present {
    ($($ty:ty),* $(,)?) => {
        $(impl Completeness for $ty {
            fn completeness(&self) -> f64 {
                1.0
            }
        })*
    };
}

complete_when_present!(
    Quote,
    CompanyProfile,
    MarketStatus,
    Account,
    Position,
    Order,
    NewsArticle,
    ()
);

impl<T> Completeness for Vec<T> {
    fn completeness(&self) -> f64 {
        if self.is_empty() {
            0.5
        } else {
            1.0
        }
    }
}

impl<T: Completeness> Completeness for Option<T> {
    fn completeness(&self) -> f64 {
        self.as_ref().map_or(0.0, Completeness::completeness)
    }
}

impl Completeness for BarSeries {
    fn completeness(&self) -> f64 {
        self.bars.completeness()
    }
}

/// Vendor adapter contract.
///
/// | Method | Data type |
/// |--------|-----------|
/// | [`quote`](DataSource::quote) | `quote` |
/// | [`quotes`](DataSource::quotes) | `quotes` |
/// | [`bars`](DataSource::bars) | `bars` |
/// | [`company_info`](DataSource::company_info) | `company_info` |
/// | [`news`](DataSource::news) | `news` |
/// | [`market_status`](DataSource::market_status) | `market_status` |
/// | [`account`](DataSource::account) | `account` |
/// | [`positions`](DataSource::positions), [`position`](DataSource::position) | `positions` |
/// | [`orders`](DataSource::orders) | `orders` |
/// | [`place_order`](DataSource::place_order), [`cancel_order`](DataSource::cancel_order) | `trading` |
///
/// Trading methods default to an `Unsupported` error so market-data-only vendors only
/// implement what they serve. Implementations must reject calls with `CircuitOpen` without
/// touching the network while their breaker is open.
pub trait DataSource: Send + Sync {
    fn id(&self) -> VendorId;

    fn capabilities(&self) -> CapabilitySet;

    fn circuit_state(&self) -> CircuitState;

    fn quote<'a>(&'a self, symbol: &'a Symbol) -> VendorFuture<'a, Quote>;

    fn quotes<'a>(&'a self, symbols: &'a [Symbol]) -> VendorFuture<'a, Vec<Quote>>;

    fn bars<'a>(&'a self, req: &'a BarsRequest) -> VendorFuture<'a, BarSeries>;

    fn company_info<'a>(&'a self, symbol: &'a Symbol) -> VendorFuture<'a, CompanyProfile>;

    fn news<'a>(&'a self, symbol: &'a Symbol, limit: usize) -> VendorFuture<'a, Vec<NewsArticle>>;

    fn market_status<'a>(&'a self) -> VendorFuture<'a, MarketStatus>;

    fn account<'a>(&'a self) -> VendorFuture<'a, Account> {
        unsupported(self.id(), "account")
    }

    fn positions<'a>(&'a self) -> VendorFuture<'a, Vec<Position>> {
        unsupported(self.id(), "positions")
    }

    /// A 404 from the broker means "no position" and resolves to `Ok(None)`.
    fn position<'a>(&'a self, symbol: &'a Symbol) -> VendorFuture<'a, Option<Position>> {
        let _ = symbol;
        unsupported(self.id(), "position")
    }

    fn orders<'a>(&'a self, query: &'a OrdersQuery) -> VendorFuture<'a, Vec<Order>> {
        let _ = query;
        unsupported(self.id(), "orders")
    }

    fn place_order<'a>(&'a self, order: &'a OrderRequest) -> VendorFuture<'a, Order> {
        let _ = order;
        unsupported(self.id(), "place_order")
    }

    fn cancel_order<'a>(&'a self, order_id: &'a str) -> VendorFuture<'a, ()> {
        let _ = order_id;
        unsupported(self.id(), "cancel_order")
    }
}

fn unsupported<'a, T: Send + 'a>(vendor: VendorId, operation: &'static str) -> VendorFuture<'a, T> {
    Box::pin(async move { Err(VendorError::unsupported(vendor, operation)) })
}
