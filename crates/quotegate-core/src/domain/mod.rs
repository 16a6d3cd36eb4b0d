//! # Domain Models
//!
//! Vendor-neutral shapes returned by every gateway operation.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Quote`] | Last price with optional bid/ask |
//! | [`BarSeries`] | OHLCV bars for a symbol/timeframe |
//! | [`CompanyProfile`] | Company reference data |
//! | [`NewsArticle`] | Headline tagged with symbols |
//! | [`MarketStatus`] | Session open/closed state |
//! | [`Account`], [`Position`], [`Order`] | Brokerage state |
//! | [`OrderRequest`] | Validated order submission |
//!
//! All constructors validate their invariants and return [`ValidationError`](crate::ValidationError).

mod models;
mod symbol;
mod timeframe;
mod timestamp;
mod trading;

pub use models::{
    validate_currency_code, Bar, BarSeries, CompanyProfile, MarketStatus, NewsArticle, Quote,
};
pub(crate) use symbol::join_symbols;
pub use symbol::Symbol;
pub use timeframe::Timeframe;
pub use timestamp::UtcDateTime;
pub use trading::{
    Account, Order, OrderRequest, OrderSide, OrderStatus, OrderStatusFilter, OrderType,
    OrdersQuery, Position, PositionSide, TimeInForce,
};
