use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::cache::CacheKey;
use crate::domain::OrdersQuery;
use crate::{BarsRequest, DataType, Symbol};

/// Replayable description of a cacheable gateway read.
///
/// The prefetch refresher stores these and replays them with an explicit `match`, so every
/// read the gateway can cache has a variant here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum GatewayQuery {
    Quote { symbol: Symbol },
    Quotes { symbols: Vec<Symbol> },
    Bars { request: BarsRequest },
    CompanyInfo { symbol: Symbol },
    News { symbol: Symbol, limit: usize },
    MarketStatus,
    Account,
    Positions,
    Position { symbol: Symbol },
    Orders { query: OrdersQuery },
}

/// Cache key patterns touched by order placement and cancellation.
pub(crate) const TRADING_STATE_PATTERNS: [&str; 3] =
    ["get_account:*", "get_position*", "get_orders:*"];

impl GatewayQuery {
    /// Gateway method name; the first segment of the cache key.
    pub const fn operation(&self) -> &'static str {
        match self {
            Self::Quote { .. } => "get_quote",
            Self::Quotes { .. } => "get_quotes",
            Self::Bars { .. } => "get_bars",
            Self::CompanyInfo { .. } => "get_company_info",
            Self::News { .. } => "get_news",
            Self::MarketStatus => "get_market_status",
            Self::Account => "get_account",
            Self::Positions => "get_positions",
            Self::Position { .. } => "get_position",
            Self::Orders { .. } => "get_orders",
        }
    }

    pub const fn data_type(&self) -> DataType {
        match self {
            Self::Quote { .. } => DataType::Quote,
            Self::Quotes { .. } => DataType::Quotes,
            Self::Bars { .. } => DataType::Bars,
            Self::CompanyInfo { .. } => DataType::CompanyInfo,
            Self::News { .. } => DataType::News,
            Self::MarketStatus => DataType::MarketStatus,
            Self::Account => DataType::Account,
            Self::Positions | Self::Position { .. } => DataType::Positions,
            Self::Orders { .. } => DataType::Orders,
        }
    }

    fn params(&self) -> Value {
        match self {
            Self::Quote { symbol } | Self::CompanyInfo { symbol } | Self::Position { symbol } => {
                json!({ "symbol": symbol })
            }
            Self::Quotes { symbols } => json!({ "symbols": symbols }),
            Self::Bars { request } => json!(request),
            Self::News { symbol, limit } => json!({ "symbol": symbol, "limit": limit }),
            Self::Orders { query } => json!(query),
            Self::MarketStatus | Self::Account | Self::Positions => json!({}),
        }
    }

    pub fn cache_key(&self) -> CacheKey {
        CacheKey::derive(self.operation(), &self.params())
    }
}
