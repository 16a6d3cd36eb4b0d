use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use super::models::validate_positive;
use crate::{Symbol, UtcDateTime, ValidationError};

/// Brokerage account balances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub account_id: String,
    pub status: String,
    pub currency: String,
    pub cash: f64,
    pub buying_power: f64,
    pub equity: f64,
    pub portfolio_value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionSide {
    Long,
    Short,
}

/// Open position in a single symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: Symbol,
    pub qty: f64,
    pub side: PositionSide,
    pub avg_entry_price: f64,
    pub market_value: Option<f64>,
    pub current_price: Option<f64>,
    pub unrealized_pl: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Market,
    Limit,
    Stop,
    StopLimit,
}

impl OrderType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Market => "market",
            Self::Limit => "limit",
            Self::Stop => "stop",
            Self::StopLimit => "stop_limit",
        }
    }
}

impl Display for OrderType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeInForce {
    Day,
    Gtc,
    Ioc,
    Fok,
}

/// Order lifecycle state normalised across brokers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    New,
    Accepted,
    PartiallyFilled,
    Filled,
    Canceled,
    Expired,
    Rejected,
    PendingCancel,
    Other(String),
}

impl OrderStatus {
    pub fn from_vendor(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "new" | "pending_new" => Self::New,
            "accepted" | "accepted_for_bidding" => Self::Accepted,
            "partially_filled" => Self::PartiallyFilled,
            "filled" => Self::Filled,
            "canceled" | "cancelled" => Self::Canceled,
            "expired" => Self::Expired,
            "rejected" => Self::Rejected,
            "pending_cancel" => Self::PendingCancel,
            other => Self::Other(other.to_owned()),
        }
    }
}

/// Broker order as reported after submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub client_order_id: Option<String>,
    pub symbol: Symbol,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub time_in_force: TimeInForce,
    pub qty: f64,
    pub filled_qty: f64,
    pub limit_price: Option<f64>,
    pub stop_price: Option<f64>,
    pub status: OrderStatus,
    pub submitted_at: Option<UtcDateTime>,
}

/// Validated order submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: Symbol,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub time_in_force: TimeInForce,
    pub qty: f64,
    pub limit_price: Option<f64>,
    pub stop_price: Option<f64>,
    pub client_order_id: String,
}

impl OrderRequest {
    pub fn market(symbol: Symbol, side: OrderSide, qty: f64) -> Result<Self, ValidationError> {
        Self::new(symbol, side, OrderType::Market, TimeInForce::Day, qty, None, None)
    }

    pub fn limit(
        symbol: Symbol,
        side: OrderSide,
        qty: f64,
        limit_price: f64,
    ) -> Result<Self, ValidationError> {
        Self::new(
            symbol,
            side,
            OrderType::Limit,
            TimeInForce::Day,
            qty,
            Some(limit_price),
            None,
        )
    }

    /// Builds a request with a fresh `client_order_id`, so a resubmitted request is
    /// recognisable as a duplicate by the broker.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        symbol: Symbol,
        side: OrderSide,
        order_type: OrderType,
        time_in_force: TimeInForce,
        qty: f64,
        limit_price: Option<f64>,
        stop_price: Option<f64>,
    ) -> Result<Self, ValidationError> {
        validate_positive("qty", qty)?;
        if let Some(price) = limit_price {
            validate_positive("limit_price", price)?;
        }
        if let Some(price) = stop_price {
            validate_positive("stop_price", price)?;
        }

        let needs_limit = matches!(order_type, OrderType::Limit | OrderType::StopLimit);
        let needs_stop = matches!(order_type, OrderType::Stop | OrderType::StopLimit);
        if needs_limit && limit_price.is_none() {
            return Err(ValidationError::MissingOrderPrice {
                order_type: order_type.as_str(),
                field: "limit_price",
            });
        }
        if needs_stop && stop_price.is_none() {
            return Err(ValidationError::MissingOrderPrice {
                order_type: order_type.as_str(),
                field: "stop_price",
            });
        }

        Ok(Self {
            symbol,
            side,
            order_type,
            time_in_force,
            qty,
            limit_price,
            stop_price,
            client_order_id: uuid::Uuid::new_v4().to_string(),
        })
    }
}

/// Which orders to list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatusFilter {
    Open,
    Closed,
    All,
}

impl OrderStatusFilter {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
            Self::All => "all",
        }
    }
}

/// Query parameters for order listing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrdersQuery {
    pub status: OrderStatusFilter,
    pub limit: usize,
    pub symbols: Vec<Symbol>,
}

impl OrdersQuery {
    pub fn new(status: OrderStatusFilter, limit: usize) -> Result<Self, ValidationError> {
        if limit == 0 {
            return Err(ValidationError::ZeroLimit);
        }
        Ok(Self {
            status,
            limit,
            symbols: Vec::new(),
        })
    }

    pub fn with_symbols(mut self, symbols: Vec<Symbol>) -> Self {
        self.symbols = symbols;
        self
    }
}

impl Default for OrdersQuery {
    fn default() -> Self {
        Self {
            status: OrderStatusFilter::Open,
            limit: 50,
            symbols: Vec::new(),
        }
    }
}
