use std::fmt::{Display, Formatter};

use thiserror::Error;

use crate::data_source::{DataType, VendorError};
use crate::VendorId;

/// Validation errors raised while constructing domain values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("symbol cannot be empty")]
    EmptySymbol,
    #[error("symbol length {len} exceeds max {max}")]
    SymbolTooLong { len: usize, max: usize },
    #[error("symbol must start with an ASCII letter: '{ch}'")]
    SymbolInvalidStart { ch: char },
    #[error("symbol contains invalid character '{ch}' at index {index}")]
    SymbolInvalidChar { ch: char, index: usize },

    #[error("invalid timeframe '{value}', expected one of 1m, 5m, 15m, 1h, 1d")]
    InvalidTimeframe { value: String },
    #[error("invalid vendor '{value}', expected one of alpaca, polygon, fmp")]
    InvalidVendor { value: String },

    #[error("timestamp must be RFC3339 UTC (suffix Z): '{value}'")]
    TimestampNotUtc { value: String },
    #[error("timestamp could not be parsed: '{value}'")]
    InvalidTimestamp { value: String },
    #[error("range start must be before range end")]
    InvalidRange,

    #[error("currency must be a 3-letter uppercase ISO code: '{value}'")]
    InvalidCurrency { value: String },

    #[error("field '{field}' must be finite")]
    NonFiniteValue { field: &'static str },
    #[error("field '{field}' must be non-negative")]
    NegativeValue { field: &'static str },
    #[error("field '{field}' must be greater than zero")]
    NonPositiveValue { field: &'static str },

    #[error("bar high must be >= low")]
    InvalidBarRange,
    #[error("bar open/close must be within high/low range")]
    InvalidBarBounds,

    #[error("request must include at least one symbol")]
    EmptySymbolList,
    #[error("limit must be greater than zero")]
    ZeroLimit,
    #[error("{order_type} orders require a {field}")]
    MissingOrderPrice {
        order_type: &'static str,
        field: &'static str,
    },
    #[error("order id cannot be empty")]
    EmptyOrderId,
}

/// Single failed vendor attempt captured inside [`GatewayError::AllSourcesFailed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VendorFailure {
    pub vendor: VendorId,
    pub error: VendorError,
}

impl Display for VendorFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.vendor, self.error)
    }
}

/// Errors surfaced by the unified gateway.
///
/// Callers never observe an individual vendor error directly; vendor failures are nested
/// inside `AllSourcesFailed`.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GatewayError {
    #[error("all sources failed for '{data_type}' ({} attempted)", failures.len())]
    AllSourcesFailed {
        data_type: DataType,
        failures: Vec<VendorFailure>,
    },

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl GatewayError {
    /// Nested per-vendor causes, in the order they were attempted.
    pub fn failures(&self) -> &[VendorFailure] {
        match self {
            Self::AllSourcesFailed { failures, .. } => failures,
            Self::Validation(_) => &[],
        }
    }

    pub fn last_failure(&self) -> Option<&VendorFailure> {
        self.failures().last()
    }
}

/// Invalid environment or file configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("environment variable '{key}' has invalid value '{value}': {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}
