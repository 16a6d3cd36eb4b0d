//! Vendor adapters.
//!
//! | Adapter | Market data | Reference | News | Market status | Trading |
//! |---------|-------------|-----------|------|---------------|---------|
//! | [`AlpacaAdapter`] | yes | assets | yes | clock | yes |
//! | [`PolygonAdapter`] | yes | tickers | yes | yes | no |
//! | [`FmpAdapter`] | yes | profile | yes | yes | no |
//!
//! Each adapter owns a [`VendorClient`](crate::VendorClient) and only translates between the
//! vendor's wire format and the domain types.

mod alpaca;
mod fmp;
mod polygon;

pub use alpaca::AlpacaAdapter;
pub use fmp::FmpAdapter;
pub use polygon::PolygonAdapter;

use crate::{ValidationError, VendorError, VendorId};

/// Maps a domain validation failure on vendor data to a decode error.
pub(crate) fn invalid_payload(vendor: VendorId) -> impl Fn(ValidationError) -> VendorError {
    move |error| VendorError::decode(vendor, format!("{vendor} payload rejected: {error}"))
}

/// Serde helpers for vendors that encode decimals as JSON strings.
pub(crate) mod lenient_f64 {
    use serde::de::Error as DeError;
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    fn convert<E: DeError>(raw: Raw) -> Result<f64, E> {
        match raw {
            Raw::Number(value) => Ok(value),
            Raw::Text(text) => text
                .trim()
                .parse::<f64>()
                .map_err(|_| E::custom(format!("expected decimal, got '{text}'"))),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        convert(Raw::deserialize(deserializer)?)
    }

    pub fn option<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
        Option::<Raw>::deserialize(deserializer)?
            .map(convert)
            .transpose()
    }
}
