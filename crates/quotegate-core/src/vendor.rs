use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Canonical upstream vendor identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VendorId {
    Alpaca,
    Polygon,
    Fmp,
}

impl VendorId {
    pub const ALL: [Self; 3] = [Self::Alpaca, Self::Polygon, Self::Fmp];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Alpaca => "alpaca",
            Self::Polygon => "polygon",
            Self::Fmp => "fmp",
        }
    }
}

impl Display for VendorId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VendorId {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "alpaca" => Ok(Self::Alpaca),
            "polygon" => Ok(Self::Polygon),
            "fmp" | "financialmodelingprep" => Ok(Self::Fmp),
            other => Err(ValidationError::InvalidVendor {
                value: other.to_owned(),
            }),
        }
    }
}
