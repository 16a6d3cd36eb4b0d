use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Bar aggregation timeframe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    OneMinute,
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "1d")]
    OneDay,
}

impl Timeframe {
    pub const ALL: [Self; 5] = [
        Self::OneMinute,
        Self::FiveMinutes,
        Self::FifteenMinutes,
        Self::OneHour,
        Self::OneDay,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OneMinute => "1m",
            Self::FiveMinutes => "5m",
            Self::FifteenMinutes => "15m",
            Self::OneHour => "1h",
            Self::OneDay => "1d",
        }
    }

    /// `(multiplier, unit)` pair used by aggregate-style endpoints.
    pub const fn span(self) -> (u32, &'static str) {
        match self {
            Self::OneMinute => (1, "minute"),
            Self::FiveMinutes => (5, "minute"),
            Self::FifteenMinutes => (15, "minute"),
            Self::OneHour => (1, "hour"),
            Self::OneDay => (1, "day"),
        }
    }

    pub const fn is_intraday(self) -> bool {
        !matches!(self, Self::OneDay)
    }
}

impl Display for Timeframe {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "1m" | "1min" => Ok(Self::OneMinute),
            "5m" | "5min" => Ok(Self::FiveMinutes),
            "15m" | "15min" => Ok(Self::FifteenMinutes),
            "1h" | "60m" => Ok(Self::OneHour),
            "1d" | "day" => Ok(Self::OneDay),
            other => Err(ValidationError::InvalidTimeframe {
                value: other.to_owned(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_timeframe() {
        assert_eq!(Timeframe::from_str("1d").expect("must parse"), Timeframe::OneDay);
        assert_eq!(
            Timeframe::from_str("5MIN").expect("must parse"),
            Timeframe::FiveMinutes
        );
    }

    #[test]
    fn rejects_invalid_timeframe() {
        let err = Timeframe::from_str("2h").expect_err("must fail");
        assert!(matches!(err, ValidationError::InvalidTimeframe { .. }));
    }
}
