//! Chart resolutions: the bar granularity the charting widget asks for.
//!
//! The widget speaks in short strings (`"1"`, `"15"`, `"60"`, `"1D"`, `"W"`, `"1M"`).
//! [`Resolution`] parses those into an amount × unit pair, renders them back in
//! canonical form, and knows how wide a bar is so backfill windows can be sized.
//!
//! ```
//! use market_datafeed::models::resolution::{Resolution, ResolutionUnit};
//!
//! let r: Resolution = "240".parse().unwrap();
//! assert_eq!(r.unit(), ResolutionUnit::Hour);
//! assert_eq!(r.to_string(), "240");
//! ```

use std::{fmt, num::NonZeroU32, str::FromStr};

use chrono::Duration;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Resolutions advertised to the charting widget.
pub const SUPPORTED_RESOLUTIONS: &[&str] = &["1", "5", "15", "30", "60", "240", "1D", "1W", "1M"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("empty resolution")]
    Empty,

    #[error("invalid resolution amount in {0:?}")]
    InvalidAmount(String),

    #[error("unknown resolution unit in {0:?}")]
    UnknownUnit(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolutionUnit {
    Minute,
    Hour,
    Day,
    Week,
    Month,
}

/// A resolution = amount × unit (e.g., 5-Minute, 4-Hour, 1-Day).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Resolution {
    amount: NonZeroU32,
    unit: ResolutionUnit,
}

impl Resolution {
    pub const fn new(amount: NonZeroU32, unit: ResolutionUnit) -> Self {
        Self { amount, unit }
    }

    pub fn minutes(amount: u32) -> Result<Self, ResolutionError> {
        let amount = NonZeroU32::new(amount)
            .ok_or_else(|| ResolutionError::InvalidAmount(amount.to_string()))?;
        Ok(Self::from_minutes(amount))
    }

    pub const fn daily() -> Self {
        Self::new(NonZeroU32::MIN, ResolutionUnit::Day)
    }

    pub const fn amount(&self) -> NonZeroU32 {
        self.amount
    }

    pub const fn unit(&self) -> ResolutionUnit {
        self.unit
    }

    pub fn is_intraday(&self) -> bool {
        matches!(self.unit, ResolutionUnit::Minute | ResolutionUnit::Hour)
    }

    /// Approximate duration covered by one bar; months count as 30 days.
    ///
    /// Saturates at [`Duration::MAX`] for amounts too large to represent.
    pub fn bar_width(&self) -> Duration {
        let n = i64::from(self.amount.get());
        let width = match self.unit {
            ResolutionUnit::Minute => Duration::try_minutes(n),
            ResolutionUnit::Hour => Duration::try_hours(n),
            ResolutionUnit::Day => Duration::try_days(n),
            ResolutionUnit::Week => Duration::try_weeks(n),
            ResolutionUnit::Month => Duration::try_days(30 * n),
        };
        width.unwrap_or(Duration::MAX)
    }

    /// Span covered by `bars` consecutive bars (daily × 5000 → 5000 days),
    /// saturating like [`bar_width`](Self::bar_width).
    pub fn lookback(&self, bars: u32) -> Duration {
        self.bar_width()
            .checked_mul(i32::try_from(bars).unwrap_or(i32::MAX))
            .unwrap_or(Duration::MAX)
    }

    /// Interval string understood by the upstream time-series API.
    pub fn interval_param(&self) -> String {
        let n = self.amount.get();
        match self.unit {
            ResolutionUnit::Minute => format!("{n}min"),
            ResolutionUnit::Hour => format!("{n}h"),
            ResolutionUnit::Day => format!("{n}day"),
            ResolutionUnit::Week => format!("{n}week"),
            ResolutionUnit::Month => format!("{n}month"),
        }
    }

    fn from_minutes(amount: NonZeroU32) -> Self {
        let minutes = amount.get();
        if minutes % 60 == 0 {
            // 60 divides a non-zero value, so the quotient is non-zero too
            let hours = NonZeroU32::new(minutes / 60).unwrap_or(NonZeroU32::MIN);
            Self::new(hours, ResolutionUnit::Hour)
        } else {
            Self::new(amount, ResolutionUnit::Minute)
        }
    }
}

/// Widget form: minutes are bare numbers, hours render as minutes (`"240"`),
/// calendar units carry a suffix (`"1D"`, `"1W"`, `"1M"`).
impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let a = self.amount.get();
        match self.unit {
            ResolutionUnit::Minute => write!(f, "{a}"),
            ResolutionUnit::Hour => write!(f, "{}", u64::from(a) * 60),
            ResolutionUnit::Day => write!(f, "{a}D"),
            ResolutionUnit::Week => write!(f, "{a}W"),
            ResolutionUnit::Month => write!(f, "{a}M"),
        }
    }
}

impl FromStr for Resolution {
    type Err = ResolutionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ResolutionError::Empty);
        }

        let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
        let (digits, suffix) = s.split_at(split);
        let amount = if digits.is_empty() {
            NonZeroU32::MIN
        } else {
            digits
                .parse::<u32>()
                .ok()
                .and_then(NonZeroU32::new)
                .ok_or_else(|| ResolutionError::InvalidAmount(s.to_string()))?
        };

        let unit = match suffix {
            "" => return Ok(Self::from_minutes(amount)),
            "D" | "d" => ResolutionUnit::Day,
            "W" | "w" => ResolutionUnit::Week,
            "M" => ResolutionUnit::Month,
            _ => return Err(ResolutionError::UnknownUnit(s.to_string())),
        };
        Ok(Self::new(amount, unit))
    }
}

impl Serialize for Resolution {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Resolution {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_widget_strings() {
        let cases = [
            ("1", ResolutionUnit::Minute, 1),
            ("15", ResolutionUnit::Minute, 15),
            ("60", ResolutionUnit::Hour, 1),
            ("240", ResolutionUnit::Hour, 4),
            ("D", ResolutionUnit::Day, 1),
            ("1D", ResolutionUnit::Day, 1),
            ("W", ResolutionUnit::Week, 1),
            ("1M", ResolutionUnit::Month, 1),
            ("3M", ResolutionUnit::Month, 3),
        ];
        for (input, unit, amount) in cases {
            let r: Resolution = input.parse().unwrap();
            assert_eq!(r.unit(), unit, "unit for {input}");
            assert_eq!(r.amount().get(), amount, "amount for {input}");
        }
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!("".parse::<Resolution>(), Err(ResolutionError::Empty));
        assert!(matches!("0".parse::<Resolution>(), Err(ResolutionError::InvalidAmount(_))));
        assert!(matches!("5X".parse::<Resolution>(), Err(ResolutionError::UnknownUnit(_))));
    }

    #[test]
    fn display_is_canonical() {
        for s in SUPPORTED_RESOLUTIONS {
            let r: Resolution = s.parse().unwrap();
            assert_eq!(&r.to_string(), s);
        }
        assert_eq!("D".parse::<Resolution>().unwrap().to_string(), "1D");
    }

    #[test]
    fn lookback_scales_with_bar_width() {
        assert_eq!(Resolution::daily().lookback(5000), Duration::days(5000));
        assert_eq!(Resolution::minutes(1).unwrap().lookback(5000), Duration::minutes(5000));
        assert_eq!(Resolution::minutes(120).unwrap().lookback(10), Duration::hours(20));
    }

    #[test]
    fn huge_amounts_saturate_instead_of_overflowing() {
        let months: Resolution = "4000000000M".parse().unwrap();
        assert_eq!(months.bar_width(), Duration::MAX);
        assert_eq!(months.lookback(5000), Duration::MAX);

        let weeks: Resolution = "5000W".parse().unwrap();
        assert_eq!(weeks.bar_width(), Duration::weeks(5000));
        assert_eq!(weeks.lookback(5000), Duration::MAX);
    }

    #[test]
    fn interval_param_matches_upstream_names() {
        assert_eq!(Resolution::minutes(5).unwrap().interval_param(), "5min");
        assert_eq!(Resolution::minutes(60).unwrap().interval_param(), "1h");
        assert_eq!(Resolution::daily().interval_param(), "1day");
        assert_eq!("1W".parse::<Resolution>().unwrap().interval_param(), "1week");
    }
}
