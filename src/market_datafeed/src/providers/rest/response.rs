use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;

use crate::{
    models::{bar::Bar, symbol::SymbolSearchResult},
    providers::{ApiSnafu, InternalSnafu, ProviderError},
};

/// Message fragment the API uses when a window simply has no rows.
const NO_DATA_MARKER: &str = "no data is available";

#[derive(Deserialize, Debug)]
pub struct RawBar {
    pub datetime: String,
    pub open: String,
    pub high: String,
    pub low: String,
    pub close: String,
    #[serde(default)]
    pub volume: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct TimeSeriesResponse {
    pub status: String,
    #[serde(default)]
    pub values: Vec<RawBar>,
    #[serde(default)]
    pub code: Option<u16>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct SearchResponse {
    pub status: String,
    #[serde(default)]
    pub data: Vec<SymbolSearchResult>,
    #[serde(default)]
    pub message: Option<String>,
}

impl TimeSeriesResponse {
    /// Converts the payload into ascending bars.
    ///
    /// An error status whose message says the window is empty is not an error:
    /// it is how the API reports "no more history".
    pub fn into_bars(self) -> Result<Vec<Bar>, ProviderError> {
        if self.status != "ok" {
            let message = self.message.unwrap_or_else(|| "Unknown API error".to_string());
            if message.to_lowercase().contains(NO_DATA_MARKER) {
                return Ok(Vec::new());
            }
            let message = match self.code {
                Some(code) => format!("{code}: {message}"),
                None => message,
            };
            return ApiSnafu { message }.fail();
        }

        let mut bars = self
            .values
            .iter()
            .map(RawBar::to_bar)
            .collect::<Result<Vec<_>, _>>()?;
        bars.sort_by_key(|b| b.time);
        Ok(bars)
    }
}

impl SearchResponse {
    pub fn into_results(self) -> Result<Vec<SymbolSearchResult>, ProviderError> {
        if self.status != "ok" {
            let message = self.message.unwrap_or_else(|| "Unknown API error".to_string());
            return ApiSnafu { message }.fail();
        }
        Ok(self.data)
    }
}

impl RawBar {
    pub fn to_bar(&self) -> Result<Bar, ProviderError> {
        Ok(Bar {
            time: parse_datetime_millis(&self.datetime)?,
            open: parse_number("open", &self.open)?,
            high: parse_number("high", &self.high)?,
            low: parse_number("low", &self.low)?,
            close: parse_number("close", &self.close)?,
            volume: match &self.volume {
                Some(v) => parse_number("volume", v)?,
                None => 0.0,
            },
        })
    }
}

fn parse_number(field: &str, raw: &str) -> Result<f64, ProviderError> {
    raw.trim().parse::<f64>().map_err(|_| {
        InternalSnafu {
            message: format!("field {field} is not a number: {raw:?}"),
        }
        .build()
    })
}

/// `YYYY-MM-DD HH:MM:SS` or `YYYY-MM-DD`, interpreted as UTC.
pub fn parse_datetime_millis(raw: &str) -> Result<i64, ProviderError> {
    let raw = raw.trim();
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        });
    match naive {
        Some(ts) => Ok(ts.and_utc().timestamp_millis()),
        None => InternalSnafu {
            message: format!("unparseable datetime {raw:?}"),
        }
        .fail(),
    }
}
