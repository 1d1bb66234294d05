//! Symbol identifiers and the metadata the charting widget needs per symbol.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::resolution::SUPPORTED_RESOLUTIONS;

/// Exchange placeholder returned when a compound symbol has no `EXCHANGE:` prefix.
pub const UNKNOWN_EXCHANGE: &str = "UNKNOWN";

/// An `EXCHANGE:SYMBOL` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FullSymbol {
    pub exchange: String,
    pub symbol: String,
}

impl FullSymbol {
    pub fn new(exchange: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            exchange: exchange.into(),
            symbol: symbol.into(),
        }
    }

    /// `true` for the sentinel produced by [`parse_full_symbol`] on malformed input.
    pub fn is_unknown(&self) -> bool {
        self.exchange == UNKNOWN_EXCHANGE
    }
}

impl fmt::Display for FullSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.exchange, self.symbol)
    }
}

/// Split `EXCHANGE:SYMBOL` on the first colon.
///
/// Never fails: input without a colon, or with an empty side, yields the sentinel
/// `{ exchange: "UNKNOWN", symbol: <input> }` and callers check [`FullSymbol::is_unknown`].
pub fn parse_full_symbol(full: &str) -> FullSymbol {
    match full.split_once(':') {
        Some((exchange, symbol)) if !exchange.is_empty() && !symbol.is_empty() => {
            FullSymbol::new(exchange, symbol)
        }
        _ => FullSymbol::new(UNKNOWN_EXCHANGE, full),
    }
}

/// One row of an upstream symbol search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolSearchResult {
    pub symbol: String,
    pub instrument_name: String,
    pub exchange: String,
    pub instrument_type: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub currency: String,
}

impl SymbolSearchResult {
    pub fn full_symbol(&self) -> FullSymbol {
        FullSymbol::new(&self.exchange, &self.symbol)
    }
}

/// Resolved symbol metadata handed to the charting widget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolInfo {
    pub name: String,
    /// `EXCHANGE:SYMBOL`, the key the widget echoes back on `getBars`.
    pub ticker: String,
    pub description: String,
    #[serde(rename = "type")]
    pub symbol_type: String,
    pub exchange: String,
    pub listed_exchange: String,
    pub session: String,
    pub timezone: String,
    pub minmov: u32,
    pub pricescale: u32,
    pub has_intraday: bool,
    pub supported_resolutions: Vec<String>,
    pub currency_code: String,
}

impl SymbolInfo {
    pub fn full_symbol(&self) -> FullSymbol {
        FullSymbol::new(&self.exchange, &self.name)
    }
}

impl From<&SymbolSearchResult> for SymbolInfo {
    fn from(hit: &SymbolSearchResult) -> Self {
        Self {
            name: hit.symbol.clone(),
            ticker: hit.full_symbol().to_string(),
            description: hit.instrument_name.clone(),
            symbol_type: hit.instrument_type.to_lowercase(),
            exchange: hit.exchange.clone(),
            listed_exchange: hit.exchange.clone(),
            session: "24x7".to_string(),
            timezone: "Etc/UTC".to_string(),
            minmov: 1,
            pricescale: 100,
            has_intraday: true,
            supported_resolutions: SUPPORTED_RESOLUTIONS.iter().map(|s| s.to_string()).collect(),
            currency_code: hit.currency.clone(),
        }
    }
}
