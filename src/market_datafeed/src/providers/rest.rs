//! HTTP provider for a time-series/search market-data API.
//!
//! - `GET {base}/symbol_search?symbol=...`
//! - `GET {base}/time_series?symbol=...&exchange=...&interval=...&start_date=...&end_date=...`
//!
//! Numeric fields arrive as strings and timestamps as `YYYY-MM-DD[ HH:MM:SS]` in UTC;
//! see [`response`] for the decoding rules.

pub mod params;
pub mod provider;
pub mod response;

pub use provider::RestProvider;
