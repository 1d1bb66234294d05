//! Market data for the chart panel: bar and symbol models, the upstream provider
//! seam, and the caching [`Datafeed`](datafeed::Datafeed) the charting widget pages through.

pub mod datafeed;
pub mod errors;
pub mod models;
pub mod providers;

pub use datafeed::{BarsResponse, Datafeed, HistoryMetadata, PeriodParams};
pub use errors::DatafeedError;
