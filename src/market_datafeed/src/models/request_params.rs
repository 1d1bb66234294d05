use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{resolution::Resolution, symbol::FullSymbol};

/// Vendor-agnostic parameters for one time-series window request.
///
/// The standard input of every [`DataProvider`](crate::providers::DataProvider)
/// implementation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BarsRequestParams {
    /// Exchange-qualified symbol to request.
    pub symbol: FullSymbol,

    /// Bar granularity.
    pub resolution: Resolution,

    /// Start of the requested window (inclusive, UTC).
    pub start: DateTime<Utc>,

    /// End of the requested window (inclusive, UTC).
    pub end: DateTime<Utc>,
}

impl BarsRequestParams {
    pub fn is_empty_window(&self) -> bool {
        self.start > self.end
    }
}
