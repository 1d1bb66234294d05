use thiserror::Error;

use crate::{models::resolution::ResolutionError, providers::ProviderError};

/// The unified error type for the chart datafeed surface.
#[derive(Debug, Error)]
pub enum DatafeedError {
    /// The upstream provider failed; the cache is left untouched.
    #[error("bar fetch failed: {0}")]
    Fetch(#[from] ProviderError),

    /// Symbol search returned nothing for the requested symbol.
    #[error("symbol not found: {query}")]
    SymbolNotFound { query: String },

    /// The widget asked for a resolution we cannot express.
    #[error("unsupported resolution: {0}")]
    UnknownResolution(#[from] ResolutionError),
}
