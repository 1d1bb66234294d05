//! Provider abstraction for upstream market-data sources.
//!
//! This module defines the [`DataProvider`] trait, the single seam between the
//! chart [`Datafeed`](crate::datafeed::Datafeed) and whatever HTTP API supplies
//! symbol metadata and OHLCV rows.
//!
//! The trait is designed for async usage and supports dynamic dispatch
//! (`Arc<dyn DataProvider + Send + Sync>`) so tests can swap in scripted providers.
//!
//! # Example
//!
//! ```rust
//! use async_trait::async_trait;
//! use market_datafeed::models::{
//!     bar::Bar, request_params::BarsRequestParams, symbol::SymbolSearchResult,
//! };
//! use market_datafeed::providers::{DataProvider, ProviderError};
//!
//! struct EmptyProvider;
//!
//! #[async_trait]
//! impl DataProvider for EmptyProvider {
//!     async fn search_symbols(&self, _query: &str) -> Result<Vec<SymbolSearchResult>, ProviderError> {
//!         Ok(vec![])
//!     }
//!
//!     async fn fetch_bars(&self, _params: BarsRequestParams) -> Result<Vec<Bar>, ProviderError> {
//!         Ok(vec![])
//!     }
//! }
//! ```

pub mod rest;

use async_trait::async_trait;
use shared_utils::env::MissingEnvVarError;
use snafu::{Backtrace, IntoError, Snafu};

use crate::models::{bar::Bar, request_params::BarsRequestParams, symbol::SymbolSearchResult};

/// Trait for fetching symbol metadata and time-series bars from a market-data provider.
#[async_trait]
pub trait DataProvider {
    /// Free-text symbol search; results are in provider relevance order.
    async fn search_symbols(&self, query: &str) -> Result<Vec<SymbolSearchResult>, ProviderError>;

    /// Fetches bars for one window.
    ///
    /// # Returns
    ///
    /// * `Ok(Vec<Bar>)` - Bars inside the window, ascending by time. Empty when the
    ///   provider has no data for the window.
    /// * `Err(ProviderError)` - If the request fails.
    async fn fetch_bars(&self, params: BarsRequestParams) -> Result<Vec<Bar>, ProviderError>;
}

/// Errors that can occur during the creation of a provider instance
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ProviderInitError {
    /// missed environment variable.
    #[snafu(display("Missing environment variable: {source}"))]
    MissingEnvVar {
        source: MissingEnvVarError,
        backtrace: Backtrace,
    },

    /// failed to init reqwest client
    #[snafu(display("Failed to build HTTP client: {source}"))]
    ClientBuild {
        source: reqwest::Error,
        backtrace: Backtrace,
    },

    /// API key contains invalid characters.
    #[snafu(display("Invalid API key format: {source}"))]
    InvalidApiKey {
        source: reqwest::header::InvalidHeaderValue,
        backtrace: Backtrace,
    },
}

/// Errors that can occur within a `DataProvider` implementation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ProviderError {
    /// An error during an API request (e.g., network failure, timeout).
    #[snafu(display("API request failed: {source}"))]
    Reqwest {
        source: reqwest::Error,
        backtrace: Backtrace,
    },

    /// The provider's API returned a specific error message (e.g., invalid API key).
    #[snafu(display("API error: {message}"))]
    Api {
        message: String,
        backtrace: Backtrace,
    },

    /// The request parameters were invalid for this specific provider.
    #[snafu(display("Invalid parameters for provider: {message}"))]
    Validation {
        message: String,
        backtrace: Backtrace,
    },

    /// The provider answered but the payload could not be turned into bars.
    #[snafu(display("Internal provider error: {message}"))]
    Internal {
        message: String,
        backtrace: Backtrace,
    },

    /// An error during provider configuration or initialization.
    #[snafu(display("Provider initialization error: {source}"))]
    Init {
        #[snafu(backtrace)]
        source: ProviderInitError,
    },
}

impl From<ProviderInitError> for ProviderError {
    fn from(source: ProviderInitError) -> Self {
        InitSnafu.into_error(source)
    }
}
