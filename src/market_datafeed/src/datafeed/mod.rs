//! The chart datafeed: the surface the charting widget calls into.
//!
//! One [`Datafeed`] belongs to one chart. It answers `getBars` paging requests from
//! an incrementally filled [`BarCache`], only going upstream for the part of the
//! requested range the cache cannot serve:
//!
//! - first request for a bucket, or `from` before the earliest cached bar: backfill a
//!   lookback window (`lookback_bars` × bar width) ending just before the earliest bar;
//! - later request with `to` after the latest cached bar: fetch the gap up to `to`.
//!
//! Fetch failures never touch the cached bucket. When the bucket already holds bars
//! the failure is logged and the cached range is served; an empty bucket returns it.

pub mod cache;

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    errors::DatafeedError,
    models::{
        bar::Bar,
        request_params::BarsRequestParams,
        resolution::{Resolution, SUPPORTED_RESOLUTIONS},
        symbol::{SymbolInfo, SymbolSearchResult, parse_full_symbol},
    },
    providers::{DataProvider, ProviderError},
};

use self::cache::{BarCache, CacheKey};

/// Bars per backfill window when the config does not say otherwise.
pub const DEFAULT_LOOKBACK_BARS: u32 = 5000;

/// Range requested by the widget for one `getBars` call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeriodParams {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub first_data_request: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryMetadata {
    pub no_data: bool,
    /// Pagination cursor in epoch milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_time: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BarsResponse {
    pub bars: Vec<Bar>,
    pub meta: HistoryMetadata,
}

impl BarsResponse {
    fn no_data() -> Self {
        Self {
            bars: Vec::new(),
            meta: HistoryMetadata {
                no_data: true,
                next_time: None,
            },
        }
    }
}

/// Static capabilities reported to the widget when it initializes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatafeedConfiguration {
    pub supported_resolutions: Vec<String>,
    pub exchanges: Vec<String>,
    pub symbols_types: Vec<String>,
    pub supports_marks: bool,
    pub supports_time: bool,
}

/// One row returned by [`Datafeed::search_symbols`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSymbolItem {
    pub symbol: String,
    pub full_name: String,
    pub description: String,
    pub exchange: String,
    pub ticker: String,
    #[serde(rename = "type")]
    pub symbol_type: String,
}

impl From<&SymbolSearchResult> for SearchSymbolItem {
    fn from(hit: &SymbolSearchResult) -> Self {
        let ticker = hit.full_symbol().to_string();
        Self {
            symbol: hit.symbol.clone(),
            full_name: ticker.clone(),
            description: hit.instrument_name.clone(),
            exchange: hit.exchange.clone(),
            ticker,
            symbol_type: hit.instrument_type.to_lowercase(),
        }
    }
}

/// A registered real-time listener. Registration only; no live feed is attached.
#[derive(Debug, Clone, PartialEq)]
pub struct Subscription {
    pub ticker: String,
    pub resolution: Resolution,
}

pub struct Datafeed {
    chart_id: String,
    provider: Arc<dyn DataProvider + Send + Sync>,
    lookback_bars: u32,
    cache: tokio::sync::Mutex<BarCache>,
    subscriptions: Mutex<IndexMap<String, Subscription>>,
}

impl Datafeed {
    pub fn new(chart_id: impl Into<String>, provider: Arc<dyn DataProvider + Send + Sync>) -> Self {
        Self::with_lookback(chart_id, provider, DEFAULT_LOOKBACK_BARS)
    }

    pub fn with_lookback(
        chart_id: impl Into<String>,
        provider: Arc<dyn DataProvider + Send + Sync>,
        lookback_bars: u32,
    ) -> Self {
        Self {
            chart_id: chart_id.into(),
            provider,
            lookback_bars: lookback_bars.max(1),
            cache: tokio::sync::Mutex::new(BarCache::new()),
            subscriptions: Mutex::new(IndexMap::new()),
        }
    }

    pub fn chart_id(&self) -> &str {
        &self.chart_id
    }

    pub fn configuration(&self) -> DatafeedConfiguration {
        DatafeedConfiguration {
            supported_resolutions: SUPPORTED_RESOLUTIONS.iter().map(|s| s.to_string()).collect(),
            exchanges: vec!["NASDAQ".into(), "NYSE".into(), "BINANCE".into()],
            symbols_types: vec!["stock".into(), "crypto".into(), "forex".into()],
            supports_marks: false,
            supports_time: true,
        }
    }

    /// Free-text search, optionally narrowed by exchange and instrument type.
    pub async fn search_symbols(
        &self,
        user_input: &str,
        exchange: Option<&str>,
        symbol_type: Option<&str>,
    ) -> Result<Vec<SearchSymbolItem>, DatafeedError> {
        let hits = self.provider.search_symbols(user_input).await?;
        Ok(hits
            .iter()
            .filter(|h| exchange.is_none_or(|ex| ex.is_empty() || h.exchange.eq_ignore_ascii_case(ex)))
            .filter(|h| {
                symbol_type.is_none_or(|t| {
                    t.is_empty() || h.instrument_type.to_lowercase().contains(&t.to_lowercase())
                })
            })
            .map(SearchSymbolItem::from)
            .collect())
    }

    /// Resolves `EXCHANGE:SYMBOL` against upstream search results.
    ///
    /// An exact `(exchange, symbol)` match wins, otherwise the first result is used;
    /// an empty search is [`DatafeedError::SymbolNotFound`].
    pub async fn resolve_symbol(&self, full_symbol: &str) -> Result<SymbolInfo, DatafeedError> {
        let parsed = parse_full_symbol(full_symbol);
        let hits = self.provider.search_symbols(&parsed.symbol).await?;

        let exact = hits
            .iter()
            .find(|h| !parsed.is_unknown() && h.exchange == parsed.exchange && h.symbol == parsed.symbol);
        let hit = exact
            .or_else(|| hits.first())
            .ok_or_else(|| DatafeedError::SymbolNotFound {
                query: full_symbol.to_string(),
            })?;

        if exact.is_none() {
            debug!(requested = full_symbol, resolved = %hit.full_symbol(), "no exact symbol match, using first result");
        }
        Ok(SymbolInfo::from(hit))
    }

    pub async fn get_bars(
        &self,
        symbol_info: &SymbolInfo,
        resolution: Resolution,
        period: PeriodParams,
    ) -> Result<BarsResponse, DatafeedError> {
        let symbol = symbol_info.full_symbol();
        let key = CacheKey::new(&self.chart_id, &symbol, &resolution);
        let from_ms = period.from.timestamp_millis();
        let to_ms = period.to.timestamp_millis();

        let mut cache = self.cache.lock().await;
        cache.normalize(&key);
        let earliest = cache.earliest(&key);
        let latest = cache.latest(&key);

        let first = period.first_data_request;
        let needs_older =
            first || (!cache.older_exhausted(&key) && earliest.is_none_or(|e| from_ms < e));
        let needs_newer = !first && latest.is_some_and(|l| to_ms > l);

        if needs_older {
            let mut end = match earliest {
                Some(e) => {
                    let e = millis_to_utc(e);
                    e.checked_sub_signed(Duration::seconds(1)).unwrap_or(e)
                }
                None => period.to,
            };
            let mut start = end
                .checked_sub_signed(resolution.lookback(self.lookback_bars))
                .unwrap_or(DateTime::<Utc>::MIN_UTC);
            if earliest.is_none() {
                start = start.max(period.from);
                end = end.min(period.to);
            }

            if start <= end {
                let fetched = self
                    .provider
                    .fetch_bars(BarsRequestParams {
                        symbol: symbol.clone(),
                        resolution,
                        start,
                        end,
                    })
                    .await;

                match serve_cached_on_error(&cache, &key, fetched)? {
                    Some(fetched) if fetched.is_empty() => {
                        if cache.bars(&key).is_empty() {
                            debug!(key = %key, "no data upstream and nothing cached");
                            return Ok(BarsResponse::no_data());
                        }
                        debug!(key = %key, "older history exhausted");
                        cache.mark_older_exhausted(&key);
                    }
                    Some(fetched) => {
                        cache.merge(&key, &fetched);
                    }
                    None => {}
                }
            }
        }

        if let (true, Some(latest)) = (needs_newer, latest) {
            let latest = millis_to_utc(latest);
            let start = latest.checked_add_signed(Duration::seconds(1)).unwrap_or(latest);
            if start <= period.to {
                let fetched = self
                    .provider
                    .fetch_bars(BarsRequestParams {
                        symbol: symbol.clone(),
                        resolution,
                        start,
                        end: period.to,
                    })
                    .await;
                match serve_cached_on_error(&cache, &key, fetched)? {
                    Some(fetched) if fetched.is_empty() => {
                        debug!(key = %key, "no newer bars upstream");
                    }
                    Some(fetched) => {
                        cache.merge(&key, &fetched);
                    }
                    None => {}
                }
            }
        }

        let bars = cache.slice(&key, from_ms, to_ms);
        let next_time = if cache.older_exhausted(&key) {
            cache.latest(&key)
        } else {
            cache.earliest(&key)
        };
        debug!(key = %key, served = bars.len(), cached = cache.bars(&key).len(), "getBars");

        Ok(BarsResponse {
            meta: HistoryMetadata {
                no_data: bars.is_empty(),
                next_time,
            },
            bars,
        })
    }

    pub fn subscribe_bars(&self, symbol_info: &SymbolInfo, resolution: Resolution, listener_guid: &str) {
        let mut subs = self.subscriptions.lock().unwrap_or_else(PoisonError::into_inner);
        subs.insert(
            listener_guid.to_string(),
            Subscription {
                ticker: symbol_info.ticker.clone(),
                resolution,
            },
        );
        info!(listener_guid, ticker = %symbol_info.ticker, %resolution, "subscribed to bars");
    }

    pub fn unsubscribe_bars(&self, listener_guid: &str) -> Option<Subscription> {
        let mut subs = self.subscriptions.lock().unwrap_or_else(PoisonError::into_inner);
        let removed = subs.shift_remove(listener_guid);
        if removed.is_some() {
            info!(listener_guid, "unsubscribed from bars");
        }
        removed
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Cached bars for a bucket, mostly for inspection and tests.
    pub async fn cached_bars(&self, symbol_info: &SymbolInfo, resolution: Resolution) -> Vec<Bar> {
        let key = CacheKey::new(&self.chart_id, &symbol_info.full_symbol(), &resolution);
        self.cache.lock().await.bars(&key).to_vec()
    }

    /// Drops every cached bucket and subscription; called when the chart goes away.
    pub async fn teardown(&self) {
        self.cache.lock().await.clear();
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        debug!(chart_id = %self.chart_id, "datafeed torn down");
    }
}

/// A failed fetch is fatal only when there is nothing cached to fall back on.
/// `Ok(None)` means the fetch failed and the cached bars are served as they are.
fn serve_cached_on_error(
    cache: &BarCache,
    key: &CacheKey,
    fetched: Result<Vec<Bar>, ProviderError>,
) -> Result<Option<Vec<Bar>>, DatafeedError> {
    match fetched {
        Ok(bars) => Ok(Some(bars)),
        Err(e) if !cache.bars(key).is_empty() => {
            warn!(key = %key, error = %e, "bar fetch failed, serving cached bars");
            Ok(None)
        }
        Err(e) => {
            warn!(key = %key, error = %e, "bar fetch failed with nothing cached");
            Err(e.into())
        }
    }
}

fn millis_to_utc(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or(DateTime::<Utc>::MIN_UTC)
}
