use std::num::NonZeroU32;

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use nonzero_ext::nonzero;
use reqwest::{Client, header};
use secrecy::{ExposeSecret, SecretString};
use shared_utils::{config::MarketDataConfig, env::get_env_var};
use snafu::ResultExt;
use tracing::debug;

use crate::{
    models::{bar::Bar, request_params::BarsRequestParams, symbol::SymbolSearchResult},
    providers::{
        ApiSnafu, ClientBuildSnafu, DataProvider, InvalidApiKeySnafu,
        MissingEnvVarSnafu, ProviderError, ProviderInitError, ReqwestSnafu,
        rest::{
            params::{construct_bars_query, construct_search_query, validate_window},
            response::{SearchResponse, TimeSeriesResponse},
        },
    },
};

const DEFAULT_RATE: NonZeroU32 = nonzero!(8u32);

pub struct RestProvider {
    client: Client,
    base_url: String,
    limiter: DefaultDirectRateLimiter,
    _api_key: SecretString,
}

impl RestProvider {
    /// Creates a provider from the `[market_data]` config section.
    ///
    /// Reads the API key from the environment variable named by `api_key_env`.
    pub fn from_config(cfg: &MarketDataConfig) -> Result<Self, ProviderInitError> {
        let api_key = SecretString::from(get_env_var(&cfg.api_key_env).context(MissingEnvVarSnafu)?);
        let rate = NonZeroU32::new(cfg.requests_per_second).unwrap_or(DEFAULT_RATE);
        Self::new(&cfg.base_url, api_key, rate)
    }

    pub fn new(
        base_url: &str,
        api_key: SecretString,
        requests_per_second: NonZeroU32,
    ) -> Result<Self, ProviderInitError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            header::HeaderValue::from_str(&format!("apikey {}", api_key.expose_secret()))
                .context(InvalidApiKeySnafu)?,
        );

        let client = Client::builder()
            .default_headers(headers)
            .build()
            .context(ClientBuildSnafu)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            limiter: RateLimiter::direct(Quota::per_second(requests_per_second)),
            _api_key: api_key,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<T, ProviderError> {
        self.limiter.until_ready().await;

        let url = format!("{}/{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .context(ReqwestSnafu)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown API error".to_string());
            return ApiSnafu {
                message: format!("{status}: {body}"),
            }
            .fail();
        }

        response.json::<T>().await.context(ReqwestSnafu)
    }
}

impl std::fmt::Debug for RestProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestProvider")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl DataProvider for RestProvider {
    async fn search_symbols(&self, query: &str) -> Result<Vec<SymbolSearchResult>, ProviderError> {
        let response: SearchResponse = self
            .get_json("symbol_search", &construct_search_query(query))
            .await?;
        response.into_results()
    }

    async fn fetch_bars(&self, params: BarsRequestParams) -> Result<Vec<Bar>, ProviderError> {
        validate_window(&params)?;

        debug!(
            symbol = %params.symbol,
            resolution = %params.resolution,
            start = %params.start,
            end = %params.end,
            "fetching bars"
        );
        let response: TimeSeriesResponse = self
            .get_json("time_series", &construct_bars_query(&params))
            .await?;
        response.into_bars()
    }
}
