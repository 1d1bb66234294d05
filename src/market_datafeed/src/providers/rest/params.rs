use chrono::{DateTime, Utc};
use snafu::ensure;

use crate::{
    models::request_params::BarsRequestParams,
    providers::{ProviderError, ValidationSnafu},
};

/// Upper bound the API accepts for `outputsize`.
pub const MAX_OUTPUT_SIZE: u32 = 5000;

const DATETIME_PARAM_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn format_datetime(ts: DateTime<Utc>) -> String {
    ts.format(DATETIME_PARAM_FORMAT).to_string()
}

/// Rejects windows the API would answer with a confusing error.
pub fn validate_window(params: &BarsRequestParams) -> Result<(), ProviderError> {
    ensure!(
        !params.is_empty_window(),
        ValidationSnafu {
            message: format!(
                "window start {} is after end {}",
                params.start, params.end
            ),
        }
    );
    ensure!(
        !params.symbol.symbol.trim().is_empty(),
        ValidationSnafu {
            message: "symbol must not be empty".to_string(),
        }
    );
    Ok(())
}

/// Query string for a `time_series` request.
///
/// The exchange is only sent when known; the `UNKNOWN` sentinel would make the
/// API reject an otherwise valid ticker.
pub fn construct_bars_query(params: &BarsRequestParams) -> Vec<(String, String)> {
    let mut query = vec![
        ("symbol".to_string(), params.symbol.symbol.clone()),
        ("interval".to_string(), params.resolution.interval_param()),
        ("start_date".to_string(), format_datetime(params.start)),
        ("end_date".to_string(), format_datetime(params.end)),
        ("timezone".to_string(), "UTC".to_string()),
        ("order".to_string(), "ASC".to_string()),
        ("outputsize".to_string(), MAX_OUTPUT_SIZE.to_string()),
    ];
    if !params.symbol.is_unknown() {
        query.push(("exchange".to_string(), params.symbol.exchange.clone()));
    }
    query
}

pub fn construct_search_query(query: &str) -> Vec<(String, String)> {
    vec![
        ("symbol".to_string(), query.trim().to_string()),
        ("outputsize".to_string(), "30".to_string()),
    ]
}
