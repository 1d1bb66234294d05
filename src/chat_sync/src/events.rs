//! Typed application events carried by the chat stream.
//!
//! Every SSE frame holds one JSON object discriminated by `action_type`. Unknown tags
//! fail to deserialize and are dropped by the decoder, never matched on.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action_type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// A slice of assistant text; appended to the running system message.
    LlmResponse {
        #[serde(default)]
        message: String,
    },

    PlotIndicator {
        #[serde(default)]
        indicators: Vec<Indicator>,
        #[serde(flatten)]
        meta: ChartMeta,
    },

    PlotChartPattern {
        #[serde(default, alias = "chart_pattern")]
        patterns: Vec<Value>,
        #[serde(flatten)]
        meta: ChartMeta,
    },

    /// A screener result set; replaces any earlier one in the same turn.
    ScreenStock {
        #[serde(default)]
        records: Vec<Value>,
    },
}

impl StreamEvent {
    pub fn action_type(&self) -> &'static str {
        match self {
            Self::LlmResponse { .. } => "llm_response",
            Self::PlotIndicator { .. } => "plot_indicator",
            Self::PlotChartPattern { .. } => "plot_chart_pattern",
            Self::ScreenStock { .. } => "screen_stock",
        }
    }
}

/// One indicator descriptor. Identity is the `(name, value)` pair; any other fields
/// the assistant sends (colors, periods, panes) ride along in `params`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Indicator {
    pub name: String,
    #[serde(default)]
    pub value: Value,
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

impl Indicator {
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            params: Map::new(),
        }
    }

    pub fn same_identity(&self, other: &Indicator) -> bool {
        self.name == other.name && self.value == other.value
    }
}

/// Chart metadata that may accompany indicator and pattern events, using the
/// assistant's field names.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticker: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exchange: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_date: Option<String>,
}
