//! Folds stream events into the drafts a turn commits at the end.
//!
//! - `llm_response` appends to the system message text (the only chat mutation);
//! - `plot_indicator` adds indicators not yet seen by `(name, value)`;
//! - `plot_chart_pattern` appends every pattern, repeats included;
//! - both plot events overwrite chart metadata fields they carry;
//! - `screen_stock` replaces the screener draft wholesale.

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::debug;

use crate::{
    events::{ChartMeta, Indicator, StreamEvent},
    resources::models::Screener,
};

/// Partial chart accumulated over one turn.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChartPatch {
    pub indicators: Vec<Indicator>,
    pub chart_pattern: Vec<Value>,
    pub symbol: Option<String>,
    pub timeframe: Option<String>,
    pub exchange: Option<String>,
    pub description: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
}

impl ChartPatch {
    /// A chart is only written when the turn plotted something.
    pub fn has_plots(&self) -> bool {
        !self.indicators.is_empty() || !self.chart_pattern.is_empty()
    }

    fn add_indicator(&mut self, indicator: Indicator) {
        if !self.indicators.iter().any(|i| i.same_identity(&indicator)) {
            self.indicators.push(indicator);
        }
    }

    fn merge_meta(&mut self, meta: ChartMeta) {
        let ChartMeta {
            ticker,
            interval,
            exchange,
            description,
            from_date,
            to_date,
        } = meta;
        overwrite(&mut self.symbol, ticker);
        overwrite(&mut self.timeframe, interval);
        overwrite(&mut self.exchange, exchange);
        overwrite(&mut self.description, description);
        overwrite(&mut self.date_from, from_date);
        overwrite(&mut self.date_to, to_date);
    }
}

fn overwrite(slot: &mut Option<String>, value: Option<String>) {
    if value.is_some() {
        *slot = value;
    }
}

/// Everything one turn has produced so far.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnDraft {
    user_message: String,
    content: String,
    chart: ChartPatch,
    screener: Option<Screener>,
    events: usize,
}

impl TurnDraft {
    pub fn new(user_message: impl Into<String>) -> Self {
        Self {
            user_message: user_message.into(),
            content: String::new(),
            chart: ChartPatch::default(),
            screener: None,
            events: 0,
        }
    }

    pub fn user_message(&self) -> &str {
        &self.user_message
    }

    /// Cumulative assistant text.
    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn chart(&self) -> &ChartPatch {
        &self.chart
    }

    pub fn screener(&self) -> Option<&Screener> {
        self.screener.as_ref()
    }

    pub fn events(&self) -> usize {
        self.events
    }

    /// Applies one event. Returns `true` when the chat text changed.
    pub fn apply(&mut self, event: StreamEvent) -> bool {
        self.apply_at(event, Utc::now())
    }

    pub fn apply_at(&mut self, event: StreamEvent, now: DateTime<Utc>) -> bool {
        self.events += 1;
        debug!(action_type = event.action_type(), "applying stream event");
        match event {
            StreamEvent::LlmResponse { message } => {
                self.content.push_str(&message);
                true
            }
            StreamEvent::PlotIndicator { indicators, meta } => {
                for indicator in indicators {
                    self.chart.add_indicator(indicator);
                }
                self.chart.merge_meta(meta);
                false
            }
            StreamEvent::PlotChartPattern { patterns, meta } => {
                self.chart.chart_pattern.extend(patterns);
                self.chart.merge_meta(meta);
                false
            }
            StreamEvent::ScreenStock { records } => {
                self.screener = Some(Screener {
                    id: String::new(),
                    query: self.user_message.clone(),
                    records,
                    created_at: now,
                    updated_at: now,
                });
                false
            }
        }
    }
}
