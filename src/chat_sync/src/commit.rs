//! Persists a completed turn.
//!
//! Three independent steps, each attempted regardless of how the others went:
//! the chat messages, the chart (only when something was plotted) and the screener
//! (only when a screen ran). A failed step is logged and reported, never retried,
//! and never rolls back a step that already succeeded.

use serde::Serialize;
use tracing::{error, info};

use crate::{
    accumulator::{ChartPatch, TurnDraft},
    notifier::{Notification, Notifier},
    resources::{
        ResourceStore,
        models::{Chart, ChatMessage},
    },
};

pub const DEFAULT_CHART_TYPE: &str = "line";
pub const DEFAULT_TIMEFRAME: &str = "daily";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum StepOutcome {
    /// Nothing to write for this step.
    Skipped,
    Created { id: String },
    Updated { id: String },
    Appended,
    Failed(String),
}

impl StepOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitReport {
    pub chat: StepOutcome,
    pub chart: StepOutcome,
    pub screener: StepOutcome,
}

/// Fills the scalar fields a turn did not mention with the chart defaults.
pub fn build_chart(chart_id: &str, patch: &ChartPatch) -> Chart {
    let or_empty = |v: &Option<String>| v.clone().unwrap_or_default();
    Chart {
        id: chart_id.to_string(),
        chart_type: DEFAULT_CHART_TYPE.to_string(),
        title: String::new(),
        symbol: or_empty(&patch.symbol),
        timeframe: patch
            .timeframe
            .clone()
            .unwrap_or_else(|| DEFAULT_TIMEFRAME.to_string()),
        exchange: or_empty(&patch.exchange),
        description: or_empty(&patch.description),
        date_from: or_empty(&patch.date_from),
        date_to: or_empty(&patch.date_to),
        indicators: patch.indicators.clone(),
        chart_pattern: patch.chart_pattern.clone(),
        data: Vec::new(),
    }
}

pub struct CommitCoordinator<'a> {
    store: &'a dyn ResourceStore,
    notifier: &'a Notifier,
}

impl<'a> CommitCoordinator<'a> {
    pub fn new(store: &'a dyn ResourceStore, notifier: &'a Notifier) -> Self {
        Self { store, notifier }
    }

    /// Writes the turn. `chart_existed` is the answer captured at turn start and
    /// picks update over create for the chart.
    pub async fn commit(
        &self,
        chat_id: &str,
        user_message: &ChatMessage,
        system_message: &ChatMessage,
        draft: &TurnDraft,
        chart_existed: bool,
    ) -> CommitReport {
        let chat = self.persist_chat(chat_id, user_message, system_message).await;
        let chart = self.write_chart(chat_id, draft.chart(), chart_existed).await;
        let screener = self.write_screener(chat_id, draft).await;
        CommitReport {
            chat,
            chart,
            screener,
        }
    }

    async fn persist_chat(
        &self,
        chat_id: &str,
        user_message: &ChatMessage,
        system_message: &ChatMessage,
    ) -> StepOutcome {
        let messages = [user_message.clone(), system_message.clone()];
        match self.store.append_messages(chat_id, &messages).await {
            Ok(()) => StepOutcome::Appended,
            Err(e) => {
                error!(chat_id, error = %e, "failed to persist chat messages");
                StepOutcome::Failed(e.to_string())
            }
        }
    }

    async fn write_chart(&self, chat_id: &str, patch: &ChartPatch, chart_existed: bool) -> StepOutcome {
        if !patch.has_plots() {
            return StepOutcome::Skipped;
        }
        let chart = build_chart(chat_id, patch);

        if chart_existed {
            return match self.store.update_chart(chat_id, &chart).await {
                Ok(updated) => {
                    info!(chat_id, chart_id = %updated.id, "chart updated");
                    StepOutcome::Updated { id: updated.id }
                }
                Err(e) => {
                    error!(chat_id, error = %e, "failed to update chart");
                    StepOutcome::Failed(e.to_string())
                }
            };
        }

        match self.store.create_chart(&chart).await {
            Ok(created) => {
                info!(chat_id, chart_id = %created.id, "chart created");
                self.notifier.publish(Notification::NewChart {
                    chart_id: created.id.clone(),
                });
                StepOutcome::Created { id: created.id }
            }
            Err(e) => {
                error!(chat_id, error = %e, "failed to create chart");
                StepOutcome::Failed(e.to_string())
            }
        }
    }

    async fn write_screener(&self, chat_id: &str, draft: &TurnDraft) -> StepOutcome {
        let Some(screener) = draft.screener() else {
            return StepOutcome::Skipped;
        };
        match self.store.create_screener(screener).await {
            Ok(created) => {
                info!(chat_id, screener_id = %created.id, records = created.records.len(), "screener created");
                self.notifier.publish(Notification::NewScreener {
                    screener_id: created.id.clone(),
                });
                StepOutcome::Created { id: created.id }
            }
            Err(e) => {
                error!(chat_id, error = %e, "failed to create screener");
                StepOutcome::Failed(e.to_string())
            }
        }
    }
}
