//! Process-local [`ResourceStore`] for offline runs and tests.
//!
//! Every call is recorded in order, and individual operations can be made to fail
//! so commit paths can be exercised without a backend.

use std::{
    collections::HashSet,
    sync::{Mutex, PoisonError},
};

use async_trait::async_trait;
use indexmap::IndexMap;
use uuid::Uuid;

use crate::resources::{
    ResourceError, ResourceStore,
    models::{Chart, Chat, ChatMessage, Screener},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    GetChat,
    AppendMessages,
    DeleteChat,
    GetChart,
    CreateChart,
    UpdateChart,
    DeleteChart,
    GetScreener,
    CreateScreener,
    DeleteScreener,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreCall {
    pub op: StoreOp,
    pub id: String,
}

#[derive(Debug, Default)]
struct Tables {
    chats: IndexMap<String, Chat>,
    charts: IndexMap<String, Chart>,
    screeners: IndexMap<String, Screener>,
    calls: Vec<StoreCall>,
    failing: HashSet<StoreOp>,
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later call of `op` fail with a 503.
    pub fn fail_on(&self, op: StoreOp) {
        self.lock().failing.insert(op);
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.lock().calls.clone()
    }

    /// Recorded calls of one kind, in order.
    pub fn calls_of(&self, op: StoreOp) -> Vec<StoreCall> {
        self.lock().calls.iter().filter(|c| c.op == op).cloned().collect()
    }

    pub fn insert_chart(&self, chart: Chart) {
        self.lock().charts.insert(chart.id.clone(), chart);
    }

    pub fn insert_chat(&self, chat: Chat) {
        self.lock().chats.insert(chat.id.clone(), chat);
    }

    pub fn screeners(&self) -> Vec<Screener> {
        self.lock().screeners.values().cloned().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records the call and returns the guard, or the injected failure.
    fn enter(&self, op: StoreOp, id: &str) -> Result<std::sync::MutexGuard<'_, Tables>, ResourceError> {
        let mut tables = self.lock();
        tables.calls.push(StoreCall {
            op,
            id: id.to_string(),
        });
        if tables.failing.contains(&op) {
            return Err(ResourceError::Status {
                status: 503,
                url: format!("memory://{op:?}/{id}"),
                body: "injected failure".into(),
            });
        }
        Ok(tables)
    }
}

#[async_trait]
impl ResourceStore for InMemoryStore {
    async fn get_chat(&self, chat_id: &str) -> Result<Option<Chat>, ResourceError> {
        Ok(self.enter(StoreOp::GetChat, chat_id)?.chats.get(chat_id).cloned())
    }

    async fn append_messages(&self, chat_id: &str, messages: &[ChatMessage]) -> Result<(), ResourceError> {
        let mut tables = self.enter(StoreOp::AppendMessages, chat_id)?;
        tables
            .chats
            .entry(chat_id.to_string())
            .or_insert_with(|| Chat {
                id: chat_id.to_string(),
                messages: Vec::new(),
            })
            .messages
            .extend_from_slice(messages);
        Ok(())
    }

    async fn delete_chat(&self, chat_id: &str) -> Result<(), ResourceError> {
        let mut tables = self.enter(StoreOp::DeleteChat, chat_id)?;
        tables
            .chats
            .shift_remove(chat_id)
            .map(|_| ())
            .ok_or_else(|| ResourceError::NotFound {
                kind: "chat",
                id: chat_id.to_string(),
            })
    }

    async fn get_chart(&self, chart_id: &str) -> Result<Option<Chart>, ResourceError> {
        Ok(self.enter(StoreOp::GetChart, chart_id)?.charts.get(chart_id).cloned())
    }

    async fn create_chart(&self, chart: &Chart) -> Result<Chart, ResourceError> {
        let mut tables = self.enter(StoreOp::CreateChart, &chart.id)?;
        if tables.charts.contains_key(&chart.id) {
            return Err(ResourceError::Conflict {
                kind: "chart",
                id: chart.id.clone(),
            });
        }
        tables.charts.insert(chart.id.clone(), chart.clone());
        Ok(chart.clone())
    }

    async fn update_chart(&self, chart_id: &str, chart: &Chart) -> Result<Chart, ResourceError> {
        let mut tables = self.enter(StoreOp::UpdateChart, chart_id)?;
        let slot = tables
            .charts
            .get_mut(chart_id)
            .ok_or_else(|| ResourceError::NotFound {
                kind: "chart",
                id: chart_id.to_string(),
            })?;
        *slot = Chart {
            id: chart_id.to_string(),
            ..chart.clone()
        };
        Ok(slot.clone())
    }

    async fn delete_chart(&self, chart_id: &str) -> Result<(), ResourceError> {
        let mut tables = self.enter(StoreOp::DeleteChart, chart_id)?;
        tables
            .charts
            .shift_remove(chart_id)
            .map(|_| ())
            .ok_or_else(|| ResourceError::NotFound {
                kind: "chart",
                id: chart_id.to_string(),
            })
    }

    async fn get_screener(&self, screener_id: &str) -> Result<Option<Screener>, ResourceError> {
        Ok(self
            .enter(StoreOp::GetScreener, screener_id)?
            .screeners
            .get(screener_id)
            .cloned())
    }

    async fn create_screener(&self, screener: &Screener) -> Result<Screener, ResourceError> {
        let id = Uuid::new_v4().to_string();
        let mut tables = self.enter(StoreOp::CreateScreener, &id)?;
        let created = Screener {
            id: id.clone(),
            ..screener.clone()
        };
        tables.screeners.insert(id, created.clone());
        Ok(created)
    }

    async fn delete_screener(&self, screener_id: &str) -> Result<(), ResourceError> {
        let mut tables = self.enter(StoreOp::DeleteScreener, screener_id)?;
        tables
            .screeners
            .shift_remove(screener_id)
            .map(|_| ())
            .ok_or_else(|| ResourceError::NotFound {
                kind: "screener",
                id: screener_id.to_string(),
            })
    }
}
