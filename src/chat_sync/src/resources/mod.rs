//! The resource layer the chat pipeline reads from and commits to.
//!
//! [`ResourceStore`] is the seam: [`RestResourceClient`](rest::RestResourceClient)
//! talks to the dashboard backend, [`InMemoryStore`](memory::InMemoryStore) keeps
//! everything in process for offline runs and tests.

pub mod memory;
pub mod models;
pub mod rest;

use async_trait::async_trait;
use thiserror::Error;

use self::models::{Chart, Chat, ChatMessage, Screener};

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("resource request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{url} returned {status}: {body}")]
    Status { status: u16, url: String, body: String },

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    #[error("{kind} {id} already exists")]
    Conflict { kind: &'static str, id: String },
}

/// Get/create/update/delete over chats, charts and screeners.
///
/// Gets return `Ok(None)` for a missing resource; every other miss is an error.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    async fn get_chat(&self, chat_id: &str) -> Result<Option<Chat>, ResourceError>;

    /// Appends to the chat's durable message log, creating the chat if needed.
    async fn append_messages(&self, chat_id: &str, messages: &[ChatMessage]) -> Result<(), ResourceError>;

    async fn delete_chat(&self, chat_id: &str) -> Result<(), ResourceError>;

    async fn get_chart(&self, chart_id: &str) -> Result<Option<Chart>, ResourceError>;

    /// Creates a chart under `chart.id`.
    async fn create_chart(&self, chart: &Chart) -> Result<Chart, ResourceError>;

    async fn update_chart(&self, chart_id: &str, chart: &Chart) -> Result<Chart, ResourceError>;

    async fn delete_chart(&self, chart_id: &str) -> Result<(), ResourceError>;

    async fn get_screener(&self, screener_id: &str) -> Result<Option<Screener>, ResourceError>;

    /// Creates a screener; the returned record carries the assigned id.
    async fn create_screener(&self, screener: &Screener) -> Result<Screener, ResourceError>;

    async fn delete_screener(&self, screener_id: &str) -> Result<(), ResourceError>;
}
