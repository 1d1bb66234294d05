//! One entry point per user action: submit a message, cancel a turn.
//!
//! A turn shows the optimistic patch first, then reads whether the chat already has a
//! chart, streams the response through the [`StreamController`], and commits only
//! when the stream completed. Every other outcome rolls the chat back to its prior
//! state and publishes [`Notification::TurnFailed`] (except an explicit cancel).
//!
//! Only one turn may stream per chat; a second submission is rejected.

use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use chrono::Utc;
use indexmap::IndexMap;
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    accumulator::TurnDraft,
    chat_state::{ChatCache, OptimisticPatch},
    commit::{CommitCoordinator, CommitReport},
    controller::{DEFAULT_INACTIVITY_TIMEOUT, StreamController, StreamError},
    notifier::{Notification, Notifier},
    resources::{ResourceError, ResourceStore, models::ChatMessage},
    transport::{ChatRequest, ChatTransport},
};

/// Toast text shown for any turn-fatal failure.
pub const TURN_FAILED_MESSAGE: &str = "Failed to process your question";

#[derive(Debug, Error)]
pub enum TurnError {
    #[error("message is empty")]
    EmptyMessage,

    #[error("no chat is bound to this turn")]
    MissingChatId,

    #[error("a turn is already streaming for chat {chat_id}")]
    TurnInProgress { chat_id: String },

    #[error("Failed to process your question")]
    Stream(#[source] StreamError),

    #[error("Failed to process your question")]
    Resource(#[source] ResourceError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TurnReport {
    pub chat_id: String,
    pub content: String,
    pub events: usize,
    pub chart_existed: bool,
    pub commit: CommitReport,
}

pub struct ChatService {
    store: Arc<dyn ResourceStore>,
    transport: Arc<dyn ChatTransport>,
    notifier: Notifier,
    cache: Arc<ChatCache>,
    inactivity_timeout: Duration,
    active: Mutex<IndexMap<String, CancellationToken>>,
}

/// Registration of a streaming turn; released when dropped.
struct ActiveTurn<'a> {
    active: &'a Mutex<IndexMap<String, CancellationToken>>,
    chat_id: String,
    token: CancellationToken,
}

impl Drop for ActiveTurn<'_> {
    fn drop(&mut self) {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .shift_remove(&self.chat_id);
    }
}

impl ChatService {
    pub fn new(store: Arc<dyn ResourceStore>, transport: Arc<dyn ChatTransport>, notifier: Notifier) -> Self {
        Self {
            store,
            transport,
            notifier,
            cache: Arc::new(ChatCache::new()),
            inactivity_timeout: DEFAULT_INACTIVITY_TIMEOUT,
            active: Mutex::new(IndexMap::new()),
        }
    }

    pub fn with_inactivity_timeout(mut self, timeout: Duration) -> Self {
        self.inactivity_timeout = timeout;
        self
    }

    pub fn cache(&self) -> &Arc<ChatCache> {
        &self.cache
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn is_active(&self, chat_id: &str) -> bool {
        self.lock_active().contains_key(chat_id)
    }

    /// Cancels the streaming turn for `chat_id`, if any.
    pub fn cancel(&self, chat_id: &str) -> bool {
        match self.lock_active().get(chat_id) {
            Some(token) => {
                token.cancel();
                info!(chat_id, "turn cancelled");
                true
            }
            None => false,
        }
    }

    /// Loads a chat's persisted messages into the local cache.
    pub async fn load_chat(&self, chat_id: &str) -> Result<usize, ResourceError> {
        let messages = self
            .store
            .get_chat(chat_id)
            .await?
            .map(|chat| chat.messages)
            .unwrap_or_default();
        let count = messages.len();
        self.cache.replace(chat_id, messages);
        Ok(count)
    }

    pub async fn submit_message(&self, chat_id: &str, text: &str) -> Result<TurnReport, TurnError> {
        if chat_id.trim().is_empty() {
            return Err(TurnError::MissingChatId);
        }
        if text.trim().is_empty() {
            return Err(TurnError::EmptyMessage);
        }
        let turn = self.register(chat_id)?;

        let user_message = ChatMessage::user(text, Utc::now());
        let patch = OptimisticPatch::begin(self.cache.clone(), chat_id, &user_message);

        let chart_existed = match self.store.get_chart(chat_id).await {
            Ok(existing) => existing.is_some(),
            Err(e) => {
                error!(chat_id, error = %e, "could not read chart at turn start");
                self.fail(chat_id, patch, true);
                return Err(TurnError::Resource(e));
            }
        };

        let request = ChatRequest {
            prompt: text.to_string(),
            thread_id: chat_id.to_string(),
        };
        let mut draft = TurnDraft::new(text);
        let mut controller = StreamController::new(self.transport.as_ref(), self.inactivity_timeout);
        let streamed = controller
            .run(&request, &turn.token, |event| {
                if draft.apply(event) {
                    patch.stream_content(draft.content());
                }
            })
            .await;

        let summary = match streamed {
            Ok(summary) => summary,
            Err(e) => {
                let cancelled = matches!(e, StreamError::Aborted);
                if cancelled {
                    warn!(chat_id, "turn aborted");
                } else {
                    error!(chat_id, error = %e, state = ?controller.state(), "turn failed");
                }
                self.fail(chat_id, patch, !cancelled);
                return Err(TurnError::Stream(e));
            }
        };

        let system_message = ChatMessage::system(draft.content(), Utc::now());
        let commit = CommitCoordinator::new(self.store.as_ref(), &self.notifier)
            .commit(chat_id, &user_message, &system_message, &draft, chart_existed)
            .await;
        patch.settle(system_message);

        info!(
            chat_id,
            events = summary.events,
            skipped_frames = summary.skipped_frames,
            chart_existed,
            "turn committed"
        );
        Ok(TurnReport {
            chat_id: chat_id.to_string(),
            content: draft.content().to_string(),
            events: summary.events,
            chart_existed,
            commit,
        })
    }

    fn register(&self, chat_id: &str) -> Result<ActiveTurn<'_>, TurnError> {
        let mut active = self.lock_active();
        if active.contains_key(chat_id) {
            warn!(chat_id, "rejecting submission while a turn is streaming");
            return Err(TurnError::TurnInProgress {
                chat_id: chat_id.to_string(),
            });
        }
        let token = CancellationToken::new();
        active.insert(chat_id.to_string(), token.clone());
        Ok(ActiveTurn {
            active: &self.active,
            chat_id: chat_id.to_string(),
            token,
        })
    }

    fn fail(&self, chat_id: &str, patch: OptimisticPatch, notify: bool) {
        patch.rollback();
        if notify {
            self.notifier.publish(Notification::TurnFailed {
                chat_id: chat_id.to_string(),
                message: TURN_FAILED_MESSAGE.to_string(),
            });
        }
    }

    fn lock_active(&self) -> std::sync::MutexGuard<'_, IndexMap<String, CancellationToken>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
