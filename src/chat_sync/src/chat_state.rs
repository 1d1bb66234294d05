//! Local chat state and the optimistic patch applied while a turn streams.
//!
//! [`ChatCache`] is read-mostly: readers load an `Arc` snapshot, writers swap in a
//! new map with `arc-swap`'s read-copy-update, so a half-applied change is never
//! observable.
//!
//! [`OptimisticPatch`] is a command with an inverse. `begin` captures the chat's
//! prior messages and appends the user message plus an analyzing placeholder;
//! `rollback` puts the captured messages back exactly. A patch dropped without
//! `settle` rolls itself back, so a cancelled turn cannot leave ghost messages.

use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use tracing::debug;

use crate::resources::models::{ChatMessage, Role};

pub type ChatMap = IndexMap<String, Vec<ChatMessage>>;

#[derive(Debug)]
pub struct ChatCache {
    chats: ArcSwap<ChatMap>,
}

impl Default for ChatCache {
    fn default() -> Self {
        Self {
            chats: ArcSwap::from_pointee(ChatMap::new()),
        }
    }
}

impl ChatCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current messages for a chat; empty when nothing is cached.
    pub fn messages(&self, chat_id: &str) -> Vec<ChatMessage> {
        self.chats.load().get(chat_id).cloned().unwrap_or_default()
    }

    pub fn snapshot(&self) -> Arc<ChatMap> {
        self.chats.load_full()
    }

    /// Seeds a chat from the store.
    pub fn replace(&self, chat_id: &str, messages: Vec<ChatMessage>) {
        self.restore(chat_id, Some(messages));
    }

    fn update(&self, chat_id: &str, f: impl Fn(&mut Vec<ChatMessage>)) {
        self.chats.rcu(|current| {
            let mut next = ChatMap::clone(current);
            f(next.entry(chat_id.to_string()).or_default());
            next
        });
    }

    fn restore(&self, chat_id: &str, prior: Option<Vec<ChatMessage>>) {
        self.chats.rcu(|current| {
            let mut next = ChatMap::clone(current);
            match &prior {
                Some(messages) => {
                    next.insert(chat_id.to_string(), messages.clone());
                }
                None => {
                    next.shift_remove(chat_id);
                }
            }
            next
        });
    }
}

#[derive(Debug)]
pub struct OptimisticPatch {
    cache: Arc<ChatCache>,
    chat_id: String,
    prior: Option<Vec<ChatMessage>>,
    open: bool,
}

impl OptimisticPatch {
    /// Captures the chat's state and shows the user message and placeholder.
    pub fn begin(cache: Arc<ChatCache>, chat_id: &str, user_message: &ChatMessage) -> Self {
        let prior = cache.snapshot().get(chat_id).cloned();
        let placeholder = ChatMessage::analyzing_placeholder(user_message.timestamp);
        cache.update(chat_id, |messages| {
            messages.push(user_message.clone());
            messages.push(placeholder.clone());
        });
        debug!(chat_id, "optimistic chat patch applied");

        Self {
            cache,
            chat_id: chat_id.to_string(),
            prior,
            open: true,
        }
    }

    /// Shows the cumulative assistant text in the trailing system message.
    ///
    /// If the trailing message is not a system message, a new one is appended.
    pub fn stream_content(&self, content: &str) {
        self.stream_content_at(content, Utc::now());
    }

    pub fn stream_content_at(&self, content: &str, now: DateTime<Utc>) {
        self.cache.update(&self.chat_id, |messages| match trailing_system(messages) {
            Some(last) => {
                last.content = content.to_string();
                last.is_analyzing = None;
            }
            None => messages.push(ChatMessage::system(content, now)),
        });
    }

    /// Keeps the patch, replacing the trailing system message with the final one.
    pub fn settle(mut self, final_message: ChatMessage) {
        self.cache.update(&self.chat_id, |messages| match trailing_system(messages) {
            Some(last) => *last = final_message.clone(),
            None => messages.push(final_message.clone()),
        });
        self.open = false;
    }

    /// Restores the chat to exactly what it was before `begin`.
    pub fn rollback(mut self) {
        self.undo();
    }

    fn undo(&mut self) {
        if self.open {
            self.cache.restore(&self.chat_id, self.prior.take());
            self.open = false;
            debug!(chat_id = %self.chat_id, "optimistic chat patch rolled back");
        }
    }
}

fn trailing_system(messages: &mut [ChatMessage]) -> Option<&mut ChatMessage> {
    messages.last_mut().filter(|m| m.role == Role::System)
}

impl Drop for OptimisticPatch {
    fn drop(&mut self) {
        self.undo();
    }
}
