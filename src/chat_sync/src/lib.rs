//! Streaming chat-to-dashboard reconciliation.
//!
//! A chat turn flows one way through the modules below:
//! [`transport`] opens the SSE response, [`sse`] cuts it into typed [`events`],
//! [`accumulator`] folds them into chat/chart/screener drafts while [`chat_state`]
//! shows the text optimistically, [`controller`] owns the turn's lifecycle, and
//! [`commit`] persists the result through [`resources`] and announces it on the
//! [`notifier`] bus. [`service`] wires it together.

pub mod accumulator;
pub mod chat_state;
pub mod commit;
pub mod controller;
pub mod events;
pub mod notifier;
pub mod resources;
pub mod service;
pub mod sse;
pub mod transport;

pub use notifier::{Notification, Notifier};
pub use service::{ChatService, TurnError, TurnReport};
