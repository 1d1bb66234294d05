#![allow(dead_code)]

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use chat_sync::{
    ChatService, Notifier,
    resources::memory::InMemoryStore,
    transport::{ByteStream, ChatRequest, ChatTransport, TransportError},
};
use futures::{StreamExt, stream};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

pub enum Script {
    /// Sends every chunk, then ends the body.
    Complete(Vec<String>),
    /// Sends every chunk, then goes silent without ending.
    Hang(Vec<String>),
    /// Sends each chunk after `gap`, then ends.
    Slow(Vec<String>, Duration),
    NoBody,
    Reject,
}

/// Chat endpoint stand-in that plays a fixed script and counts request aborts.
pub struct ScriptedTransport {
    script: Script,
    requests: Mutex<Vec<ChatRequest>>,
    aborts: Arc<AtomicUsize>,
}

impl ScriptedTransport {
    pub fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            script,
            requests: Mutex::new(Vec::new()),
            aborts: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn complete(frames: Vec<String>) -> Arc<Self> {
        Self::new(Script::Complete(frames))
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn aborts(&self) -> usize {
        self.aborts.load(Ordering::SeqCst)
    }
}

fn chunks(frames: &[String]) -> Vec<Result<Bytes, TransportError>> {
    frames.iter().map(|f| Ok(Bytes::from(f.clone()))).collect()
}

#[async_trait]
impl ChatTransport for ScriptedTransport {
    async fn open(
        &self,
        request: &ChatRequest,
        abort: CancellationToken,
    ) -> Result<Option<ByteStream>, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        let aborts = self.aborts.clone();
        tokio::spawn(async move {
            abort.cancelled().await;
            aborts.fetch_add(1, Ordering::SeqCst);
        });

        match &self.script {
            Script::Complete(frames) => Ok(Some(stream::iter(chunks(frames)).boxed())),
            Script::Hang(frames) => Ok(Some(
                stream::iter(chunks(frames)).chain(stream::pending()).boxed(),
            )),
            Script::Slow(frames, gap) => {
                let gap = *gap;
                Ok(Some(
                    stream::iter(chunks(frames))
                        .then(move |chunk| async move {
                            tokio::time::sleep(gap).await;
                            chunk
                        })
                        .boxed(),
                ))
            }
            Script::NoBody => Ok(None),
            Script::Reject => Err(TransportError::Status {
                status: 502,
                body: "bad gateway".into(),
            }),
        }
    }
}

pub fn frame(value: Value) -> String {
    format!("data: {value}\n\n")
}

pub fn llm(message: &str) -> String {
    frame(json!({"action_type": "llm_response", "message": message}))
}

pub fn indicator(name: &str, value: i64, ticker: &str) -> String {
    frame(json!({
        "action_type": "plot_indicator",
        "indicators": [{"name": name, "value": value}],
        "ticker": ticker,
    }))
}

pub fn pattern(kind: &str) -> String {
    frame(json!({"action_type": "plot_chart_pattern", "chart_pattern": [{"type": kind}]}))
}

pub fn screen(symbols: &[&str]) -> String {
    let records: Vec<Value> = symbols.iter().map(|s| json!({"symbol": s})).collect();
    frame(json!({"action_type": "screen_stock", "records": records}))
}

pub fn service(store: &Arc<InMemoryStore>, transport: &Arc<ScriptedTransport>) -> ChatService {
    ChatService::new(store.clone(), transport.clone(), Notifier::default())
}

/// Lets spawned watcher tasks observe a cancellation.
pub async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}
