//! Lifecycle of one streamed chat turn.
//!
//! ```text
//! Idle -> Connecting -> Streaming -> Completed
//!             |             |------> TimedOut   (no chunk within the inactivity window)
//!             |             |------> Aborted    (external cancellation)
//!             '-------------'------> Errored    (no body, transport failure)
//! ```
//!
//! The inactivity window is a deadline that every received chunk pushes forward;
//! it races the body reader in one `select!`. Whatever the terminal state, the body
//! stream is dropped and, unless the stream completed, the request is aborted once.

use std::time::Duration;

use futures::StreamExt;
use thiserror::Error;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{
    events::StreamEvent,
    sse::SseDecoder,
    transport::{ByteStream, ChatRequest, ChatTransport, TransportError},
};

/// Inactivity window used when the config does not say otherwise.
pub const DEFAULT_INACTIVITY_TIMEOUT: Duration = Duration::from_secs(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Connecting,
    Streaming,
    Completed,
    TimedOut,
    Aborted,
    Errored,
}

impl StreamState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::TimedOut | Self::Aborted | Self::Errored
        )
    }
}

/// Turn-fatal stream failures.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("chat response had no readable body")]
    MissingBody,

    #[error("no data received for {0:?}")]
    TimedOut(Duration),

    #[error("chat stream was aborted")]
    Aborted,

    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreamSummary {
    pub chunks: usize,
    pub events: usize,
    pub skipped_frames: usize,
}

/// Cancels the in-flight request at most once.
struct RequestAbort {
    token: CancellationToken,
    fired: bool,
}

impl RequestAbort {
    fn fire(&mut self) {
        if !self.fired && !self.token.is_cancelled() {
            self.token.cancel();
            debug!("chat request aborted");
        }
        self.fired = true;
    }
}

pub struct StreamController<'a> {
    transport: &'a dyn ChatTransport,
    inactivity_timeout: Duration,
    state: StreamState,
}

impl<'a> StreamController<'a> {
    pub fn new(transport: &'a dyn ChatTransport, inactivity_timeout: Duration) -> Self {
        Self {
            transport,
            inactivity_timeout,
            state: StreamState::Idle,
        }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    fn transition(&mut self, next: StreamState) {
        debug!(from = ?self.state, to = ?next, "stream state");
        self.state = next;
    }

    /// Runs the turn to a terminal state, handing each decoded event to `on_event`
    /// in arrival order.
    ///
    /// `cancel` is the external abort signal; the request itself gets a child token
    /// so cancelling the turn also cancels the request.
    pub async fn run<F>(
        &mut self,
        request: &ChatRequest,
        cancel: &CancellationToken,
        mut on_event: F,
    ) -> Result<StreamSummary, StreamError>
    where
        F: FnMut(StreamEvent) + Send,
    {
        let mut abort = RequestAbort {
            token: cancel.child_token(),
            fired: false,
        };
        self.transition(StreamState::Connecting);

        let result = self.drive(request, cancel, &mut abort, &mut on_event).await;

        let terminal = match &result {
            Ok(_) => StreamState::Completed,
            Err(StreamError::TimedOut(_)) => StreamState::TimedOut,
            Err(StreamError::Aborted) => StreamState::Aborted,
            Err(StreamError::MissingBody | StreamError::Transport(_)) => StreamState::Errored,
        };
        self.transition(terminal);
        if terminal != StreamState::Completed {
            abort.fire();
        }
        result
    }

    async fn drive<F>(
        &mut self,
        request: &ChatRequest,
        cancel: &CancellationToken,
        abort: &mut RequestAbort,
        on_event: &mut F,
    ) -> Result<StreamSummary, StreamError>
    where
        F: FnMut(StreamEvent) + Send,
    {
        let timeout = self.inactivity_timeout;
        let mut deadline = Instant::now() + timeout;

        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(StreamError::Aborted),
            _ = sleep_until(deadline) => {
                abort.fire();
                return Err(StreamError::TimedOut(timeout));
            }
            opened = self.transport.open(request, abort.token.clone()) => opened?,
        };
        let mut body: ByteStream = opened.ok_or(StreamError::MissingBody)?;
        self.transition(StreamState::Streaming);

        let mut decoder = SseDecoder::new();
        let mut summary = StreamSummary::default();
        deadline = Instant::now() + timeout;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(StreamError::Aborted),
                _ = sleep_until(deadline) => {
                    abort.fire();
                    return Err(StreamError::TimedOut(timeout));
                }
                chunk = body.next() => match chunk {
                    Some(Ok(bytes)) => {
                        deadline = Instant::now() + timeout;
                        summary.chunks += 1;
                        for event in decoder.push(&bytes) {
                            summary.events += 1;
                            on_event(event);
                        }
                    }
                    Some(Err(e)) => return Err(e.into()),
                    None => {
                        summary.skipped_frames = decoder.finish();
                        return Ok(summary);
                    }
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use futures::stream;

    struct Fixed(Vec<&'static str>);

    #[async_trait]
    impl ChatTransport for Fixed {
        async fn open(
            &self,
            _request: &ChatRequest,
            _abort: CancellationToken,
        ) -> Result<Option<ByteStream>, TransportError> {
            let chunks: Vec<Result<Bytes, TransportError>> =
                self.0.iter().map(|c| Ok(Bytes::from_static(c.as_bytes()))).collect();
            Ok(Some(stream::iter(chunks).boxed()))
        }
    }

    struct NoBody;

    #[async_trait]
    impl ChatTransport for NoBody {
        async fn open(
            &self,
            _request: &ChatRequest,
            _abort: CancellationToken,
        ) -> Result<Option<ByteStream>, TransportError> {
            Ok(None)
        }
    }

    fn request() -> ChatRequest {
        ChatRequest {
            prompt: "hi".into(),
            thread_id: "chat-1".into(),
        }
    }

    #[tokio::test]
    async fn completes_and_delivers_events_in_order() {
        let transport = Fixed(vec![
            "data: {\"action_type\":\"llm_response\",\"message\":\"a\"}\n\ndata: {\"action_",
            "type\":\"llm_response\",\"message\":\"b\"}\n\ndata: oops\n\n",
        ]);
        let mut controller = StreamController::new(&transport, DEFAULT_INACTIVITY_TIMEOUT);
        assert_eq!(controller.state(), StreamState::Idle);

        let mut seen = Vec::new();
        let summary = controller
            .run(&request(), &CancellationToken::new(), |ev| seen.push(ev))
            .await
            .unwrap();

        assert_eq!(controller.state(), StreamState::Completed);
        assert_eq!(summary.chunks, 2);
        assert_eq!(summary.events, 2);
        assert_eq!(summary.skipped_frames, 1);
        assert_eq!(
            seen,
            vec![
                StreamEvent::LlmResponse { message: "a".into() },
                StreamEvent::LlmResponse { message: "b".into() },
            ]
        );
    }

    #[tokio::test]
    async fn missing_body_is_errored() {
        let mut controller = StreamController::new(&NoBody, DEFAULT_INACTIVITY_TIMEOUT);
        let err = controller
            .run(&request(), &CancellationToken::new(), |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, StreamError::MissingBody));
        assert_eq!(controller.state(), StreamState::Errored);
        assert!(controller.state().is_terminal());
    }

    #[tokio::test]
    async fn cancelled_before_start_is_aborted() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let transport = Fixed(vec![]);
        let mut controller = StreamController::new(&transport, DEFAULT_INACTIVITY_TIMEOUT);
        let err = controller.run(&request(), &cancel, |_| {}).await.unwrap_err();
        assert!(matches!(err, StreamError::Aborted));
        assert_eq!(controller.state(), StreamState::Aborted);
    }
}
