//! The SSE chat endpoint as seen by the stream controller.

use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt, stream::BoxStream};
use reqwest::Client;
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Response body as a stream of raw chunks.
pub type ByteStream = BoxStream<'static, Result<Bytes, TransportError>>;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("chat request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("chat endpoint returned {status}: {body}")]
    Status { status: u16, body: String },
}

/// Body of a chat request. `thread_id` is the chat id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatRequest {
    pub prompt: String,
    pub thread_id: String,
}

#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Sends the request. `Ok(None)` means the response carried no readable body.
    ///
    /// Cancelling `abort` must stop the in-flight request and end the body stream.
    async fn open(
        &self,
        request: &ChatRequest,
        abort: CancellationToken,
    ) -> Result<Option<ByteStream>, TransportError>;
}

#[derive(Debug, Clone)]
pub struct HttpChatTransport {
    client: Client,
    endpoint: String,
}

impl HttpChatTransport {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::with_client(Client::new(), endpoint)
    }

    pub fn with_client(client: Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl ChatTransport for HttpChatTransport {
    async fn open(
        &self,
        request: &ChatRequest,
        abort: CancellationToken,
    ) -> Result<Option<ByteStream>, TransportError> {
        debug!(endpoint = %self.endpoint, thread_id = %request.thread_id, "opening chat stream");
        let send = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(request)
            .send();

        let response = tokio::select! {
            biased;
            _ = abort.cancelled() => return Ok(None),
            response = send => response?,
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }
        if response.content_length() == Some(0) {
            return Ok(None);
        }

        let body = response
            .bytes_stream()
            .map_err(TransportError::from)
            .take_until(abort.cancelled_owned());
        Ok(Some(body.boxed()))
    }
}
