use async_trait::async_trait;
use reqwest::{Client, Method, Response, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use tracing::debug;

use crate::resources::{
    ResourceError, ResourceStore,
    models::{Chart, Chat, ChatMessage, Screener},
};

/// JSON-over-HTTP client for the dashboard resource backend.
#[derive(Debug, Clone)]
pub struct RestResourceClient {
    client: Client,
    base_url: String,
}

#[derive(Serialize)]
struct AppendMessages<'a> {
    messages: &'a [ChatMessage],
}

impl RestResourceClient {
    pub fn new(base_url: &str) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn get_opt<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, ResourceError> {
        let response = self.client.get(self.url(path)).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(check(response).await?.json().await?))
    }

    async fn send_json<B, T>(&self, method: Method, path: &str, body: &B) -> Result<T, ResourceError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        debug!(%method, path, "resource write");
        let response = self
            .client
            .request(method, self.url(path))
            .json(body)
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    async fn send_unit<B>(&self, method: Method, path: &str, body: Option<&B>) -> Result<(), ResourceError>
    where
        B: Serialize + ?Sized + Sync,
    {
        debug!(%method, path, "resource write");
        let mut request = self.client.request(method, self.url(path));
        if let Some(body) = body {
            request = request.json(body);
        }
        check(request.send().await?).await?;
        Ok(())
    }
}

async fn check(response: Response) -> Result<Response, ResourceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let url = response.url().to_string();
    let body = response.text().await.unwrap_or_default();
    Err(ResourceError::Status {
        status: status.as_u16(),
        url,
        body,
    })
}

#[async_trait]
impl ResourceStore for RestResourceClient {
    async fn get_chat(&self, chat_id: &str) -> Result<Option<Chat>, ResourceError> {
        self.get_opt(&format!("chats/{chat_id}")).await
    }

    async fn append_messages(&self, chat_id: &str, messages: &[ChatMessage]) -> Result<(), ResourceError> {
        self.send_unit(
            Method::POST,
            &format!("chats/{chat_id}/messages"),
            Some(&AppendMessages { messages }),
        )
        .await
    }

    async fn delete_chat(&self, chat_id: &str) -> Result<(), ResourceError> {
        self.send_unit::<()>(Method::DELETE, &format!("chats/{chat_id}"), None)
            .await
    }

    async fn get_chart(&self, chart_id: &str) -> Result<Option<Chart>, ResourceError> {
        self.get_opt(&format!("charts/{chart_id}")).await
    }

    async fn create_chart(&self, chart: &Chart) -> Result<Chart, ResourceError> {
        self.send_json(Method::POST, "charts", chart).await
    }

    async fn update_chart(&self, chart_id: &str, chart: &Chart) -> Result<Chart, ResourceError> {
        self.send_json(Method::PUT, &format!("charts/{chart_id}"), chart)
            .await
    }

    async fn delete_chart(&self, chart_id: &str) -> Result<(), ResourceError> {
        self.send_unit::<()>(Method::DELETE, &format!("charts/{chart_id}"), None)
            .await
    }

    async fn get_screener(&self, screener_id: &str) -> Result<Option<Screener>, ResourceError> {
        self.get_opt(&format!("screeners/{screener_id}")).await
    }

    async fn create_screener(&self, screener: &Screener) -> Result<Screener, ResourceError> {
        self.send_json(Method::POST, "screeners", screener).await
    }

    async fn delete_screener(&self, screener_id: &str) -> Result<(), ResourceError> {
        self.send_unit::<()>(Method::DELETE, &format!("screeners/{screener_id}"), None)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_is_normalized() {
        let client = RestResourceClient::new("http://localhost:8000/api/");
        assert_eq!(client.url("charts/c1"), "http://localhost:8000/api/charts/c1");
    }
}
