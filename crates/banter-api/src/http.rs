//! reqwest-backed implementation of [`ConversationApi`].

use std::time::Duration;

use async_trait::async_trait;
use banter_core::ids::ConversationId;
use banter_core::model::{Conversation, Message};
use reqwest::{Client, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::instrument;

use crate::ConversationApi;
use crate::error::ApiError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Where the conversation endpoints live and how long to wait for them.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Base URL of the admin-console API, e.g. `https://admin.example.com/api`.
    pub base_url: String,
    /// Total per-request timeout, covering connect, send, and body read.
    pub request_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:9320/api".to_owned(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// Body of `POST /messages`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendMessageRequest<'a> {
    conversation_id: &'a ConversationId,
    text: &'a str,
}

/// HTTP client for the conversation endpoints.
///
/// Stateless besides the connection pool; clone freely or share behind an
/// `Arc`. All three calls return typed [`ApiError`]s and never panic on
/// bad server output.
#[derive(Clone, Debug)]
pub struct HttpConversationApi {
    client: Client,
    config: ApiConfig,
}

impl HttpConversationApi {
    pub fn new(config: ApiConfig) -> Self {
        Self {
            client: Client::builder()
                .connect_timeout(CONNECT_TIMEOUT)
                .timeout(config.request_timeout)
                .build()
                .expect("failed to build HTTP client"),
            config,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn transport_error(&self, error: &reqwest::Error) -> ApiError {
        if error.is_timeout() {
            ApiError::Timeout(self.config.request_timeout)
        } else {
            ApiError::NetworkError(error.to_string())
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let resp = self
            .client
            .get(self.url(path))
            .send()
            .await
            .map_err(|e| self.transport_error(&e))?;
        read_json(resp).await
    }
}

async fn read_json<T: DeserializeOwned>(resp: Response) -> Result<T, ApiError> {
    if !resp.status().is_success() {
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        return Err(ApiError::from_status(status, body));
    }
    resp.json::<T>()
        .await
        .map_err(|e| ApiError::MalformedResponse(e.to_string()))
}

#[async_trait]
impl ConversationApi for HttpConversationApi {
    #[instrument(skip(self))]
    async fn list_conversations(&self) -> Result<Vec<Conversation>, ApiError> {
        self.get_json("/conversations").await
    }

    #[instrument(skip(self), fields(conversation = %conversation))]
    async fn fetch_thread(
        &self,
        conversation: &ConversationId,
    ) -> Result<Vec<Message>, ApiError> {
        self.get_json(&format!("/conversations/{conversation}/messages"))
            .await
    }

    #[instrument(skip(self, text), fields(conversation = %conversation))]
    async fn send_message(
        &self,
        conversation: &ConversationId,
        text: &str,
    ) -> Result<Message, ApiError> {
        let body = SendMessageRequest {
            conversation_id: conversation,
            text,
        };
        let resp = self
            .client
            .post(self.url("/messages"))
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(&e))?;
        read_json(resp).await
    }
}
