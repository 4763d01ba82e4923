//! `SyncClient` over the board server's JSON HTTP API.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;
use taskboard_core::{
    BoardError, BoardPayload, BoardResult, CreateListRequest, CreateTaskRequest, ListId,
    ListPayload, MoveTaskRequest, RenameListRequest, ReorderListRequest, TaskId, TaskPayload,
    UpdateTaskRequest,
};
use tracing::debug;

use crate::config::ClientConfig;
use crate::errors::{ClientError, ClientResult};
use crate::sync_client::SyncClient;

pub struct HttpSyncClient {
    base_url: String,
    client: Client,
}

impl HttpSyncClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> BoardResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ClientError::from)?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn from_config(config: &ClientConfig) -> BoardResult<Self> {
        Self::new(config.server_url.clone(), config.request_timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        debug!("{} {}{}", method, self.base_url, path);
        self.client.request(method, format!("{}{}", self.base_url, path))
    }

    async fn send(&self, request: RequestBuilder) -> ClientResult<Response> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let url = response.url().path().to_string();
        let body = response.text().await.unwrap_or_default();
        Err(BoardError::Transport(format!("{} returned {}: {}", url, status, body)).into())
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> BoardResult<T> {
        let response = self.send(request).await?;
        let body = response.text().await.map_err(ClientError::from)?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn send_empty(&self, request: RequestBuilder) -> BoardResult<()> {
        self.send(request).await?;
        Ok(())
    }
}

#[async_trait]
impl SyncClient for HttpSyncClient {
    async fn fetch_board(&self) -> BoardResult<BoardPayload> {
        self.send_json(self.request(Method::GET, "/lists")).await
    }

    async fn create_list(&self, request: CreateListRequest) -> BoardResult<ListPayload> {
        self.send_json(self.request(Method::POST, "/lists").json(&request))
            .await
    }

    async fn rename_list(&self, request: RenameListRequest) -> BoardResult<()> {
        self.send_empty(self.request(Method::PATCH, "/update_list_name").json(&request))
            .await
    }

    async fn delete_list(&self, id: ListId) -> BoardResult<()> {
        self.send_empty(self.request(Method::DELETE, &format!("/delete_list/{}", id)))
            .await
    }

    async fn reorder_list(&self, id: ListId, request: ReorderListRequest) -> BoardResult<()> {
        self.send_empty(
            self.request(Method::PATCH, &format!("/lists/{}/move", id))
                .json(&request),
        )
        .await
    }

    async fn create_task(&self, request: CreateTaskRequest) -> BoardResult<TaskPayload> {
        self.send_json(self.request(Method::POST, "/add_task").json(&request))
            .await
    }

    async fn update_task(&self, id: TaskId, request: UpdateTaskRequest) -> BoardResult<()> {
        self.send_empty(
            self.request(Method::PATCH, &format!("/tasks/{}/update", id))
                .json(&request),
        )
        .await
    }

    async fn move_task(&self, id: TaskId, request: MoveTaskRequest) -> BoardResult<()> {
        self.send_empty(
            self.request(Method::PATCH, &format!("/tasks/{}/move", id))
                .json(&request),
        )
        .await
    }

    async fn delete_task(&self, id: TaskId) -> BoardResult<()> {
        self.send_empty(self.request(Method::DELETE, &format!("/tasks/{}/delete", id)))
            .await
    }
}
