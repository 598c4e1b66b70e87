//! Mind-map REST API Client
//!
//! The four node endpoints the sync core talks to. `MindmapApi` is the seam
//! the bootstrap coordinator and the persistence bridge depend on;
//! `HttpMindmapApi` is the reqwest implementation.
//!
//! Endpoints:
//! - `GET    /mindmap/{workspaceId}/nodes`
//! - `POST   /mindmap/{workspaceId}/node`
//! - `PATCH  /mindmap/{workspaceId}/node/{serverId}`
//! - `DELETE /mindmap/{workspaceId}/node/{serverId}`

use crate::client::config::ClientConfig;
use crate::shared::dto::{CreateNodeRequest, NodeDto, UpdateNodeRequest};
use crate::shared::error::ApiError;
use futures_util::future::BoxFuture;
use parking_lot::RwLock;
use reqwest::{Client, RequestBuilder, Response};
use std::sync::Arc;

/// REST operations on mind-map nodes
pub trait MindmapApi: Send + Sync {
    /// List every node of a workspace
    fn list_nodes<'a>(&'a self, workspace_id: &'a str) -> BoxFuture<'a, Result<Vec<NodeDto>, ApiError>>;

    /// Persist a new node and return it with its server id
    fn create_node<'a>(
        &'a self,
        workspace_id: &'a str,
        request: CreateNodeRequest,
    ) -> BoxFuture<'a, Result<NodeDto, ApiError>>;

    /// Patch fields of a persisted node
    fn update_node<'a>(
        &'a self,
        workspace_id: &'a str,
        server_id: i64,
        request: UpdateNodeRequest,
    ) -> BoxFuture<'a, Result<(), ApiError>>;

    /// Delete a persisted node
    fn delete_node<'a>(&'a self, workspace_id: &'a str, server_id: i64) -> BoxFuture<'a, Result<(), ApiError>>;
}

/// reqwest-backed `MindmapApi`
#[derive(Debug, Clone)]
pub struct HttpMindmapApi {
    client: Client,
    base_url: String,
    token: Arc<RwLock<Option<String>>>,
}

impl HttpMindmapApi {
    pub fn new(config: &ClientConfig) -> Self {
        Self::with_client(Client::new(), config)
    }

    /// Use a preconfigured reqwest client
    pub fn with_client(client: Client, config: &ClientConfig) -> Self {
        Self {
            client,
            base_url: config.collab().api_url.clone(),
            token: Arc::new(RwLock::new(config.get_token().map(str::to_string))),
        }
    }

    /// Replace the bearer token, e.g. after a refresh
    pub fn set_token(&self, token: Option<String>) {
        *self.token.write() = token;
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match self.token.read().as_deref() {
            Some(token) => request.header("Authorization", format!("Bearer {}", token)),
            None => request,
        }
    }

    async fn check(response: Response) -> Result<Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| status.to_string());
        Err(ApiError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

impl MindmapApi for HttpMindmapApi {
    fn list_nodes<'a>(&'a self, workspace_id: &'a str) -> BoxFuture<'a, Result<Vec<NodeDto>, ApiError>> {
        Box::pin(async move {
            let url = self.url(&format!("/mindmap/{}/nodes", workspace_id));
            let response = self.authorized(self.client.get(&url)).send().await?;
            Self::check(response)
                .await?
                .json::<Vec<NodeDto>>()
                .await
                .map_err(|e| ApiError::Decode(e.to_string()))
        })
    }

    fn create_node<'a>(
        &'a self,
        workspace_id: &'a str,
        request: CreateNodeRequest,
    ) -> BoxFuture<'a, Result<NodeDto, ApiError>> {
        Box::pin(async move {
            let url = self.url(&format!("/mindmap/{}/node", workspace_id));
            let response = self
                .authorized(self.client.post(&url))
                .json(&request)
                .send()
                .await?;
            Self::check(response)
                .await?
                .json::<NodeDto>()
                .await
                .map_err(|e| ApiError::Decode(e.to_string()))
        })
    }

    fn update_node<'a>(
        &'a self,
        workspace_id: &'a str,
        server_id: i64,
        request: UpdateNodeRequest,
    ) -> BoxFuture<'a, Result<(), ApiError>> {
        Box::pin(async move {
            let url = self.url(&format!("/mindmap/{}/node/{}", workspace_id, server_id));
            let response = self
                .authorized(self.client.patch(&url))
                .json(&request)
                .send()
                .await?;
            Self::check(response).await?;
            Ok(())
        })
    }

    fn delete_node<'a>(&'a self, workspace_id: &'a str, server_id: i64) -> BoxFuture<'a, Result<(), ApiError>> {
        Box::pin(async move {
            let url = self.url(&format!("/mindmap/{}/node/{}", workspace_id, server_id));
            let response = self.authorized(self.client.delete(&url)).send().await?;
            Self::check(response).await?;
            Ok(())
        })
    }
}
