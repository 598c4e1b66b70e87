//! In-memory REST backend
//!
//! Implements `MindmapApi` over a map of stored nodes and records every call
//! so tests can assert on the exact traffic.

use futures_util::future::BoxFuture;
use mindmap_collab::client::MindmapApi;
use mindmap_collab::shared::{ApiError, CreateNodeRequest, NodeDto, NodeType, UpdateNodeRequest};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// One recorded REST call
#[derive(Debug, Clone, PartialEq)]
pub enum ApiCall {
    List,
    Create { keyword: String, parent_id: Option<i64> },
    Update { server_id: i64, x: Option<f64>, keyword: Option<String> },
    Delete { server_id: i64 },
}

pub struct FakeBackend {
    stored: Mutex<BTreeMap<i64, NodeDto>>,
    calls: Mutex<Vec<ApiCall>>,
    next_id: AtomicI64,
    delay: Duration,
    reject_updates: AtomicBool,
}

impl FakeBackend {
    /// Backend answering after `delay`; new ids start at 42
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            stored: Mutex::new(BTreeMap::new()),
            calls: Mutex::new(Vec::new()),
            next_id: AtomicI64::new(42),
            delay,
            reject_updates: AtomicBool::new(false),
        })
    }

    /// Store a node as if it had been persisted earlier
    pub fn seed(&self, node_id: i64, keyword: &str, parent_id: Option<i64>, position: Option<(f64, f64)>) {
        self.stored.lock().insert(
            node_id,
            NodeDto {
                id: None,
                node_id,
                parent_id,
                node_type: Some(NodeType::Text),
                keyword: keyword.to_string(),
                memo: None,
                analysis_status: None,
                x: position.map(|(x, _)| x),
                y: position.map(|(_, y)| y),
                color: None,
            },
        );
    }

    /// Answer every following `PATCH` with a 500
    pub fn reject_updates(&self, reject: bool) {
        self.reject_updates.store(reject, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.calls.lock().clone()
    }

    pub fn count(&self, matches: impl Fn(&ApiCall) -> bool) -> usize {
        self.calls.lock().iter().filter(|call| matches(call)).count()
    }

    pub fn stored(&self, node_id: i64) -> Option<NodeDto> {
        self.stored.lock().get(&node_id).cloned()
    }

    pub fn stored_count(&self) -> usize {
        self.stored.lock().len()
    }
}

impl MindmapApi for FakeBackend {
    fn list_nodes<'a>(&'a self, _workspace_id: &'a str) -> BoxFuture<'a, Result<Vec<NodeDto>, ApiError>> {
        Box::pin(async move {
            self.calls.lock().push(ApiCall::List);
            tokio::time::sleep(self.delay).await;
            Ok(self.stored.lock().values().cloned().collect())
        })
    }

    fn create_node<'a>(
        &'a self,
        _workspace_id: &'a str,
        request: CreateNodeRequest,
    ) -> BoxFuture<'a, Result<NodeDto, ApiError>> {
        Box::pin(async move {
            self.calls.lock().push(ApiCall::Create {
                keyword: request.keyword.clone(),
                parent_id: request.parent_id,
            });
            tokio::time::sleep(self.delay).await;
            let dto = NodeDto {
                id: None,
                node_id: self.next_id.fetch_add(1, Ordering::SeqCst),
                parent_id: request.parent_id,
                node_type: Some(request.node_type),
                keyword: request.keyword,
                memo: request.memo,
                analysis_status: None,
                x: request.x,
                y: request.y,
                color: request.color,
            };
            self.stored.lock().insert(dto.node_id, dto.clone());
            Ok(dto)
        })
    }

    fn update_node<'a>(
        &'a self,
        _workspace_id: &'a str,
        server_id: i64,
        request: UpdateNodeRequest,
    ) -> BoxFuture<'a, Result<(), ApiError>> {
        Box::pin(async move {
            self.calls.lock().push(ApiCall::Update {
                server_id,
                x: request.x,
                keyword: request.keyword.clone(),
            });
            let rejected = self.reject_updates.load(Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if rejected {
                return Err(ApiError::Status {
                    status: 500,
                    body: "update rejected".to_string(),
                });
            }
            let mut stored = self.stored.lock();
            let Some(dto) = stored.get_mut(&server_id) else {
                return Err(ApiError::Status {
                    status: 404,
                    body: "not found".to_string(),
                });
            };
            if let Some(keyword) = request.keyword {
                dto.keyword = keyword;
            }
            if request.x.is_some() {
                dto.x = request.x;
            }
            if request.y.is_some() {
                dto.y = request.y;
            }
            Ok(())
        })
    }

    fn delete_node<'a>(&'a self, _workspace_id: &'a str, server_id: i64) -> BoxFuture<'a, Result<(), ApiError>> {
        Box::pin(async move {
            self.calls.lock().push(ApiCall::Delete { server_id });
            tokio::time::sleep(self.delay).await;
            self.stored.lock().remove(&server_id);
            Ok(())
        })
    }
}
