//! HTTP client against a wiremock backend

use mindmap_collab::client::{ClientConfig, HttpMindmapApi, MindmapApi};
use mindmap_collab::shared::{ApiError, CollabConfig, CreateNodeRequest, Node, UpdateNodeRequest};
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn client(server: &MockServer, token: Option<&str>) -> HttpMindmapApi {
    let mut config = assert_ok!(ClientConfig::with_builder(
        CollabConfig::builder().api_url(server.uri())
    ));
    config.set_token(token.map(str::to_string));
    HttpMindmapApi::new(&config)
}

#[tokio::test]
async fn test_list_nodes_sends_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/mindmap/7/nodes"))
        .and(header("Authorization", "Bearer secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "nodeId": 1, "keyword": "root", "x": 10.0, "y": 20.0 },
            { "nodeId": 2, "parentId": 1, "keyword": "child", "type": "text" }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let api = client(&server, Some("secret")).await;
    let nodes = assert_ok!(api.list_nodes("7").await);

    assert_eq!(nodes.len(), 2);
    assert_eq!(nodes[1].parent_id, Some(1));
    assert_eq!(nodes[0].client_id(), "1");
}

#[tokio::test]
async fn test_create_node_posts_camel_case_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/mindmap/7/node"))
        .and(body_partial_json(json!({ "keyword": "idea", "parentId": 3 })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "nodeId": 42, "keyword": "idea" })))
        .expect(1)
        .mount(&server)
        .await;

    let api = client(&server, None).await;
    let node = Node::new("idea").at(1.0, 2.0);
    let created = assert_ok!(api.create_node("7", CreateNodeRequest::from_node(&node, Some(3))).await);

    assert_eq!(created.node_id, 42);
}

#[tokio::test]
async fn test_update_and_delete_ignore_response_bodies() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/mindmap/7/node/42"))
        .and(body_partial_json(json!({ "x": 5.0, "y": 6.0 })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/mindmap/7/node/42"))
        .respond_with(ResponseTemplate::new(200).set_body_string("deleted"))
        .expect(1)
        .mount(&server)
        .await;

    let api = client(&server, None).await;
    assert_ok!(api.update_node("7", 42, UpdateNodeRequest::position(5.0, 6.0)).await);
    assert_ok!(api.delete_node("7", 42).await);
}

#[tokio::test]
async fn test_error_status_is_surfaced() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/mindmap/7/nodes"))
        .respond_with(ResponseTemplate::new(401).set_body_string("expired token"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/mindmap/7/node"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let api = client(&server, Some("old")).await;

    let error = api.list_nodes("7").await.unwrap_err();
    assert!(error.is_auth_error());
    assert_matches::assert_matches!(error, ApiError::Status { status: 401, ref body } if body == "expired token");

    let request = CreateNodeRequest::from_node(&Node::new("x"), None);
    assert_err!(api.create_node("7", request).await, ApiError::Decode(_));
}
