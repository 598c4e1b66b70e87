//! Two sessions sharing one in-process relay

use crate::common::{eventually, node, ApiCall, FakeBackend};
use mindmap_collab::client::{
    BootstrapCoordinator, BootstrapOutcome, LocalConnector, MindmapApi, PersistenceBridge, RadialLayout, SessionClient,
};
use mindmap_collab::shared::CollabConfig;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_created_node_reaches_late_joiner_with_server_id() {
    let backend = FakeBackend::new(Duration::from_millis(10));
    let api: Arc<dyn MindmapApi> = backend.clone();
    let connector = Arc::new(LocalConnector::default());
    let client = SessionClient::new(connector.clone(), CollabConfig::default());

    let alice = assert_ok!(client.connect("7", "alice").await);
    let _bridge = PersistenceBridge::spawn("7", alice.nodes().clone(), api.clone(), &CollabConfig::default());
    alice.crud().set("n1", node("n1", "shared idea"));

    assert!(eventually(|| alice.nodes().get("n1").and_then(|n| n.server_id) == Some(42)).await);
    assert!(eventually(|| connector.hub().node_count("mindmap:7") == 1).await);

    let bob = assert_ok!(client.connect("7", "bob").await);
    let bootstrap = BootstrapCoordinator::new(api, Arc::new(RadialLayout::default()), 5000.0);
    let outcome = assert_ok!(bootstrap.ensure_bootstrapped("7", bob.nodes()).await);

    assert_eq!(outcome, BootstrapOutcome::SeededByPeer);
    assert!(eventually(|| bob.nodes().get("n1").and_then(|n| n.server_id) == Some(42)).await);
    assert_eq!(bob.nodes().len(), 1);
    assert_eq!(backend.count(|c| matches!(c, ApiCall::Create { .. })), 1);
    assert_eq!(backend.count(|c| *c == ApiCall::List), 0);
}

#[tokio::test]
async fn test_concurrent_edits_converge() {
    let connector = Arc::new(LocalConnector::default());
    let client = SessionClient::new(connector, CollabConfig::default());
    let alice = assert_ok!(client.connect("7", "alice").await);
    let bob = assert_ok!(client.connect("7", "bob").await);

    alice.crud().set("a", node("a", "from alice"));
    bob.crud().set("b", node("b", "from bob"));
    alice.crud().set("shared", node("shared", "alice wrote"));
    bob.crud().set("shared", node("shared", "bob wrote"));

    assert!(eventually(|| alice.nodes().len() == 3 && bob.nodes().len() == 3).await);
    assert!(eventually(|| alice.nodes().get("shared") == bob.nodes().get("shared")).await);
    assert_eq!(alice.nodes().entries(), bob.nodes().entries());
}

#[tokio::test]
async fn test_presence_stays_out_of_node_map() {
    let client = SessionClient::new(Arc::new(LocalConnector::default()), CollabConfig::default());
    let alice = assert_ok!(client.connect("7", "alice").await);
    let bob = assert_ok!(client.connect("7", "bob").await);

    alice.presence().set_cursor(10.0, 10.0, "#00ff00");
    alice.presence().set_chat("hello", false);
    let alice_id = alice.connection_id().unwrap();

    assert!(eventually(|| {
        bob.presence()
            .peer(&alice_id)
            .is_some_and(|p| p.record.chat.is_some())
    })
    .await);
    assert!(bob.nodes().is_empty());
    assert!(alice.nodes().is_empty());
}
