//! Keep-children deletes with the persistence bridge attached

use crate::common::{durable, ApiCall, FakeBackend};
use mindmap_collab::client::{DetachmentResolver, DetachmentState, MutationFacade, Origin, PersistenceBridge, SharedMap};
use mindmap_collab::shared::CollabConfig;
use pretty_assertions::assert_eq;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_keep_children_lifecycle_reaches_backend() {
    let backend = FakeBackend::new(Duration::ZERO);
    backend.seed(1, "root", None, Some((100.0, 100.0)));
    backend.seed(2, "mid", Some(1), Some((100.0, 100.0)));
    backend.seed(3, "leaf", Some(2), Some((100.0, 100.0)));
    let map = SharedMap::new();
    let _bridge = PersistenceBridge::spawn("ws", map.clone(), backend.clone(), &CollabConfig::default());
    let crud = MutationFacade::new(map.clone());
    map.transact(Origin::Bootstrap, |txn| {
        txn.set("root", durable("root", 1));
        txn.set("mid", durable("mid", 2).with_parent("root"));
        txn.set("leaf", durable("leaf", 3).with_parent("mid"));
    });
    let resolver = DetachmentResolver::new(crud.clone());

    let selections = assert_ok!(resolver.delete_keep_children("mid"));
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(selections.len(), 1);
    assert_eq!(selections[0].anchor_node_id, "leaf");
    assert_eq!(selections[0].original_parent_id, "mid");
    assert_eq!(backend.count(|c| *c == ApiCall::Delete { server_id: 2 }), 1);
    assert_eq!(backend.count(|c| matches!(c, ApiCall::Update { server_id: 3, .. })), 1);

    assert_eq!(assert_ok!(resolver.reattach("leaf")), Some(DetachmentState::Reattached));
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(crud.read("leaf").unwrap().parent_id.as_deref(), Some("root"));
    assert_eq!(backend.count(|c| matches!(c, ApiCall::Update { server_id: 3, .. })), 2);
    assert!(resolver.pending_all().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_peer_deleting_anchor_expires_decision() {
    let map = SharedMap::new();
    let crud = MutationFacade::new(map.clone());
    map.transact(Origin::Remote, |txn| {
        txn.set("mid", durable("mid", 2));
        txn.set("a", durable("a", 3).with_parent("mid"));
    });
    let resolver = DetachmentResolver::new(crud.clone());
    assert_ok!(resolver.delete_keep_children("mid"));

    map.transact(Origin::Remote, |txn| {
        txn.delete("a");
    });

    assert_eq!(resolver.state("a"), Some(DetachmentState::Expired));
    assert_eq!(assert_ok!(resolver.reattach("a")), None);
    assert!(resolver.reconcile().is_empty());
}
