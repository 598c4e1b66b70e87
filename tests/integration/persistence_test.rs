//! Persistence bridge against the in-memory backend

use crate::common::{durable, node, ApiCall, FakeBackend};
use mindmap_collab::client::{attach_server_id, MutationFacade, Origin, PersistenceBridge, SharedMap};
use mindmap_collab::shared::{CollabConfig, CollabError};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

fn setup(backend: Arc<FakeBackend>) -> (MutationFacade, PersistenceBridge) {
    let map = SharedMap::new();
    let bridge = PersistenceBridge::spawn("ws", map.clone(), backend, &CollabConfig::default());
    (MutationFacade::new(map), bridge)
}

/// Put a durable node in the map without going through the bridge
fn seed_durable(crud: &MutationFacade, id: &str, server_id: i64) {
    crud.nodes()
        .transact(Origin::Remote, |txn| txn.set(id, durable(id, server_id)));
}

#[tokio::test(start_paused = true)]
async fn test_edit_during_create_never_duplicates() {
    let backend = FakeBackend::new(Duration::from_millis(200));
    let (crud, bridge) = setup(backend.clone());

    crud.set("n1", node("n1", "first"));
    tokio::time::sleep(Duration::from_millis(50)).await;
    crud.update("n1", |current| {
        current.map(|mut n| {
            n.keyword = "renamed".to_string();
            n
        })
    });
    tokio::time::sleep(Duration::from_secs(2)).await;

    assert_eq!(backend.count(|c| matches!(c, ApiCall::Create { .. })), 1);
    assert_eq!(
        backend.count(|c| matches!(c, ApiCall::Update { server_id: 42, keyword: Some(k), .. } if k == "renamed")),
        1
    );
    assert_eq!(crud.read("n1").unwrap().server_id, Some(42));
    assert_eq!(backend.stored(42).unwrap().keyword, "renamed");
    assert_eq!(bridge.metrics().failed_calls, 0);
}

#[tokio::test(start_paused = true)]
async fn test_drag_burst_coalesces_into_one_update() {
    let backend = FakeBackend::new(Duration::ZERO);
    backend.seed(7, "n1", None, Some((100.0, 100.0)));
    let (crud, bridge) = setup(backend.clone());
    seed_durable(&crud, "n1", 7);

    for step in 1..=10 {
        assert_ok!(crud.move_to("n1", 100.0 + step as f64 * 10.0, 100.0));
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(
        backend.calls(),
        vec![ApiCall::Update {
            server_id: 7,
            x: Some(200.0),
            keyword: Some("n1".to_string()),
        }]
    );
    assert_eq!(bridge.metrics().coalesced_updates, 9);
}

#[tokio::test(start_paused = true)]
async fn test_sub_threshold_moves_are_suppressed() {
    let backend = FakeBackend::new(Duration::ZERO);
    let (crud, bridge) = setup(backend.clone());
    seed_durable(&crud, "n1", 7);

    assert_ok!(crud.move_to("n1", 100.4, 100.3));
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert!(backend.calls().is_empty());
    assert_eq!(bridge.metrics().suppressed_changes, 1);
}

#[tokio::test(start_paused = true)]
async fn test_remote_and_bootstrap_changes_are_not_projected() {
    let backend = FakeBackend::new(Duration::ZERO);
    let (crud, bridge) = setup(backend.clone());

    crud.nodes()
        .transact(Origin::Remote, |txn| txn.set("peer", node("peer", "from a peer")));
    crud.nodes()
        .transact(Origin::Bootstrap, |txn| txn.set("seed", node("seed", "seeded")));
    crud.nodes().transact(Origin::Remote, |txn| {
        txn.delete("peer");
    });
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert!(backend.calls().is_empty());
    assert_eq!(bridge.metrics().ignored_events, 3);
}

#[tokio::test(start_paused = true)]
async fn test_delete_of_durable_node_is_sent_once() {
    let backend = FakeBackend::new(Duration::ZERO);
    backend.seed(7, "n1", None, None);
    let (crud, _bridge) = setup(backend.clone());
    seed_durable(&crud, "n1", 7);

    crud.remove("n1");
    crud.remove("n1");
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(backend.calls(), vec![ApiCall::Delete { server_id: 7 }]);
    assert_eq!(backend.stored_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_child_create_waits_for_parent() {
    let backend = FakeBackend::new(Duration::from_millis(100));
    let (crud, bridge) = setup(backend.clone());

    crud.set("parent", node("parent", "parent"));
    crud.set("child", node("child", "child").with_parent("parent"));
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(
        backend.calls(),
        vec![
            ApiCall::Create {
                keyword: "parent".to_string(),
                parent_id: None,
            },
            ApiCall::Create {
                keyword: "child".to_string(),
                parent_id: Some(42),
            },
        ]
    );
    assert_eq!(crud.read("child").unwrap().server_id, Some(43));
    assert_eq!(bridge.metrics().deferred_creates, 1);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_update_does_not_block_later_edits() {
    let backend = FakeBackend::new(Duration::from_millis(20));
    backend.seed(7, "n1", None, Some((100.0, 100.0)));
    let (crud, bridge) = setup(backend.clone());
    seed_durable(&crud, "n1", 7);

    backend.reject_updates(true);
    crud.update("n1", |current| {
        current.map(|mut n| {
            n.keyword = "lost".to_string();
            n
        })
    });
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(bridge.metrics().failed_calls, 1);
    assert_eq!(backend.stored(7).unwrap().keyword, "n1");

    backend.reject_updates(false);
    crud.update("n1", |current| {
        current.map(|mut n| {
            n.keyword = "kept".to_string();
            n
        })
    });
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(backend.count(|c| matches!(c, ApiCall::Update { server_id: 7, .. })), 2);
    assert_eq!(backend.stored(7).unwrap().keyword, "kept");
    assert_eq!(bridge.metrics().failed_calls, 1);
}

#[test]
fn test_server_ids_are_immutable() {
    let map = SharedMap::new();
    let crud = MutationFacade::new(map.clone());
    crud.set("n1", node("n1", "one"));

    assert_eq!(assert_ok!(attach_server_id(&map, "n1", 42)), true);
    assert_eq!(assert_ok!(attach_server_id(&map, "n1", 42)), false);
    assert_err!(
        attach_server_id(&map, "n1", 43),
        CollabError::ServerIdAlreadyAssigned { existing: 42, .. }
    );

    // Facade writes keep the attached id whatever they carry
    crud.update("n1", |current| {
        current.map(|mut n| {
            n.server_id = None;
            n.keyword = "edited".to_string();
            n
        })
    });
    assert_eq!(crud.read("n1").unwrap().server_id, Some(42));

    crud.set("n1", node("n1", "replaced"));
    assert_eq!(crud.read("n1").unwrap().server_id, Some(42));
    crud.set("n1", durable("n1", 99));
    assert_eq!(crud.read("n1").unwrap().server_id, Some(42));
}
