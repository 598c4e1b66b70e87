//! Bootstrap coordinator against the in-memory backend

use crate::common::{ApiCall, FakeBackend};
use mindmap_collab::client::{
    BootstrapCoordinator, BootstrapOutcome, MindmapApi, MutationFacade, PersistenceBridge, RadialLayout, SharedMap,
};
use mindmap_collab::shared::{CollabConfig, Node};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

fn coordinator(backend: Arc<FakeBackend>) -> BootstrapCoordinator {
    let api: Arc<dyn MindmapApi> = backend;
    BootstrapCoordinator::new(api, Arc::new(RadialLayout::default()), 5000.0)
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_bootstrap_fetches_once() {
    let backend = FakeBackend::new(Duration::from_millis(20));
    backend.seed(1, "root", None, Some((2500.0, 2500.0)));
    backend.seed(2, "child", Some(1), Some((2700.0, 2500.0)));
    let coordinator = coordinator(backend.clone());
    let map = SharedMap::new();

    let (first, second) = tokio::join!(
        coordinator.ensure_bootstrapped("ws", &map),
        coordinator.ensure_bootstrapped("ws", &map)
    );

    let outcomes = [assert_ok!(first), assert_ok!(second)];
    assert_eq!(
        outcomes
            .iter()
            .filter(|o| matches!(o, BootstrapOutcome::Seeded(_)))
            .count(),
        1
    );
    assert!(outcomes.contains(&BootstrapOutcome::AlreadyBootstrapped));
    assert_eq!(backend.count(|c| *c == ApiCall::List), 1);
    assert_eq!(map.len(), 2);
    assert_eq!(map.get("2").unwrap().parent_id.as_deref(), Some("1"));
}

#[tokio::test(start_paused = true)]
async fn test_peer_seeded_map_skips_fetch() {
    let backend = FakeBackend::new(Duration::ZERO);
    backend.seed(1, "root", None, None);
    let coordinator = coordinator(backend.clone());
    let map = SharedMap::new();
    MutationFacade::new(map.clone()).set("peer-node", Node::new("from a peer"));

    let outcome = assert_ok!(coordinator.ensure_bootstrapped("ws", &map).await);

    assert_eq!(outcome, BootstrapOutcome::SeededByPeer);
    assert!(backend.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_bootstrap_writes_back_positions_without_creates() {
    let backend = FakeBackend::new(Duration::ZERO);
    backend.seed(1, "root", None, None);
    backend.seed(2, "far away", None, Some((9000.0, -50.0)));
    backend.seed(3, "placed", None, Some((100.0, 100.0)));
    let coordinator = coordinator(backend.clone());
    let map = SharedMap::new();
    let bridge = PersistenceBridge::spawn("ws", map.clone(), backend.clone(), &CollabConfig::default());

    let outcome = assert_ok!(coordinator.ensure_bootstrapped("ws", &map).await);
    tokio::time::sleep(Duration::from_secs(1)).await;

    let BootstrapOutcome::Seeded(report) = outcome else {
        panic!("expected a seeded outcome, got {:?}", outcome);
    };
    assert_eq!(report.fetched, 3);
    assert_eq!(report.inserted, 3);
    assert_eq!(report.positions_saved, 2);

    let far = map.get("2").unwrap();
    assert_on_canvas!(far);
    assert_eq!(far.y, Some(0.0));
    assert!(map.get("1").unwrap().has_position());

    assert_eq!(backend.count(|c| matches!(c, ApiCall::Create { .. })), 0);
    assert_eq!(bridge.metrics().total_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_latch_is_per_workspace() {
    let backend = FakeBackend::new(Duration::ZERO);
    let coordinator = coordinator(backend.clone());
    let map = SharedMap::new();

    // An empty backend seeds nothing but still sets the latch
    let outcome = assert_ok!(coordinator.ensure_bootstrapped("ws", &map).await);
    assert!(matches!(outcome, BootstrapOutcome::Seeded(_)));
    assert!(coordinator.is_bootstrapped("ws"));
    assert!(!coordinator.is_bootstrapped("other"));

    coordinator.reset_for("ws");
    assert!(!coordinator.is_bootstrapped("ws"));
}

#[tokio::test(start_paused = true)]
async fn test_refetch_merges_only_new_nodes() {
    let backend = FakeBackend::new(Duration::ZERO);
    backend.seed(1, "root", None, Some((2500.0, 2500.0)));
    let coordinator = coordinator(backend.clone());
    let map = SharedMap::new();
    assert_ok!(coordinator.ensure_bootstrapped("ws", &map).await);

    backend.seed(5, "bulk import", Some(1), Some((2600.0, 2600.0)));
    let added = assert_ok!(coordinator.refetch_and_merge("ws", &map).await);

    assert_eq!(added, 1);
    assert_eq!(map.len(), 2);
    assert_eq!(map.get("5").unwrap().parent_id.as_deref(), Some("1"));
}
