//! Replicas converge whatever the order of edits and merges

use mindmap_collab::client::{Origin, SharedMap};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Set { replica: usize, key: u8, value: u16 },
    Delete { replica: usize, key: u8 },
    Sync { from: usize, to: usize },
}

const REPLICAS: usize = 3;

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..REPLICAS, 0u8..4, any::<u16>()).prop_map(|(replica, key, value)| Op::Set { replica, key, value }),
        (0..REPLICAS, 0u8..4).prop_map(|(replica, key)| Op::Delete { replica, key }),
        (0..REPLICAS, 0..REPLICAS).prop_map(|(from, to)| Op::Sync { from, to }),
    ]
}

fn replicas() -> Vec<SharedMap<u16>> {
    (0..REPLICAS)
        .map(|i| SharedMap::with_client_id(i as u64 + 1))
        .collect()
}

proptest! {
    #[test]
    fn test_replicas_converge(ops in prop::collection::vec(op(), 0..40), reverse in any::<bool>()) {
        let maps = replicas();
        for op in &ops {
            match *op {
                Op::Set { replica, key, value } => {
                    maps[replica].transact(Origin::Local, |txn| txn.set(format!("k{}", key), value));
                }
                Op::Delete { replica, key } => {
                    maps[replica].transact(Origin::Local, |txn| {
                        txn.delete(&format!("k{}", key));
                    });
                }
                Op::Sync { from, to } => {
                    let snapshot = maps[from].snapshot();
                    prop_assert!(maps[to].merge_remote(&snapshot).is_ok());
                }
            }
        }

        // Full exchange in either direction
        let mut order: Vec<usize> = (0..REPLICAS).collect();
        if reverse {
            order.reverse();
        }
        for &from in &order {
            for &to in &order {
                if from != to {
                    let snapshot = maps[from].snapshot();
                    prop_assert!(maps[to].merge_remote(&snapshot).is_ok());
                }
            }
        }

        let reference = maps[0].entries();
        for map in &maps[1..] {
            prop_assert_eq!(&map.entries(), &reference);
        }
    }

    #[test]
    fn test_merge_is_idempotent(values in prop::collection::vec(any::<u16>(), 1..10)) {
        let maps = replicas();
        for (i, value) in values.iter().enumerate() {
            maps[0].transact(Origin::Local, |txn| txn.set(format!("k{}", i % 3), *value));
        }
        let snapshot = maps[0].snapshot();

        prop_assert!(maps[1].merge_remote(&snapshot).is_ok());
        let once = maps[1].entries();
        prop_assert_eq!(maps[1].merge_remote(&snapshot).ok(), Some(0));
        prop_assert_eq!(maps[1].entries(), once);
    }
}
