//! Property tests for the version-history invariants

use chronograph_core::{validate_directory, DataMap, Entity, Node, Store};
use proptest::prelude::*;
use proptest::test_runner::Config as ProptestConfig;
use serde_json::json;
use tempfile::tempdir;

#[derive(Debug, Clone)]
enum Op {
    /// Add under one of a few fixed ids (re-adding supersedes)
    Add(u8),
    /// Update one of the fixed ids if it exists
    Update(u8, i64),
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u8..4).prop_map(Op::Add),
        (0u8..4, any::<i64>()).prop_map(|(id, n)| Op::Update(id, n)),
    ]
}

fn id(n: u8) -> String {
    format!("n{}", n)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_exactly_one_current_version(ops in prop::collection::vec(arb_op(), 1..24)) {
        let dir = tempdir().unwrap();
        let store = Store::open_dir(dir.path()).unwrap();

        for op in &ops {
            match op {
                Op::Add(n) => {
                    store.add_node(Node::new("item", DataMap::new()).with_id(id(*n))).unwrap();
                }
                Op::Update(n, value) => {
                    let mut data = DataMap::new();
                    data.insert("value".into(), json!(value));
                    let result = store.update_node(&id(*n), data);
                    prop_assert_eq!(result.is_ok(), store.contains_node(&id(*n)));
                }
            }
        }

        for n in 0u8..4 {
            let Ok(history) = store.node_history(&id(n)) else { continue };
            prop_assert_eq!(history.iter().filter(|v| v.is_current()).count(), 1);
            prop_assert!(history.windows(2).all(|w| w[0].valid_from() < w[1].valid_from()));
            prop_assert!(history
                .windows(2)
                .all(|w| w[0].valid_until() == Some(w[1].valid_from())));
        }

        let report = validate_directory(dir.path()).unwrap();
        prop_assert!(report.is_healthy());
        prop_assert_eq!(report.warnings, 0);
    }
}
