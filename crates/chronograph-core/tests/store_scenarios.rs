//! End-to-end store behaviour through the public contract

use std::path::Path;
use std::sync::Arc;
use std::thread;

use chrono::{DateTime, Duration, Utc};
use chronograph_core::types::data_map;
use chronograph_core::{
    ChronoError, DataMap, Edge, EngineConfig, Entity, ErrorKind, Node, Store, Timestamp,
};
use serde_json::json;
use tempfile::tempdir;

#[test]
fn test_learn_x_update_chain() {
    let dir = tempdir().unwrap();
    let store = Store::open_dir(dir.path()).unwrap();

    let goal = store
        .add_node(Node::new("goal", data_map(json!({"title": "Learn X"}))))
        .unwrap();
    let history = store.node_history(&goal.id).unwrap();
    assert_eq!(history.len(), 1);
    assert!(history[0].is_current());

    let first = store
        .update_node(&goal.id, data_map(json!({"title": "Learn Y"})))
        .unwrap();
    let second = store
        .update_node(&goal.id, data_map(json!({"title": "Learn Z"})))
        .unwrap();

    let history = store.node_history(&goal.id).unwrap();
    assert_eq!(history.len(), 3);
    assert_eq!(history.iter().filter(|v| v.is_current()).count(), 1);

    // Windows abut: each superseded version ends where the next begins.
    assert_eq!(history[0].valid_until, Some(first.valid_from));
    assert_eq!(history[1].valid_until, Some(second.valid_from));

    let just_after_first = store.get_node_at_time(&goal.id, first.valid_from).unwrap();
    assert_eq!(just_after_first.field("title"), Some(&json!("Learn Y")));
    assert_eq!(
        store.get_node(&goal.id).unwrap().field("title"),
        Some(&json!("Learn Z"))
    );
}

#[test]
fn test_temporal_selection_bounds() {
    let dir = tempdir().unwrap();
    let store = Store::open_dir(dir.path()).unwrap();
    let v1 = store.add_node(Node::new("goal", DataMap::new())).unwrap();
    let v2 = store.update_node(&v1.id, data_map(json!({"n": 2}))).unwrap();
    let t0 = v1.valid_from;
    let t1 = v2.valid_from;
    let eps = Duration::nanoseconds(1);

    assert!(store.get_node_at_time(&v1.id, t1 - eps).unwrap().data.is_empty());
    assert_eq!(store.get_node_at_time(&v1.id, t1).unwrap(), v2);
    let err = store.get_node_at_time(&v1.id, t0 - eps).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn test_restart_rebuilds_everything() {
    let dir = tempdir().unwrap();
    let config = EngineConfig::new(dir.path());

    let (goal_id, objective_id, edge_id, old) = {
        let store = Store::open(&config).unwrap();
        let goal = store.add_node(Node::new("goal", data_map(json!({"title": "g"})))).unwrap();
        let objective = store.add_node(Node::new("objective", DataMap::new())).unwrap();
        let edge = store
            .add_edge(Edge::new(&goal.id, &objective.id, "has_objective", DataMap::new()))
            .unwrap();
        store
            .update_edge(&edge.id, data_map(json!({"weight": 0.5})))
            .unwrap();
        store
            .update_node(&goal.id, data_map(json!({"title": "g2"})))
            .unwrap();
        store.close().unwrap();
        (goal.id, objective.id, edge.id, goal.valid_from)
    };

    let store = Store::open(&config).unwrap();
    assert_eq!(store.node_history(&goal_id).unwrap().len(), 2);
    assert_eq!(
        store.get_node_at_time(&goal_id, old).unwrap().field("title"),
        Some(&json!("g"))
    );
    assert_eq!(store.edge_history(&edge_id).unwrap().len(), 2);
    assert_eq!(store.get_edge(&edge_id).unwrap().field("weight"), Some(&json!(0.5)));
    assert_eq!(store.list_nodes_by_type("objective").len(), 1);
    assert_eq!(store.list_edges_by_type("has_objective").len(), 1);

    let neighbors = store.neighbors(&objective_id).unwrap();
    assert_eq!(neighbors.len(), 1);
    assert_eq!(neighbors[0].id, goal_id);

    let stats = store.stats();
    assert_eq!(stats.node_histories, 2);
    assert_eq!(stats.node_versions, 3);
    assert_eq!(stats.current_edges, 1);
}

#[test]
fn test_history_file_format() {
    let dir = tempdir().unwrap();
    let store = Store::open_dir(dir.path()).unwrap();
    store
        .add_node(Node::new("goal", data_map(json!({"title": "x"}))).with_id("g1"))
        .unwrap();
    store.update_node("g1", data_map(json!({"title": "y"}))).unwrap();

    let raw: serde_json::Value =
        serde_json::from_slice(&std::fs::read(dir.path().join("nodes/goal/g1.json")).unwrap())
            .unwrap();
    let versions = raw.as_array().unwrap();
    assert_eq!(versions.len(), 2);
    assert_eq!(versions[0]["type"], "goal");
    assert_eq!(versions[1]["valid_until"], "0001-01-01T00:00:00Z");
    assert_ne!(versions[0]["valid_until"], "0001-01-01T00:00:00Z");
}

#[test]
fn test_referential_integrity_never_mutates() {
    let dir = tempdir().unwrap();
    let store = Store::open_dir(dir.path()).unwrap();
    let a = store.add_node(Node::new("goal", DataMap::new())).unwrap();
    let before = store.stats();

    for (src, dst) in [(a.id.as_str(), "ghost"), ("ghost", a.id.as_str()), ("x", "y")] {
        let err = store
            .add_edge(Edge::new(src, dst, "rel", DataMap::new()).with_id("e1"))
            .unwrap_err();
        assert!(matches!(err, ChronoError::MissingEndpoint { .. }));
    }
    assert_eq!(store.stats(), before);
    assert!(store.get_edge("e1").is_err());
    assert!(store.edges_of(&a.id).is_empty());
    assert!(!dir.path().join("edges/e1.json").exists());
}

#[test]
fn test_edge_endpoints_fixed_across_versions() {
    let dir = tempdir().unwrap();
    let store = Store::open_dir(dir.path()).unwrap();
    let a = store.add_node(Node::new("goal", DataMap::new())).unwrap();
    let b = store.add_node(Node::new("goal", DataMap::new())).unwrap();
    let c = store.add_node(Node::new("goal", DataMap::new())).unwrap();
    let edge = store
        .add_edge(Edge::new(&a.id, &b.id, "rel", DataMap::new()))
        .unwrap();

    let moved = Edge::new(&a.id, &c.id, "rel", DataMap::new()).with_id(&edge.id);
    assert_eq!(store.add_edge(moved).unwrap_err().kind(), ErrorKind::InvalidArgument);

    let updated = store.update_edge(&edge.id, data_map(json!({"w": 1}))).unwrap();
    assert_eq!(updated.source_id, a.id);
    assert_eq!(updated.target_id, b.id);
}

#[test]
fn test_neighbors_collapse_parallel_edges() {
    let dir = tempdir().unwrap();
    let store = Store::open_dir(dir.path()).unwrap();
    let a = store.add_node(Node::new("goal", DataMap::new())).unwrap();
    let b = store.add_node(Node::new("goal", DataMap::new())).unwrap();
    store
        .add_edge(Edge::new(&a.id, &b.id, "rel", DataMap::new()))
        .unwrap();
    store
        .add_edge(Edge::new(&b.id, &a.id, "rel", DataMap::new()))
        .unwrap();

    let neighbors = store.neighbors(&a.id).unwrap();
    assert_eq!(neighbors.len(), 1, "duplicate neighbours must collapse");
    assert_eq!(neighbors[0].id, b.id);
}

#[test]
fn test_concurrent_updates_lose_nothing() {
    let dir = tempdir().unwrap();
    let store = Arc::new(Store::open_dir(dir.path()).unwrap());
    let node = store.add_node(Node::new("counter", DataMap::new())).unwrap();

    let writers = 8;
    let per_writer = 10;
    let handles: Vec<_> = (0..writers)
        .map(|w| {
            let store = Arc::clone(&store);
            let id = node.id.clone();
            thread::spawn(move || {
                for i in 0..per_writer {
                    store
                        .update_node(&id, data_map(json!({"writer": w, "i": i})))
                        .unwrap();
                    // Interleave reads with the writes.
                    assert!(store.get_node(&id).unwrap().is_current());
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let history = store.node_history(&node.id).unwrap();
    assert_eq!(history.len(), 1 + writers * per_writer);
    assert_eq!(history.iter().filter(|v| v.is_current()).count(), 1);
    assert!(history.windows(2).all(|w| w[0].valid_from < w[1].valid_from));
    assert!(history
        .windows(2)
        .all(|w| w[0].valid_until == Some(w[1].valid_from)));

    drop(store);
    let reopened = Store::open_dir(dir.path()).unwrap();
    assert_eq!(
        reopened.node_history(&node.id).unwrap().len(),
        1 + writers * per_writer
    );
}

#[test]
fn test_leftover_temp_file_is_ignored() {
    let dir = tempdir().unwrap();
    {
        let store = Store::open_dir(dir.path()).unwrap();
        store.add_node(Node::new("goal", DataMap::new()).with_id("g1")).unwrap();
    }
    std::fs::write(dir.path().join("nodes/goal/.g1.json.abc123.tmp"), "[{\"id\":").unwrap();

    let store = Store::open_dir(dir.path()).unwrap();
    assert!(store.get_node("g1").is_ok());
    assert_eq!(store.stats().node_histories, 1);
}

#[test]
fn test_path_hostile_values_rejected() {
    let dir = tempdir().unwrap();
    let store = Store::open_dir(dir.path()).unwrap();

    for node in [
        Node::new("goal", DataMap::new()).with_id("../escape"),
        Node::new("../goal", DataMap::new()),
        Node::new("", DataMap::new()),
    ] {
        assert_eq!(
            store.add_node(node).unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
    }
    assert_eq!(store.stats().node_histories, 0);
}

/// a, b open since 00:00; edge e1 a->b "rel" valid only 01:00..02:00
fn closed_edge_fixture(root: &Path) {
    let node = |id: &str| {
        json!([{
            "id": id,
            "type": "goal",
            "data": {},
            "created_at": "2024-01-01T00:00:00Z",
            "valid_from": "2024-01-01T00:00:00Z",
            "valid_until": "0001-01-01T00:00:00Z"
        }])
    };
    let goals = root.join("nodes/goal");
    std::fs::create_dir_all(&goals).unwrap();
    for id in ["a", "b"] {
        std::fs::write(goals.join(format!("{}.json", id)), node(id).to_string()).unwrap();
    }
    let edges = root.join("edges");
    std::fs::create_dir_all(&edges).unwrap();
    let edge = json!([{
        "id": "e1",
        "source_id": "a",
        "target_id": "b",
        "type": "rel",
        "data": {},
        "created_at": "2024-01-01T01:00:00Z",
        "valid_from": "2024-01-01T01:00:00Z",
        "valid_until": "2024-01-01T02:00:00Z"
    }]);
    std::fs::write(edges.join("e1.json"), edge.to_string()).unwrap();
}

fn at(s: &str) -> Timestamp {
    DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
}

#[test]
fn test_neighbors_skip_closed_edges() {
    let dir = tempdir().unwrap();
    closed_edge_fixture(dir.path());
    let store = Store::open_dir(dir.path()).unwrap();

    assert!(store.get_edge("e1").is_err());
    assert_eq!(store.edge_history("e1").unwrap().len(), 1);
    assert!(store.neighbors("a").unwrap().is_empty());
    assert!(store.neighbors("b").unwrap().is_empty());
    assert!(store.edges_of("a").is_empty());
}

#[test]
fn test_traversal_follows_temporal_mode() {
    let dir = tempdir().unwrap();
    closed_edge_fixture(dir.path());
    let store = Store::open_dir(dir.path()).unwrap();
    let from_a = || store.nodes().with_id("a");

    let inside = from_a().as_of(at("2024-01-01T01:30:00Z")).neighbors_via("rel");
    assert_eq!(inside.ids(), vec!["b"]);
    assert_eq!(from_a().as_of(at("2024-01-01T00:30:00Z")).neighbors_via("rel").count(), 0);
    // Upper bound is exclusive.
    assert_eq!(from_a().as_of(at("2024-01-01T02:00:00Z")).neighbors_via("rel").count(), 0);
    assert_eq!(from_a().neighbors_via("rel").count(), 0);

    let overlapping = from_a()
        .between(at("2024-01-01T00:00:00Z"), at("2024-01-01T01:30:00Z"))
        .neighbors_via("rel");
    assert_eq!(overlapping.ids(), vec!["b"]);
    let disjoint = from_a()
        .between(at("2024-01-01T02:30:00Z"), at("2024-01-01T03:00:00Z"))
        .neighbors_via("rel");
    assert_eq!(disjoint.count(), 0);
}
