//! Profiling tests: per-node statistics, aliases and internal nodes

#[path = "testutils/mod.rs"]
mod testutils;

use aqlexec::exec::ExecutionNodeId;
use aqlexec::{ProfileLevel, QueryOptions};
use serde_json::json;
use testutils::test_fixture::{attribute, scan, TestFixture};

fn profiled(profile: ProfileLevel) -> QueryOptions {
    QueryOptions {
        profile,
        ..QueryOptions::default()
    }
}

/// Calculation 3 reports as filter 2; limit 4 is internal
fn aliased_plan() -> serde_json::Value {
    json!({"nodes": [
        scan(1, "users", &["name", "age"]),
        {"id": 2, "type": "filter", "condition": {"type": "compare", "op": ">=",
            "left": attribute(0, "age"), "right": {"type": "constant", "value": 18}}},
        {"id": 3, "alias": 2, "type": "calculation", "expression": attribute(0, "name")},
        {"id": 4, "internal": true, "type": "limit", "limit": 10}
    ]})
}

#[test]
fn test_aliases_and_internal_nodes() {
    let fixture = TestFixture::users();
    let result = fixture.run(aliased_plan(), profiled(ProfileLevel::Basic));

    assert_eq!(result.row_count(), 3);
    let mut ids: Vec<_> = result.stats.nodes().keys().map(|id| id.0).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 2]);

    let scan = result.stats.node(ExecutionNodeId(1)).unwrap();
    assert_eq!(scan.items, 4);
    assert!(scan.calls >= 1);

    // filter and calculation each passed 3 rows
    let merged = result.stats.node(ExecutionNodeId(2)).unwrap();
    assert_eq!(merged.items, 6);
    assert!(merged.calls >= 2);
    assert!(merged.runtime >= 0.0);
}

#[test]
fn test_no_node_stats_without_profiling() {
    let fixture = TestFixture::users();
    let result = fixture.run(aliased_plan(), QueryOptions::default());

    assert!(result.stats.nodes().is_empty());
    assert!(result.to_json()["extra"].get("profile").is_none());
}

#[test]
fn test_profile_in_result_document() {
    let fixture = TestFixture::users();
    let doc = fixture.run(aliased_plan(), profiled(ProfileLevel::Blocks)).to_json();

    assert_eq!(doc["result"], json!(["ann", "cid", "dee"]));
    assert_eq!(doc["extra"]["profile"]["level"], json!("blocks"));
    let ids: Vec<_> = doc["extra"]["profile"]["nodes"]
        .as_array()
        .unwrap()
        .iter()
        .map(|node| node["id"].clone())
        .collect();
    assert_eq!(ids, vec![json!(1), json!(2)]);
    assert!(doc["extra"]["stats"].get("nodes").is_none());
}

#[test]
fn test_reset_keeps_aliases() {
    let fixture = TestFixture::users();
    let mut engine = fixture.engine(aliased_plan(), profiled(ProfileLevel::Basic));

    let first = engine.run().unwrap();
    engine.reset().unwrap();
    let second = engine.run().unwrap();

    assert_eq!(first.rows, second.rows);
    assert_eq!(
        first.stats.node(ExecutionNodeId(2)).map(|n| n.items),
        second.stats.node(ExecutionNodeId(2)).map(|n| n.items)
    );
    assert!(second.stats.node(ExecutionNodeId(4)).is_none());
}
