//! End-to-end pipeline tests
//!
//! Scan, filter, calculation, sort and limit pipelines executed through the
//! engine, including fullCount, batching, memory limits and kill.

#[path = "testutils/mod.rs"]
mod testutils;

use aqlexec::{ExecutionError, ExecutionState, QueryOptions};
use serde_json::json;
use testutils::test_fixture::{attribute, batched, full_count_options, scan, TestFixture};

fn adults_by_age(offset: usize, limit: usize) -> serde_json::Value {
    json!({"nodes": [
        scan(1, "users", &[]),
        {"id": 2, "type": "filter", "condition": {"type": "compare", "op": ">=",
            "left": attribute(0, "age"), "right": {"type": "constant", "value": 18}}},
        {"id": 3, "type": "calculation", "expression": attribute(0, "name")},
        {"id": 4, "type": "sort", "keys": [{"expression": attribute(0, "age")}]},
        {"id": 5, "type": "limit", "offset": offset, "limit": limit, "fullCount": true}
    ]})
}

fn multiples_of_three() -> serde_json::Value {
    json!({"nodes": [
        scan(1, "numbers", &["n"]),
        {"id": 2, "type": "filter", "condition": {"type": "compare", "op": "==",
            "left": {"type": "arithmetic", "op": "%", "left": attribute(0, "n"),
                "right": {"type": "constant", "value": 3}},
            "right": {"type": "constant", "value": 0}}},
        {"id": 3, "type": "calculation", "expression": attribute(0, "n")}
    ]})
}

#[test]
fn test_sort_limit_with_offset() {
    let fixture = TestFixture::users();
    let result = fixture.run(adults_by_age(1, 1), full_count_options());

    assert_eq!(result.rows, vec![json!("ann")]);
    assert_eq!(result.full_count(), Some(3));
    assert_eq!(result.stats.filtered, 1);
    assert_eq!(result.stats.scanned_full, 4);
}

#[test]
fn test_full_count_not_reported_unless_requested() {
    let fixture = TestFixture::users();
    let result = fixture.run(adults_by_age(0, 2), QueryOptions::default());

    assert_eq!(result.rows, vec![json!("dee"), json!("ann")]);
    assert_eq!(result.full_count(), None);
    assert!(result.to_json()["extra"]["stats"].get("fullCount").is_none());
}

#[test]
fn test_limit_zero_still_counts() {
    let fixture = TestFixture::users();
    let plan = json!({"nodes": [
        scan(1, "users", &[]),
        {"id": 2, "type": "limit", "limit": 0, "fullCount": true}
    ]});
    let result = fixture.run(plan, full_count_options());

    assert!(result.is_empty());
    assert_eq!(result.full_count(), Some(4));
}

#[test]
fn test_full_count_without_limit_is_row_count() {
    let fixture = TestFixture::numbers(7);
    let plan = json!({"nodes": [scan(1, "numbers", &["n"])]});
    let result = fixture.run(plan, full_count_options());

    assert_eq!(result.row_count(), 7);
    assert_eq!(result.full_count(), Some(7));
}

#[test]
fn test_batch_size_does_not_change_result() {
    let fixture = TestFixture::numbers(25);
    let expected: Vec<_> = (0..25).filter(|n| n % 3 == 0).map(|n| json!(n)).collect();

    for batch_size in [1, 2, 7, 1000] {
        let result = fixture.run(multiples_of_three(), batched(batch_size));
        assert_eq!(result.rows, expected, "batch size {}", batch_size);
        assert_eq!(result.stats.filtered, 16, "batch size {}", batch_size);
    }
}

#[test]
fn test_get_some_and_skip_some() {
    let fixture = TestFixture::numbers(10);
    let plan = json!({"nodes": [
        scan(1, "numbers", &["n"]),
        {"id": 2, "type": "calculation", "expression": attribute(0, "n")}
    ]});
    let mut engine = fixture.engine(plan, QueryOptions::default());

    assert_eq!(engine.skip_some(3).unwrap(), 3);

    let result = engine.get_some(4).unwrap();
    assert_eq!(result.state, ExecutionState::HasMore);
    let block = result.block.expect("rows expected");
    let values: Vec<_> = block.rows().iter().map(|row| engine.result_value(row)).collect();
    assert_eq!(
        values.iter().map(|v| v.to_json(None).unwrap()).collect::<Vec<_>>(),
        vec![json!(3), json!(4), json!(5), json!(6)]
    );

    assert_eq!(engine.skip_some(100).unwrap(), 3);
    let last = engine.get_some(10).unwrap();
    assert_eq!(last.state, ExecutionState::Done);
    assert!(last.block.is_none());
}

#[test]
fn test_lazy_rows() {
    let fixture = TestFixture::numbers(100);
    let mut engine = fixture.engine(multiples_of_three(), batched(5));

    let first: Vec<_> = engine
        .rows()
        .take(2)
        .map(|value| value.unwrap().to_json(None).unwrap())
        .collect();
    assert_eq!(first, vec![json!(0), json!(3)]);
    assert!(engine.take_stats().scanned_full < 100);
}

#[test]
fn test_memory_limit_exceeded() {
    let fixture = TestFixture::numbers(2000);
    let plan = json!({"nodes": [
        scan(1, "numbers", &[]),
        {"id": 2, "type": "sort", "keys": [{"expression": attribute(0, "n"), "ascending": false}]}
    ]});
    let error = fixture.run_err(plan, QueryOptions::memory_constrained(4096));
    assert!(matches!(error, ExecutionError::ResourceLimit { limit: 4096, .. }), "{}", error);
}

#[test]
fn test_sort_reports_peak_memory() {
    let fixture = TestFixture::numbers(50);
    let plan = json!({"nodes": [
        scan(1, "numbers", &["n"]),
        {"id": 2, "type": "calculation", "expression": attribute(0, "n")},
        {"id": 3, "type": "sort", "keys": [{"expression": {"type": "register", "register": 1}, "ascending": false}]},
        {"id": 4, "type": "limit", "limit": 3}
    ]});
    let result = fixture.run(plan, QueryOptions::default());

    assert_eq!(result.rows, vec![json!(49), json!(48), json!(47)]);
    assert!(result.stats.peak_memory_usage > 0);
}

#[test]
fn test_kill_and_reset() {
    let fixture = TestFixture::numbers(10);
    let mut engine = fixture.engine(json!({"nodes": [scan(1, "numbers", &["n"])]}), QueryOptions::default());

    engine.kill();
    assert_eq!(engine.get_some(5).unwrap_err(), ExecutionError::QueryKilled);

    engine.reset().unwrap();
    let result = engine.run().unwrap();
    assert_eq!(result.row_count(), 10);
}

#[test]
fn test_invalid_plans_rejected() {
    let fixture = TestFixture::users();

    let not_a_source = json!({"nodes": [{"id": 1, "type": "limit", "limit": 1}]});
    assert!(matches!(
        fixture.run_err(not_a_source, QueryOptions::default()),
        ExecutionError::BadParameter(_)
    ));

    let bad_register = json!({"nodes": [
        scan(1, "users", &[]),
        {"id": 2, "type": "filter", "condition": {"type": "register", "register": 3}}
    ]});
    assert!(matches!(
        fixture.run_err(bad_register, QueryOptions::default()),
        ExecutionError::BadParameter(_)
    ));

    let unknown_collection = json!({"nodes": [scan(1, "missing", &[])]});
    assert!(matches!(
        fixture.run_err(unknown_collection, QueryOptions::default()),
        ExecutionError::NotFound(_)
    ));
}
