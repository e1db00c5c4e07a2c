// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Execution statistics
//!
//! [`ExecutionStats`] accumulates the counters of one query. Blocks keep
//! their own copies while they run and the engine merges them with `add`,
//! so an instance is only ever written by one thread at a time. Results from
//! remote shards arrive in wire format and are merged the same way.

use crate::exec::call::json_type_name;
use crate::exec::error::ExecutionError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::HashMap;
use std::fmt;
use std::ops::AddAssign;

/// Identifier of a node in the execution plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionNodeId(pub u64);

impl ExecutionNodeId {
    /// Alias target meaning "do not report this node"
    pub const INTERNAL_NODE: ExecutionNodeId = ExecutionNodeId(u64::MAX);

    pub fn is_internal(&self) -> bool {
        *self == Self::INTERNAL_NODE
    }
}

impl fmt::Display for ExecutionNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-node counters reported when profiling
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionNodeStats {
    /// Number of times the node's block was invoked
    pub calls: u64,
    /// Rows returned or skipped by the block
    pub items: u64,
    /// Rows dropped by the block
    pub filtered: u64,
    /// Wall-clock seconds spent inside the block, dependencies included
    pub runtime: f64,
}

impl AddAssign<&ExecutionNodeStats> for ExecutionNodeStats {
    fn add_assign(&mut self, other: &ExecutionNodeStats) {
        self.calls += other.calls;
        self.items += other.items;
        self.filtered += other.filtered;
        self.runtime += other.runtime;
    }
}

/// Query-wide counters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionStats {
    pub writes_executed: u64,
    pub writes_ignored: u64,
    /// Documents read by full collection scans
    pub scanned_full: u64,
    /// Entries read from indexes
    pub scanned_index: u64,
    pub cursors_created: u64,
    pub cursors_rearmed: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    /// Rows removed by filters
    pub filtered: u64,
    /// Requests sent to remote shards
    pub requests: u64,
    /// Rows the query would have returned without its LIMIT
    pub full_count: u64,
    /// Rows returned to the client
    pub count: u64,
    pub peak_memory_usage: u64,
    pub intermediate_commits: u64,
    /// Wall-clock seconds of the whole execution
    pub execution_time: f64,
    nodes: HashMap<ExecutionNodeId, ExecutionNodeStats>,
    node_aliases: HashMap<ExecutionNodeId, ExecutionNodeId>,
}

const SCALAR_KEYS: [&str; 14] = [
    "writesExecuted",
    "writesIgnored",
    "scannedFull",
    "scannedIndex",
    "cursorsCreated",
    "cursorsRearmed",
    "cacheHits",
    "cacheMisses",
    "filtered",
    "requests",
    "count",
    "peakMemoryUsage",
    "intermediateCommits",
    "fullCount",
];

impl ExecutionStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn counter_mut(&mut self, key: &str) -> Option<&mut u64> {
        Some(match key {
            "writesExecuted" => &mut self.writes_executed,
            "writesIgnored" => &mut self.writes_ignored,
            "scannedFull" => &mut self.scanned_full,
            "scannedIndex" => &mut self.scanned_index,
            "cursorsCreated" => &mut self.cursors_created,
            "cursorsRearmed" => &mut self.cursors_rearmed,
            "cacheHits" => &mut self.cache_hits,
            "cacheMisses" => &mut self.cache_misses,
            "filtered" => &mut self.filtered,
            "requests" => &mut self.requests,
            "count" => &mut self.count,
            "peakMemoryUsage" => &mut self.peak_memory_usage,
            "intermediateCommits" => &mut self.intermediate_commits,
            "fullCount" => &mut self.full_count,
            _ => return None,
        })
    }

    /// Merge another set of statistics into this one
    ///
    /// `execution_time` is not summed: every level measures its own total
    /// wall-clock time once execution ends.
    pub fn add(&mut self, summand: &ExecutionStats) {
        self.writes_executed += summand.writes_executed;
        self.writes_ignored += summand.writes_ignored;
        self.scanned_full += summand.scanned_full;
        self.scanned_index += summand.scanned_index;
        self.cursors_created += summand.cursors_created;
        self.cursors_rearmed += summand.cursors_rearmed;
        self.cache_hits += summand.cache_hits;
        self.cache_misses += summand.cache_misses;
        self.filtered += summand.filtered;
        self.requests += summand.requests;
        // 0 means "not tracked" on the summand's side
        if summand.full_count > 0 {
            self.full_count += summand.full_count;
        }
        self.count += summand.count;
        self.intermediate_commits += summand.intermediate_commits;
        self.set_peak_memory_usage(summand.peak_memory_usage);

        for (id, stats) in &summand.nodes {
            self.add_node(*id, stats);
        }
    }

    /// Accumulate the stats of one node, honoring aliases
    pub fn add_node(&mut self, id: ExecutionNodeId, stats: &ExecutionNodeStats) {
        let id = match self.node_aliases.get(&id) {
            Some(alias) if alias.is_internal() => return,
            Some(alias) => *alias,
            None => id,
        };
        self.nodes
            .entry(id)
            .and_modify(|existing| *existing += stats)
            .or_insert_with(|| stats.clone());
    }

    /// Report node `id` under `alias`, or drop it if `alias` is the
    /// internal-node sentinel
    pub fn add_alias(&mut self, id: ExecutionNodeId, alias: ExecutionNodeId) {
        self.node_aliases.insert(id, alias);
    }

    /// Raise the peak memory usage; lower values are ignored
    pub fn set_peak_memory_usage(&mut self, value: u64) {
        if value > self.peak_memory_usage {
            self.peak_memory_usage = value;
        }
    }

    pub fn set_execution_time(&mut self, seconds: f64) {
        self.execution_time = seconds;
    }

    pub fn nodes(&self) -> &HashMap<ExecutionNodeId, ExecutionNodeStats> {
        &self.nodes
    }

    pub fn node(&self, id: ExecutionNodeId) -> Option<&ExecutionNodeStats> {
        self.nodes.get(&id)
    }

    /// Reset all counters for re-execution; aliases belong to the plan and
    /// are kept
    pub fn clear(&mut self) {
        let aliases = std::mem::take(&mut self.node_aliases);
        *self = ExecutionStats {
            node_aliases: aliases,
            ..ExecutionStats::default()
        };
    }

    /// Encode as wire object
    ///
    /// `fullCount` is only emitted when the query asked for it and then never
    /// reports less than `count`.
    pub fn to_wire(&self, report_full_count: bool) -> JsonValue {
        let mut object = Map::new();
        object.insert("writesExecuted".into(), self.writes_executed.into());
        object.insert("writesIgnored".into(), self.writes_ignored.into());
        object.insert("scannedFull".into(), self.scanned_full.into());
        object.insert("scannedIndex".into(), self.scanned_index.into());
        object.insert("cursorsCreated".into(), self.cursors_created.into());
        object.insert("cursorsRearmed".into(), self.cursors_rearmed.into());
        object.insert("cacheHits".into(), self.cache_hits.into());
        object.insert("cacheMisses".into(), self.cache_misses.into());
        object.insert("filtered".into(), self.filtered.into());
        object.insert("requests".into(), self.requests.into());
        object.insert("count".into(), self.count.into());
        object.insert("executionTime".into(), self.execution_time.into());
        object.insert("peakMemoryUsage".into(), self.peak_memory_usage.into());
        object.insert("intermediateCommits".into(), self.intermediate_commits.into());
        if report_full_count {
            object.insert("fullCount".into(), self.full_count.max(self.count).into());
        }

        if !self.nodes.is_empty() {
            let mut ids: Vec<_> = self.nodes.keys().copied().collect();
            ids.sort();
            let nodes: Vec<JsonValue> = ids
                .into_iter()
                .map(|id| {
                    let stats = &self.nodes[&id];
                    serde_json::json!({
                        "id": id.0,
                        "calls": stats.calls,
                        "items": stats.items,
                        "filtered": stats.filtered,
                        "runtime": stats.runtime,
                    })
                })
                .collect();
            object.insert("nodes".into(), JsonValue::Array(nodes));
        }

        JsonValue::Object(object)
    }

    /// Decode from wire object
    ///
    /// Every counter is optional so that older peers can still report.
    pub fn from_wire(slice: &JsonValue) -> Result<Self, ExecutionError> {
        let object = slice.as_object().ok_or_else(|| {
            ExecutionError::Internal(format!(
                "expecting execution stats to be an object, got {}",
                json_type_name(slice)
            ))
        })?;

        let mut stats = ExecutionStats::default();
        for key in SCALAR_KEYS {
            if let Some(value) = object.get(key) {
                let n = value
                    .as_u64()
                    .ok_or_else(|| ExecutionError::type_mismatch(key, "a non-negative integer"))?;
                if let Some(counter) = stats.counter_mut(key) {
                    *counter = n;
                }
            }
        }
        if !object.contains_key("fullCount") {
            stats.full_count = stats.count;
        }
        if let Some(value) = object.get("executionTime") {
            stats.execution_time = value
                .as_f64()
                .ok_or_else(|| ExecutionError::type_mismatch("executionTime", "a number"))?;
        }

        if let Some(nodes) = object.get("nodes") {
            let nodes = nodes
                .as_array()
                .ok_or_else(|| ExecutionError::type_mismatch("nodes", "an array"))?;
            for node in nodes {
                let (id, node_stats) = node_from_wire(node)?;
                stats.nodes.insert(id, node_stats);
            }
        }

        Ok(stats)
    }
}

fn node_from_wire(node: &JsonValue) -> Result<(ExecutionNodeId, ExecutionNodeStats), ExecutionError> {
    let object = node
        .as_object()
        .ok_or_else(|| ExecutionError::type_mismatch("nodes", "an array of objects"))?;
    let id = object
        .get("id")
        .and_then(JsonValue::as_u64)
        .ok_or_else(|| ExecutionError::type_mismatch("nodes[].id", "a node id"))?;
    let counter = |key: &str| object.get(key).and_then(JsonValue::as_u64).unwrap_or(0);

    Ok((
        ExecutionNodeId(id),
        ExecutionNodeStats {
            calls: counter("calls"),
            items: counter("items"),
            filtered: counter("filtered"),
            runtime: object.get("runtime").and_then(JsonValue::as_f64).unwrap_or(0.0),
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node(calls: u64, items: u64) -> ExecutionNodeStats {
        ExecutionNodeStats {
            calls,
            items,
            filtered: 0,
            runtime: 0.5,
        }
    }

    #[test]
    fn test_add_sums_counters() {
        let mut a = ExecutionStats::new();
        a.scanned_full = 10;
        a.filtered = 2;
        let mut b = ExecutionStats::new();
        b.scanned_full = 5;
        b.scanned_index = 7;
        b.requests = 1;

        a.add(&b);
        assert_eq!(a.scanned_full, 15);
        assert_eq!(a.scanned_index, 7);
        assert_eq!(a.filtered, 2);
        assert_eq!(a.requests, 1);
    }

    #[test]
    fn test_peak_memory_takes_max() {
        let mut a = ExecutionStats::new();
        a.peak_memory_usage = 100;
        let mut b = ExecutionStats::new();
        b.peak_memory_usage = 40;
        a.add(&b);
        assert_eq!(a.peak_memory_usage, 100);

        b.peak_memory_usage = 400;
        a.add(&b);
        assert_eq!(a.peak_memory_usage, 400);

        a.set_peak_memory_usage(10);
        assert_eq!(a.peak_memory_usage, 400);
    }

    #[test]
    fn test_zero_full_count_is_not_tracked() {
        let mut a = ExecutionStats::new();
        a.count = 5;
        let mut b = ExecutionStats::new();
        b.count = 5;

        a.add(&b);
        assert_eq!(a.full_count, 0);
        assert_eq!(a.count, 10);

        let mut single = ExecutionStats::new();
        single.count = 5;
        assert_eq!(single.to_wire(true)["fullCount"], json!(5));
        assert!(single.to_wire(false).get("fullCount").is_none());

        let mut counted = ExecutionStats::new();
        counted.full_count = 3;
        a.add(&counted);
        assert_eq!(a.full_count, 3);
    }

    #[test]
    fn test_execution_time_is_not_summed() {
        let mut a = ExecutionStats::new();
        a.set_execution_time(1.5);
        let mut b = ExecutionStats::new();
        b.set_execution_time(2.0);
        a.add(&b);
        assert_eq!(a.execution_time, 1.5);
    }

    #[test]
    fn test_nodes_merge_by_id() {
        let mut a = ExecutionStats::new();
        a.add_node(ExecutionNodeId(1), &node(1, 10));
        let mut b = ExecutionStats::new();
        b.add_node(ExecutionNodeId(1), &node(2, 5));
        b.add_node(ExecutionNodeId(2), &node(1, 1));

        a.add(&b);
        let merged = a.node(ExecutionNodeId(1)).unwrap();
        assert_eq!(merged.calls, 3);
        assert_eq!(merged.items, 15);
        assert_eq!(merged.runtime, 1.0);
        assert_eq!(a.node(ExecutionNodeId(2)).unwrap().items, 1);
    }

    #[test]
    fn test_aliases_fold_and_drop_nodes() {
        let mut stats = ExecutionStats::new();
        stats.add_alias(ExecutionNodeId(7), ExecutionNodeId(3));
        stats.add_alias(ExecutionNodeId(8), ExecutionNodeId::INTERNAL_NODE);

        stats.add_node(ExecutionNodeId(3), &node(1, 1));
        stats.add_node(ExecutionNodeId(7), &node(1, 4));
        stats.add_node(ExecutionNodeId(8), &node(1, 9));

        assert_eq!(stats.nodes().len(), 1);
        assert_eq!(stats.node(ExecutionNodeId(3)).unwrap().items, 5);

        let mut remote = ExecutionStats::new();
        remote.add_node(ExecutionNodeId(8), &node(2, 2));
        stats.add(&remote);
        assert!(stats.node(ExecutionNodeId(8)).is_none());
    }

    #[test]
    fn test_wire_round_trip() {
        let mut stats = ExecutionStats::new();
        stats.scanned_full = 12;
        stats.filtered = 3;
        stats.count = 4;
        stats.full_count = 9;
        stats.peak_memory_usage = 2048;
        stats.set_execution_time(0.25);
        stats.add_node(ExecutionNodeId(2), &node(3, 12));

        let wire = stats.to_wire(true);
        assert_eq!(wire["nodes"][0]["id"], json!(2));

        let decoded = ExecutionStats::from_wire(&wire).unwrap();
        assert_eq!(decoded.scanned_full, 12);
        assert_eq!(decoded.filtered, 3);
        assert_eq!(decoded.full_count, 9);
        assert_eq!(decoded.peak_memory_usage, 2048);
        assert_eq!(decoded.execution_time, 0.25);
        assert_eq!(decoded.node(ExecutionNodeId(2)), Some(&node(3, 12)));
    }

    #[test]
    fn test_nodes_omitted_when_empty() {
        let wire = ExecutionStats::new().to_wire(false);
        assert!(wire.get("nodes").is_none());
        assert_eq!(wire["scannedFull"], json!(0));
    }

    #[test]
    fn test_from_wire_defaults() {
        let decoded = ExecutionStats::from_wire(&json!({
            "scannedFull": 4,
            "count": 6,
            "nodes": [{"id": 1, "calls": 2, "items": 3, "runtime": 0.1}]
        }))
        .unwrap();
        assert_eq!(decoded.cursors_created, 0);
        assert_eq!(decoded.cache_hits, 0);
        assert_eq!(decoded.full_count, 6);
        assert_eq!(decoded.node(ExecutionNodeId(1)).unwrap().filtered, 0);
    }

    #[test]
    fn test_from_wire_rejects_non_object() {
        let err = ExecutionStats::from_wire(&json!("stats")).unwrap_err();
        assert!(matches!(err, ExecutionError::Internal(_)));
    }

    #[test]
    fn test_clear_keeps_aliases() {
        let mut stats = ExecutionStats::new();
        stats.add_alias(ExecutionNodeId(5), ExecutionNodeId::INTERNAL_NODE);
        stats.scanned_full = 3;
        stats.add_node(ExecutionNodeId(1), &node(1, 1));

        stats.clear();
        assert_eq!(stats.scanned_full, 0);
        assert!(stats.nodes().is_empty());

        stats.add_node(ExecutionNodeId(5), &node(1, 1));
        assert!(stats.nodes().is_empty());
    }
}
