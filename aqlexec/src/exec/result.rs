// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Query execution results

use crate::config::ProfileLevel;
use crate::exec::stats::ExecutionStats;
use serde_json::{json, Map, Value as JsonValue};
use uuid::Uuid;

/// Rows and statistics of a completed query
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub query_id: Uuid,
    pub rows: Vec<JsonValue>,
    pub stats: ExecutionStats,
    /// Whether fullCount was requested for the query
    pub report_full_count: bool,
    pub profile: ProfileLevel,
}

impl QueryResult {
    pub fn new(
        query_id: Uuid,
        rows: Vec<JsonValue>,
        stats: ExecutionStats,
        report_full_count: bool,
        profile: ProfileLevel,
    ) -> Self {
        Self {
            query_id,
            rows,
            stats,
            report_full_count,
            profile,
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows the query would have returned without its LIMIT, if requested
    pub fn full_count(&self) -> Option<u64> {
        self.report_full_count
            .then(|| self.stats.full_count.max(self.stats.count))
    }

    /// Cursor-style document: `{"result": [...], "extra": {"stats": {...}}}`
    ///
    /// Per-node statistics appear under `extra.profile` when profiling.
    pub fn to_json(&self) -> JsonValue {
        let mut stats = self.stats.to_wire(self.report_full_count);
        let nodes = stats.as_object_mut().and_then(|s| s.remove("nodes"));

        let mut extra = Map::new();
        extra.insert("stats".to_string(), stats);
        if self.profile.enabled() {
            extra.insert(
                "profile".to_string(),
                json!({
                    "level": self.profile.to_string(),
                    "nodes": nodes.unwrap_or_else(|| json!([])),
                }),
            );
        }

        json!({
            "id": self.query_id.to_string(),
            "result": self.rows,
            "extra": extra,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(report_full_count: bool, profile: ProfileLevel) -> QueryResult {
        let mut stats = ExecutionStats::new();
        stats.count = 2;
        stats.full_count = 7;
        QueryResult::new(
            Uuid::new_v4(),
            vec![json!(1), json!(2)],
            stats,
            report_full_count,
            profile,
        )
    }

    #[test]
    fn test_full_count_only_when_requested() {
        assert_eq!(result(true, ProfileLevel::None).full_count(), Some(7));
        assert_eq!(result(false, ProfileLevel::None).full_count(), None);
    }

    #[test]
    fn test_to_json() {
        let doc = result(true, ProfileLevel::Basic).to_json();
        assert_eq!(doc["result"], json!([1, 2]));
        assert_eq!(doc["extra"]["stats"]["fullCount"], json!(7));
        assert_eq!(doc["extra"]["profile"]["level"], json!("basic"));

        let plain = result(false, ProfileLevel::None).to_json();
        assert!(plain["extra"]["stats"].get("fullCount").is_none());
        assert!(plain["extra"].get("profile").is_none());
    }
}
