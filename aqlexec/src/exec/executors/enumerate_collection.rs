// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Full collection scan

use super::{skip_amount, ProduceResult, SkipResult};
use crate::exec::block::ExecutorState;
use crate::exec::call::AqlCall;
use crate::exec::context::QueryContext;
use crate::exec::error::ExecutionError;
use crate::exec::item_block::OutputRows;
use crate::exec::projections::Projections;
use crate::exec::stats::ExecutionStats;
use crate::storage::CollectionReader;
use std::sync::Arc;

/// Reads every document of a collection in storage order
///
/// Emits one register per row: the document, or its projection when
/// projections are set.
pub struct EnumerateCollectionExecutor {
    collection: Arc<dyn CollectionReader>,
    projections: Option<Projections>,
    position: usize,
}

impl std::fmt::Debug for EnumerateCollectionExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnumerateCollectionExecutor")
            .field("collection", &self.collection.name())
            .field("projections", &self.projections)
            .field("position", &self.position)
            .finish()
    }
}

impl EnumerateCollectionExecutor {
    pub fn new(collection: Arc<dyn CollectionReader>, projections: Option<Projections>) -> Self {
        Self {
            collection,
            projections: projections.filter(|p| !p.is_empty()),
            position: 0,
        }
    }

    fn state(&self) -> ExecutorState {
        if self.position >= self.collection.count() {
            ExecutorState::Done
        } else {
            ExecutorState::HasMore
        }
    }

    pub fn produce_rows(
        &mut self,
        output: &mut OutputRows,
        ctx: &QueryContext,
        stats: &mut ExecutionStats,
    ) -> ProduceResult {
        while !output.is_full() && self.position < self.collection.count() {
            let document = self.collection.document_at(self.position)?.ok_or_else(|| {
                ExecutionError::Storage(format!(
                    "document {} of collection '{}' vanished during scan",
                    self.position,
                    self.collection.name()
                ))
            })?;
            self.position += 1;
            stats.scanned_full += 1;

            let value = match &self.projections {
                Some(projections) => projections.project(&document, ctx.resolver())?,
                None => document,
            };
            output.add_row(vec![value])?;
        }
        Ok((self.state(), AqlCall::new()))
    }

    pub fn skip_rows_range(&mut self, call: &mut AqlCall, stats: &mut ExecutionStats) -> SkipResult {
        let remaining = self.collection.count().saturating_sub(self.position);
        let skipped = skip_amount(call, remaining);
        self.position += skipped;
        stats.scanned_full += skipped as u64;
        call.did_skip(skipped);
        Ok((self.state(), skipped, AqlCall::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueryOptions;
    use crate::exec::call::LimitType;
    use crate::exec::resource_monitor::ResourceMonitor;
    use crate::storage::{MemoryCollection, Value};
    use serde_json::json;

    fn collection() -> Arc<dyn CollectionReader> {
        let docs: Vec<_> = (0..5).map(|i| json!({"n": i, "extra": "x"})).collect();
        Arc::new(MemoryCollection::new(1, "c", &docs).unwrap())
    }

    #[test]
    fn test_produce_with_projection() {
        let ctx = QueryContext::new(QueryOptions::default());
        let projections = Projections::from_dotted(&["n"]).unwrap();
        let mut executor = EnumerateCollectionExecutor::new(collection(), Some(projections));
        let mut stats = ExecutionStats::new();
        let mut output = OutputRows::new(Arc::new(ResourceMonitor::unlimited()), AqlCall::simulate_get_some(2), 100);

        let (state, _) = executor.produce_rows(&mut output, &ctx, &mut stats).unwrap();
        assert_eq!(state, ExecutorState::HasMore);
        assert_eq!(stats.scanned_full, 2);

        let block = output.into_block();
        assert_eq!(block.rows()[1][0], Value::from_json(&json!({"n": 1})));
    }

    #[test]
    fn test_skip_and_count() {
        let mut executor = EnumerateCollectionExecutor::new(collection(), None);
        let mut stats = ExecutionStats::new();

        let mut call = AqlCall::with_limit(2, 1, LimitType::Soft, false);
        let (state, skipped, _) = executor.skip_rows_range(&mut call, &mut stats).unwrap();
        assert_eq!((state, skipped), (ExecutorState::HasMore, 2));
        assert_eq!(call.get_offset(), 0);

        let mut counting = AqlCall::full_count_only();
        let (state, skipped, _) = executor.skip_rows_range(&mut counting, &mut stats).unwrap();
        assert_eq!((state, skipped), (ExecutorState::Done, 3));
        assert_eq!(stats.scanned_full, 5);
    }
}
