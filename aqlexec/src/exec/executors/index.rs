// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Sorted index range scan

use super::{skip_amount, ProduceResult, SkipResult};
use crate::exec::block::ExecutorState;
use crate::exec::call::AqlCall;
use crate::exec::context::QueryContext;
use crate::exec::error::ExecutionError;
use crate::exec::item_block::OutputRows;
use crate::exec::projections::Projections;
use crate::exec::stats::ExecutionStats;
use crate::storage::{CollectionReader, IndexReader, Value};
use std::ops::Range;
use std::sync::Arc;

/// Scans the entries of an index between inclusive bounds on the first
/// indexed field
///
/// When every projection is covered by the index, rows are built from the
/// index entries alone and the documents are never read.
pub struct IndexExecutor {
    index: Arc<dyn IndexReader>,
    collection: Arc<dyn CollectionReader>,
    lower: Option<Value>,
    upper: Option<Value>,
    projections: Option<Projections>,
    cursor: Option<Range<usize>>,
}

impl std::fmt::Debug for IndexExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexExecutor")
            .field("index", &self.index.name())
            .field("lower", &self.lower)
            .field("upper", &self.upper)
            .field("projections", &self.projections)
            .field("cursor", &self.cursor)
            .finish()
    }
}

impl IndexExecutor {
    pub fn new(
        index: Arc<dyn IndexReader>,
        collection: Arc<dyn CollectionReader>,
        lower: Option<Value>,
        upper: Option<Value>,
        projections: Option<Projections>,
    ) -> Self {
        let projections = projections.filter(|p| !p.is_empty()).map(|mut p| {
            if p.determine_covering_index(index.fields()) {
                log::debug!("index '{}' covers projections", index.name());
            }
            p
        });
        Self {
            index,
            collection,
            lower,
            upper,
            projections,
            cursor: None,
        }
    }

    pub fn uses_covering_index(&self) -> bool {
        self.projections.as_ref().is_some_and(Projections::uses_covering_index)
    }

    fn cursor(&mut self, stats: &mut ExecutionStats) -> Result<&mut Range<usize>, ExecutionError> {
        if self.cursor.is_none() {
            let range = self.index.range(self.lower.as_ref(), self.upper.as_ref())?;
            stats.cursors_created += 1;
            self.cursor = Some(range);
        }
        self.cursor
            .as_mut()
            .ok_or_else(|| ExecutionError::Internal("index cursor not initialized".to_string()))
    }

    fn state(&self) -> ExecutorState {
        match &self.cursor {
            Some(range) if range.is_empty() => ExecutorState::Done,
            _ => ExecutorState::HasMore,
        }
    }

    pub fn produce_rows(
        &mut self,
        output: &mut OutputRows,
        ctx: &QueryContext,
        stats: &mut ExecutionStats,
    ) -> ProduceResult {
        self.cursor(stats)?;
        while !output.is_full() {
            let Some(position) = self.cursor.as_mut().and_then(Iterator::next) else {
                break;
            };
            let entry = self.index.entry_at(position)?.ok_or_else(|| {
                ExecutionError::Storage(format!(
                    "entry {} missing from index '{}'",
                    position,
                    self.index.name()
                ))
            })?;
            stats.scanned_index += 1;

            let value = match &self.projections {
                Some(projections) if projections.uses_covering_index() => {
                    projections.project_index_entry(&entry, ctx.resolver())?
                }
                projections => {
                    let Some(document) = self.collection.document_by_key(&entry.document_key)? else {
                        log::warn!(
                            "index '{}' references missing document '{}'",
                            self.index.name(),
                            entry.document_key
                        );
                        continue;
                    };
                    match projections {
                        Some(projections) => projections.project(&document, ctx.resolver())?,
                        None => document,
                    }
                }
            };
            output.add_row(vec![value])?;
        }
        Ok((self.state(), AqlCall::new()))
    }

    pub fn skip_rows_range(&mut self, call: &mut AqlCall, stats: &mut ExecutionStats) -> SkipResult {
        let cursor = self.cursor(stats)?;
        let skipped = skip_amount(call, cursor.len());
        cursor.start += skipped;
        stats.scanned_index += skipped as u64;
        call.did_skip(skipped);
        Ok((self.state(), skipped, AqlCall::new()))
    }
}
