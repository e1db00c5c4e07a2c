// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Materializing sort

use super::{skip_amount, ProduceResult, SkipResult};
use crate::exec::block::ExecutorState;
use crate::exec::call::AqlCall;
use crate::exec::context::QueryContext;
use crate::exec::error::ExecutionError;
use crate::exec::expression::Expression;
use crate::exec::item_block::{row_memory, DataRange, OutputRows, Row};
use crate::exec::resource_monitor::ResourceUsageScope;
use crate::storage::Value;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::VecDeque;

fn default_ascending() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortKey {
    pub expression: Expression,
    #[serde(default = "default_ascending")]
    pub ascending: bool,
}

impl SortKey {
    pub fn ascending(expression: Expression) -> Self {
        Self {
            expression,
            ascending: true,
        }
    }

    pub fn descending(expression: Expression) -> Self {
        Self {
            expression,
            ascending: false,
        }
    }
}

/// Buffers all input, then emits it ordered by the sort keys
///
/// The sort is stable. Buffered rows are accounted against the query's
/// memory limit until they are handed downstream.
#[derive(Debug)]
pub struct SortExecutor {
    keys: Vec<SortKey>,
    buffer: Vec<(Vec<Value>, Row)>,
    sorted: Option<VecDeque<Row>>,
    memory: Option<ResourceUsageScope>,
}

impl SortExecutor {
    pub fn new(keys: Vec<SortKey>) -> Self {
        Self {
            keys,
            buffer: Vec::new(),
            sorted: None,
            memory: None,
        }
    }

    fn compare(&self, a: &[Value], b: &[Value]) -> Ordering {
        for (key, (left, right)) in self.keys.iter().zip(a.iter().zip(b)) {
            let ordering = left.aql_compare(right);
            let ordering = if key.ascending { ordering } else { ordering.reverse() };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }

    /// Buffer input rows; sorts once upstream is exhausted. Returns true
    /// when sorted rows are available.
    fn fetch_all(&mut self, input: &mut DataRange, ctx: &QueryContext) -> Result<bool, ExecutionError> {
        if self.sorted.is_some() {
            return Ok(true);
        }
        let memory = self
            .memory
            .get_or_insert_with(|| ResourceUsageScope::new(ctx.monitor().clone()));
        while let Some(row) = input.next_data_row() {
            memory.increase(row_memory(&row))?;
            let values = self
                .keys
                .iter()
                .map(|key| key.expression.evaluate(&row))
                .collect::<Result<Vec<_>, _>>()?;
            self.buffer.push((values, row));
        }
        if !input.upstream_done() {
            return Ok(false);
        }

        let mut buffer = std::mem::take(&mut self.buffer);
        buffer.sort_by(|(a, _), (b, _)| self.compare(a, b));
        log::debug!("sorted {} rows", buffer.len());
        self.sorted = Some(buffer.into_iter().map(|(_, row)| row).collect());
        Ok(true)
    }

    fn pop(&mut self) -> Option<Row> {
        let row = self.sorted.as_mut()?.pop_front()?;
        if let Some(memory) = self.memory.as_mut() {
            memory.decrease(row_memory(&row));
        }
        Some(row)
    }

    fn state(&self) -> ExecutorState {
        match &self.sorted {
            Some(rows) if rows.is_empty() => ExecutorState::Done,
            _ => ExecutorState::HasMore,
        }
    }

    pub fn produce_rows(
        &mut self,
        input: &mut DataRange,
        output: &mut OutputRows,
        ctx: &QueryContext,
    ) -> ProduceResult {
        if self.fetch_all(input, ctx)? {
            while !output.is_full() {
                let Some(row) = self.pop() else {
                    break;
                };
                output.add_row(row)?;
            }
        }
        Ok((self.state(), AqlCall::new()))
    }

    pub fn skip_rows_range(
        &mut self,
        input: &mut DataRange,
        call: &mut AqlCall,
        ctx: &QueryContext,
    ) -> SkipResult {
        let mut skipped = 0;
        if self.fetch_all(input, ctx)? {
            let available = self.sorted.as_ref().map_or(0, VecDeque::len);
            skipped = skip_amount(call, available);
            for _ in 0..skipped {
                self.pop();
            }
            call.did_skip(skipped);
        }
        Ok((self.state(), skipped, AqlCall::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueryOptions;
    use crate::exec::block::ExecutionState;
    use crate::exec::item_block::AqlItemBlock;
    use std::sync::Arc;

    fn rows(values: &[(i64, &str)]) -> Vec<Row> {
        values
            .iter()
            .map(|&(n, s)| vec![Value::Int(n), Value::from(s)])
            .collect()
    }

    fn input(ctx: &QueryContext, state: ExecutionState, values: &[(i64, &str)]) -> DataRange {
        let block = AqlItemBlock::from_rows(Arc::clone(ctx.monitor()), rows(values)).unwrap();
        DataRange::new(state, 0, Some(block))
    }

    #[test]
    fn test_sorts_after_upstream_done() {
        let ctx = QueryContext::new(QueryOptions::default());
        let mut executor = SortExecutor::new(vec![
            SortKey::descending(Expression::register(0)),
            SortKey::ascending(Expression::register(1)),
        ]);
        let mut out = OutputRows::new(Arc::clone(ctx.monitor()), AqlCall::new(), 100);

        let mut first = input(&ctx, ExecutionState::HasMore, &[(1, "b"), (2, "z")]);
        let (state, _) = executor.produce_rows(&mut first, &mut out, &ctx).unwrap();
        assert_eq!(state, ExecutorState::HasMore);
        assert_eq!(out.num_rows_written(), 0);

        let mut second = input(&ctx, ExecutionState::Done, &[(2, "a"), (1, "a")]);
        let (state, _) = executor.produce_rows(&mut second, &mut out, &ctx).unwrap();
        assert_eq!(state, ExecutorState::Done);
        assert_eq!(
            out.into_block().into_rows(),
            rows(&[(2, "a"), (2, "z"), (1, "a"), (1, "b")])
        );
    }

    #[test]
    fn test_skip_from_buffer() {
        let ctx = QueryContext::new(QueryOptions::default());
        let mut executor = SortExecutor::new(vec![SortKey::ascending(Expression::register(0))]);
        let mut input = input(&ctx, ExecutionState::Done, &[(3, "c"), (1, "a"), (2, "b")]);

        let mut call = AqlCall::simulate_skip_some(2);
        let (state, skipped, _) = executor.skip_rows_range(&mut input, &mut call, &ctx).unwrap();
        assert_eq!((state, skipped), (ExecutorState::HasMore, 2));
        assert_eq!(executor.pop(), Some(rows(&[(3, "c")]).remove(0)));
    }

    #[test]
    fn test_memory_limit() {
        let ctx = QueryContext::new(QueryOptions::memory_constrained(64));
        let mut executor = SortExecutor::new(vec![SortKey::ascending(Expression::register(0))]);
        let monitor = Arc::new(crate::exec::resource_monitor::ResourceMonitor::unlimited());
        let block = AqlItemBlock::from_rows(monitor, rows(&[(1, "a"), (2, "b"), (3, "c")])).unwrap();
        let mut input = DataRange::new(ExecutionState::Done, 0, Some(block));
        let mut out = OutputRows::new(Arc::clone(ctx.monitor()), AqlCall::new(), 100);

        let err = executor.produce_rows(&mut input, &mut out, &ctx).unwrap_err();
        assert!(matches!(err, ExecutionError::ResourceLimit { .. }));
    }
}
