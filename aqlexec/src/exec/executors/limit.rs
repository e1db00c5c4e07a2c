// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! LIMIT offset, count

use super::{ProduceResult, SkipResult};
use crate::exec::block::ExecutorState;
use crate::exec::call::{AqlCall, LimitType};
use crate::exec::item_block::{DataRange, OutputRows};
use crate::exec::stats::ExecutionStats;

/// Passes through `limit` rows after dropping `offset` rows
///
/// With `full_count` set, every row reaching the node is counted into the
/// query's fullCount statistic, including rows past the limit.
#[derive(Debug)]
pub struct LimitExecutor {
    offset_left: usize,
    limit_left: usize,
    full_count: bool,
}

impl LimitExecutor {
    pub fn new(offset: usize, limit: usize, full_count: bool) -> Self {
        Self {
            offset_left: offset,
            limit_left: limit,
            full_count,
        }
    }

    fn count(&self, rows: usize, stats: &mut ExecutionStats) {
        if self.full_count {
            stats.full_count += rows as u64;
        }
    }

    /// Account rows skipped upstream: first our offset, then rows within
    /// our limit. Returns the rows within the limit, which the client sees
    /// as skipped; the rest lie beyond the limit and are only counted.
    fn consume_upstream_skipped(&mut self, skipped: usize, stats: &mut ExecutionStats) -> usize {
        self.count(skipped, stats);
        let from_offset = skipped.min(self.offset_left);
        self.offset_left -= from_offset;
        let visible = (skipped - from_offset).min(self.limit_left);
        self.limit_left -= visible;
        visible
    }

    fn drop_offset(&mut self, input: &mut DataRange, stats: &mut ExecutionStats) {
        while self.offset_left > 0 && input.next_data_row().is_some() {
            self.offset_left -= 1;
            self.count(1, stats);
        }
    }

    fn count_remaining(&mut self, input: &mut DataRange, stats: &mut ExecutionStats) {
        if self.limit_left == 0 && self.full_count {
            let rows = input.skip_all_remaining_data_rows();
            self.count(rows, stats);
        }
    }

    fn state(&self, input: &DataRange) -> ExecutorState {
        let limit_reached = self.limit_left == 0 && !self.full_count;
        let input_done = input.upstream_done() && !input.has_data_row() && input.skipped_in_flight() == 0;
        if limit_reached || input_done {
            ExecutorState::Done
        } else {
            ExecutorState::HasMore
        }
    }

    pub fn produce_rows(
        &mut self,
        input: &mut DataRange,
        output: &mut OutputRows,
        stats: &mut ExecutionStats,
    ) -> ProduceResult {
        let skipped = input.take_skipped();
        let visible = self.consume_upstream_skipped(skipped, stats);
        debug_assert_eq!(visible, 0, "upstream skipped rows meant to be produced");

        self.drop_offset(input, stats);
        while self.limit_left > 0 && !output.is_full() {
            let Some(row) = input.next_data_row() else {
                break;
            };
            output.add_row(row)?;
            self.limit_left -= 1;
            self.count(1, stats);
        }
        self.count_remaining(input, stats);

        let upstream = if self.limit_left == 0 {
            AqlCall::full_count_only()
        } else {
            let wanted = self.limit_left.min(output.num_rows_left());
            AqlCall::with_limit(self.offset_left, wanted, LimitType::Soft, false)
        };
        Ok((self.state(input), upstream))
    }

    pub fn skip_rows_range(
        &mut self,
        input: &mut DataRange,
        call: &mut AqlCall,
        stats: &mut ExecutionStats,
    ) -> SkipResult {
        let skipped = input.take_skipped();
        let mut visible = self.consume_upstream_skipped(skipped, stats);
        call.did_skip(visible);

        self.drop_offset(input, stats);
        while call.need_skip_more() && self.limit_left > 0 && input.next_data_row().is_some() {
            self.limit_left -= 1;
            self.count(1, stats);
            call.did_skip(1);
            visible += 1;
        }
        self.count_remaining(input, stats);

        let upstream = if self.limit_left == 0 {
            AqlCall::full_count_only()
        } else if call.get_offset() > 0 {
            AqlCall::simulate_skip_some(self.offset_left + call.get_offset().min(self.limit_left))
        } else {
            AqlCall::simulate_skip_some(self.offset_left + self.limit_left)
        };
        Ok((self.state(input), visible, upstream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::block::ExecutionState;
    use crate::exec::item_block::AqlItemBlock;
    use crate::exec::resource_monitor::ResourceMonitor;
    use crate::storage::Value;
    use std::sync::Arc;

    fn input(state: ExecutionState, skipped: usize, rows: std::ops::Range<i64>) -> DataRange {
        let monitor = Arc::new(ResourceMonitor::unlimited());
        let rows = rows.map(|n| vec![Value::Int(n)]).collect();
        DataRange::new(state, skipped, Some(AqlItemBlock::from_rows(monitor, rows).unwrap()))
    }

    fn output(call: AqlCall) -> OutputRows {
        OutputRows::new(Arc::new(ResourceMonitor::unlimited()), call, 100)
    }

    #[test]
    fn test_offset_and_limit() {
        let mut executor = LimitExecutor::new(2, 3, false);
        let mut input = input(ExecutionState::HasMore, 0, 0..10);
        let mut output = output(AqlCall::new());
        let mut stats = ExecutionStats::new();

        let (state, upstream) = executor.produce_rows(&mut input, &mut output, &mut stats).unwrap();
        assert_eq!(state, ExecutorState::Done);
        assert_eq!(upstream, AqlCall::full_count_only());
        let rows = output.into_block().into_rows();
        assert_eq!(rows, vec![vec![Value::Int(2)], vec![Value::Int(3)], vec![Value::Int(4)]]);
        assert_eq!(stats.full_count, 0);
    }

    #[test]
    fn test_upstream_request_carries_offset() {
        let mut executor = LimitExecutor::new(5, 3, false);
        let mut input = DataRange::initial();
        let mut output = output(AqlCall::new());
        let mut stats = ExecutionStats::new();

        let (state, upstream) = executor.produce_rows(&mut input, &mut output, &mut stats).unwrap();
        assert_eq!(state, ExecutorState::HasMore);
        assert_eq!(upstream, AqlCall::with_limit(5, 3, LimitType::Soft, false));
    }

    #[test]
    fn test_full_count_counts_past_limit() {
        let mut executor = LimitExecutor::new(1, 2, true);
        let mut stats = ExecutionStats::new();

        let mut first = input(ExecutionState::HasMore, 1, 0..4);
        let mut out = output(AqlCall::new());
        let (state, upstream) = executor.produce_rows(&mut first, &mut out, &mut stats).unwrap();
        assert_eq!(state, ExecutorState::HasMore);
        assert_eq!(upstream, AqlCall::full_count_only());
        assert_eq!(out.num_rows_written(), 2);

        let mut counted = DataRange::new(ExecutionState::Done, 6, None);
        let (state, _) = executor.produce_rows(&mut counted, &mut out, &mut stats).unwrap();
        assert_eq!(state, ExecutorState::Done);
        assert_eq!(stats.full_count, 11);
    }

    #[test]
    fn test_skip_within_limit() {
        let mut executor = LimitExecutor::new(1, 4, false);
        let mut input = input(ExecutionState::HasMore, 0, 0..10);
        let mut call = AqlCall::with_limit(2, 1, LimitType::Soft, false);
        let mut stats = ExecutionStats::new();

        let (state, skipped, _) = executor.skip_rows_range(&mut input, &mut call, &mut stats).unwrap();
        assert_eq!(state, ExecutorState::HasMore);
        assert_eq!(skipped, 2);
        assert_eq!(call.get_offset(), 0);
        assert_eq!(input.peek_data_row(), Some(&vec![Value::Int(3)]));
    }
}
