// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Drops rows whose condition is not truthy

use super::{input_state, ProduceResult, SkipResult};
use crate::exec::call::AqlCall;
use crate::exec::expression::Expression;
use crate::exec::item_block::{DataRange, OutputRows};
use crate::exec::stats::ExecutionStats;

#[derive(Debug)]
pub struct FilterExecutor {
    condition: Expression,
}

impl FilterExecutor {
    pub fn new(condition: Expression) -> Self {
        Self { condition }
    }

    pub fn produce_rows(
        &mut self,
        input: &mut DataRange,
        output: &mut OutputRows,
        stats: &mut ExecutionStats,
    ) -> ProduceResult {
        while !output.is_full() {
            let Some(row) = input.next_data_row() else {
                break;
            };
            if self.condition.evaluate(&row)?.is_truthy() {
                output.add_row(row)?;
            } else {
                stats.filtered += 1;
            }
        }
        // Upstream cannot skip on our behalf: its rows are not filtered yet.
        Ok((input_state(input), AqlCall::new()))
    }

    pub fn skip_rows_range(
        &mut self,
        input: &mut DataRange,
        call: &mut AqlCall,
        stats: &mut ExecutionStats,
    ) -> SkipResult {
        let mut skipped = 0;
        while call.need_skip_more() {
            let Some(row) = input.next_data_row() else {
                break;
            };
            if self.condition.evaluate(&row)?.is_truthy() {
                call.did_skip(1);
                skipped += 1;
            } else {
                stats.filtered += 1;
            }
        }
        Ok((input_state(input), skipped, AqlCall::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::block::{ExecutionState, ExecutorState};
    use crate::exec::expression::CompareOp;
    use crate::exec::item_block::AqlItemBlock;
    use crate::exec::resource_monitor::ResourceMonitor;
    use crate::storage::Value;
    use std::sync::Arc;

    fn even() -> FilterExecutor {
        FilterExecutor::new(Expression::compare(
            CompareOp::Eq,
            Expression::arithmetic(
                crate::exec::expression::ArithmeticOp::Mod,
                Expression::register(0),
                Expression::constant(2i64),
            ),
            Expression::constant(0i64),
        ))
    }

    fn input(state: ExecutionState) -> DataRange {
        let monitor = Arc::new(ResourceMonitor::unlimited());
        let rows = (0..10).map(|n| vec![Value::Int(n)]).collect();
        DataRange::new(state, 0, Some(AqlItemBlock::from_rows(monitor, rows).unwrap()))
    }

    #[test]
    fn test_filters_and_counts() {
        let mut input = input(ExecutionState::Done);
        let mut output = OutputRows::new(Arc::new(ResourceMonitor::unlimited()), AqlCall::new(), 100);
        let mut stats = ExecutionStats::new();

        let (state, _) = even().produce_rows(&mut input, &mut output, &mut stats).unwrap();
        assert_eq!(state, ExecutorState::Done);
        assert_eq!(output.num_rows_written(), 5);
        assert_eq!(stats.filtered, 5);
    }

    #[test]
    fn test_skip_counts_only_matches() {
        let mut input = input(ExecutionState::HasMore);
        let mut stats = ExecutionStats::new();
        let mut call = AqlCall::simulate_skip_some(2);

        let (state, skipped, _) = even().skip_rows_range(&mut input, &mut call, &mut stats).unwrap();
        assert_eq!(state, ExecutorState::HasMore);
        assert_eq!(skipped, 2);
        assert_eq!(stats.filtered, 1);
        assert_eq!(input.peek_data_row(), Some(&vec![Value::Int(3)]));
    }
}
