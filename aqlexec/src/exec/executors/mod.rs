// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Node executors
//!
//! An executor holds the node-specific logic; the surrounding
//! [`ExecutionBlock`](crate::exec::block::ExecutionBlock) handles calls,
//! batching and upstream traffic. Each step reports the executor's state
//! and the call it wants sent upstream next.
//!
//! Remote and gather executors talk to their dependencies themselves and
//! bypass the block state machine.

pub mod calculation;
pub mod collect;
pub mod enumerate_collection;
pub mod filter;
pub mod gather;
pub mod index;
pub mod limit;
pub mod remote;
pub mod sort;

pub use calculation::CalculationExecutor;
pub use collect::{AggregateFunction, AggregateSpec, CollectExecutor};
pub use enumerate_collection::EnumerateCollectionExecutor;
pub use filter::FilterExecutor;
pub use gather::GatherExecutor;
pub use index::IndexExecutor;
pub use limit::LimitExecutor;
pub use remote::{LocalShard, RemoteExecutor, RemoteResponse, ShardConnection};
pub use sort::{SortExecutor, SortKey};

use crate::exec::block::{BlockResult, ExecutorState};
use crate::exec::call::AqlCall;
use crate::exec::context::QueryContext;
use crate::exec::error::ExecutionError;
use crate::exec::item_block::{DataRange, OutputRows};
use crate::exec::stats::ExecutionStats;
use std::sync::Arc;

/// Result of a produce step: executor state and the next upstream call
pub type ProduceResult = Result<(ExecutorState, AqlCall), ExecutionError>;

/// Result of a skip step: executor state, rows skipped and the next
/// upstream call
pub type SkipResult = Result<(ExecutorState, usize, AqlCall), ExecutionError>;

#[derive(Debug)]
pub enum Executor {
    EnumerateCollection(EnumerateCollectionExecutor),
    Index(IndexExecutor),
    Calculation(CalculationExecutor),
    Filter(FilterExecutor),
    Limit(LimitExecutor),
    Sort(SortExecutor),
    Collect(CollectExecutor),
    Remote(RemoteExecutor),
    Gather(GatherExecutor),
}

impl Executor {
    pub fn node_type(&self) -> &'static str {
        match self {
            Executor::EnumerateCollection(_) => "EnumerateCollectionNode",
            Executor::Index(_) => "IndexNode",
            Executor::Calculation(_) => "CalculationNode",
            Executor::Filter(_) => "FilterNode",
            Executor::Limit(_) => "LimitNode",
            Executor::Sort(_) => "SortNode",
            Executor::Collect(_) => "CollectNode",
            Executor::Remote(_) => "RemoteNode",
            Executor::Gather(_) => "GatherNode",
        }
    }

    /// Whether the executor handles whole calls itself
    pub fn is_self_driven(&self) -> bool {
        matches!(self, Executor::Remote(_) | Executor::Gather(_))
    }

    pub fn execute_self_driven(
        &mut self,
        call: AqlCall,
        ctx: &Arc<QueryContext>,
        stats: &mut ExecutionStats,
    ) -> Result<BlockResult, ExecutionError> {
        match self {
            Executor::Remote(e) => e.execute(call, ctx, stats),
            Executor::Gather(e) => e.execute(call, ctx, stats),
            other => Err(ExecutionError::Internal(format!(
                "{} is driven by its block",
                other.node_type()
            ))),
        }
    }

    pub fn produce_rows(
        &mut self,
        input: &mut DataRange,
        output: &mut OutputRows,
        ctx: &QueryContext,
        stats: &mut ExecutionStats,
    ) -> ProduceResult {
        match self {
            Executor::EnumerateCollection(e) => e.produce_rows(output, ctx, stats),
            Executor::Index(e) => e.produce_rows(output, ctx, stats),
            Executor::Calculation(e) => e.produce_rows(input, output),
            Executor::Filter(e) => e.produce_rows(input, output, stats),
            Executor::Limit(e) => e.produce_rows(input, output, stats),
            Executor::Sort(e) => e.produce_rows(input, output, ctx),
            Executor::Collect(e) => e.produce_rows(input, output, ctx),
            Executor::Remote(_) | Executor::Gather(_) => Err(self_driven(self.node_type())),
        }
    }

    pub fn skip_rows_range(
        &mut self,
        input: &mut DataRange,
        call: &mut AqlCall,
        ctx: &QueryContext,
        stats: &mut ExecutionStats,
    ) -> SkipResult {
        match self {
            Executor::EnumerateCollection(e) => e.skip_rows_range(call, stats),
            Executor::Index(e) => e.skip_rows_range(call, stats),
            Executor::Calculation(e) => e.skip_rows_range(input, call),
            Executor::Filter(e) => e.skip_rows_range(input, call, stats),
            Executor::Limit(e) => e.skip_rows_range(input, call, stats),
            Executor::Sort(e) => e.skip_rows_range(input, call, ctx),
            Executor::Collect(e) => e.skip_rows_range(input, call, ctx),
            Executor::Remote(_) | Executor::Gather(_) => Err(self_driven(self.node_type())),
        }
    }

    /// Statistics of blocks owned by the executor itself
    pub fn collect_dependency_stats(&mut self, into: &mut ExecutionStats) {
        if let Executor::Gather(e) = self {
            e.collect_dependency_stats(into);
        }
    }
}

fn self_driven(node_type: &str) -> ExecutionError {
    ExecutionError::Internal(format!("{} does not run inside the block state machine", node_type))
}

/// Rows to skip from a source for `call`: the offset, or everything left
/// when the call only counts
pub(crate) fn skip_amount(call: &AqlCall, available: usize) -> usize {
    if call.get_limit() == 0 && call.needs_full_count() {
        available
    } else {
        call.get_offset().min(available)
    }
}

/// State of a pass-through executor once its input is drained
pub(crate) fn input_state(input: &DataRange) -> ExecutorState {
    if input.upstream_done() && !input.has_data_row() && input.skipped_in_flight() == 0 {
        ExecutorState::Done
    } else {
        ExecutorState::HasMore
    }
}

/// Upstream call of a stateless executor that maps rows one to one
pub(crate) fn pass_through_skip_call(call: &AqlCall) -> AqlCall {
    if call.get_offset() > 0 {
        AqlCall::simulate_skip_some(call.get_offset())
    } else if call.get_limit() == 0 && call.needs_full_count() {
        AqlCall::full_count_only()
    } else {
        AqlCall::new()
    }
}
