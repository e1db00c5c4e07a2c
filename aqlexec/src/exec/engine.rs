// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Execution engine: instantiates a plan and drives its root block

use crate::exec::block::{BlockResult, ExecutionBlock, ExecutionState};
use crate::exec::call::AqlCall;
use crate::exec::context::QueryContext;
use crate::exec::error::ExecutionError;
use crate::exec::executors::{
    CalculationExecutor, CollectExecutor, EnumerateCollectionExecutor, Executor, FilterExecutor,
    GatherExecutor, IndexExecutor, LimitExecutor, RemoteExecutor, SortExecutor,
};
use crate::exec::item_block::Row;
use crate::exec::projections::{PathSpec, Projections};
use crate::exec::result::QueryResult;
use crate::exec::row_iterator::ResultIterator;
use crate::exec::stats::{ExecutionNodeId, ExecutionStats};
use crate::plan::{NodeKind, PlanNode, QueryPlan};
use crate::storage::Value;
use std::sync::Arc;
use std::time::Instant;

/// A running query
///
/// Owns the block pipeline built from a plan and the statistics gathered
/// from it. Blocks are pulled with [`execute`](Self::execute); a `Waiting`
/// answer means a remote dependency is not ready and the same call must be
/// repeated.
#[derive(Debug)]
pub struct ExecutionEngine {
    plan: Arc<QueryPlan>,
    ctx: Arc<QueryContext>,
    root: ExecutionBlock,
    stats: ExecutionStats,
    result_register: Option<usize>,
}

impl ExecutionEngine {
    pub fn instantiate(plan: Arc<QueryPlan>, ctx: Arc<QueryContext>) -> Result<Self, ExecutionError> {
        let width = plan.validate()?;
        let root = build_pipeline(&plan.nodes, &ctx)?;

        let mut stats = ExecutionStats::new();
        for (id, alias) in plan.aliases() {
            stats.add_alias(id, alias);
        }
        let result_register = plan.result_register.or(width.map(|w| w.saturating_sub(1)));

        log::debug!(
            "instantiated query {} with {} nodes",
            ctx.query_id(),
            plan.node_count()
        );
        Ok(Self {
            plan,
            ctx,
            root,
            stats,
            result_register,
        })
    }

    pub fn context(&self) -> &Arc<QueryContext> {
        &self.ctx
    }

    pub fn plan(&self) -> &Arc<QueryPlan> {
        &self.plan
    }

    pub fn root(&self) -> &ExecutionBlock {
        &self.root
    }

    /// Forward a call to the root block
    pub fn execute(&mut self, call: AqlCall) -> Result<BlockResult, ExecutionError> {
        self.root.execute(call)
    }

    fn execute_blocking(&mut self, call: AqlCall) -> Result<BlockResult, ExecutionError> {
        loop {
            let result = self.root.execute(call.clone())?;
            if result.state != ExecutionState::Waiting {
                return Ok(result);
            }
            std::thread::yield_now();
        }
    }

    /// Classic `getSome`: up to `at_most` rows, retrying while waiting
    pub fn get_some(&mut self, at_most: usize) -> Result<BlockResult, ExecutionError> {
        self.execute_blocking(AqlCall::simulate_get_some(at_most))
    }

    /// Classic `skipSome`: skip up to `at_most` rows, retrying while waiting
    pub fn skip_some(&mut self, at_most: usize) -> Result<usize, ExecutionError> {
        Ok(self.execute_blocking(AqlCall::simulate_skip_some(at_most))?.skipped)
    }

    /// Value of a result row returned to the client
    pub fn result_value(&self, row: &Row) -> Value {
        let register = self.result_register.unwrap_or(row.len().saturating_sub(1));
        row.get(register).cloned().unwrap_or(Value::Null)
    }

    /// Pull all rows as a lazy iterator of client values
    pub fn rows(&mut self) -> ResultIterator<'_> {
        ResultIterator::new(self)
    }

    /// Run the query to completion
    pub fn run(&mut self) -> Result<QueryResult, ExecutionError> {
        let started = Instant::now();
        let resolver_ctx = Arc::clone(&self.ctx);
        let mut rows = Vec::new();
        for value in self.rows() {
            rows.push(value?.to_json(resolver_ctx.resolver())?);
        }

        let mut stats = self.take_stats();
        stats.count = rows.len() as u64;
        stats.set_execution_time(started.elapsed().as_secs_f64());

        let options = self.ctx.options();
        log::info!(
            "query {} returned {} rows in {:.3}s (peak memory {})",
            self.ctx.query_id(),
            rows.len(),
            stats.execution_time,
            stats.peak_memory_usage
        );
        Ok(QueryResult::new(
            self.ctx.query_id(),
            rows,
            stats,
            options.full_count,
            options.profile,
        ))
    }

    /// Collect the statistics gathered since the last call
    pub fn take_stats(&mut self) -> ExecutionStats {
        self.root.collect_stats(&mut self.stats);
        self.stats.set_peak_memory_usage(self.ctx.monitor().peak());
        let stats = self.stats.clone();
        self.stats.clear();
        stats
    }

    /// Rebuild the pipeline so the query can run again
    pub fn reset(&mut self) -> Result<(), ExecutionError> {
        self.stats.clear();
        self.root = build_pipeline(&self.plan.nodes, &self.ctx)?;
        self.ctx.monitor().clear();
        self.ctx.revive();
        Ok(())
    }

    pub fn kill(&self) {
        self.ctx.kill();
    }
}

fn projections(specs: &[PathSpec]) -> Result<Option<Projections>, ExecutionError> {
    if specs.is_empty() {
        return Ok(None);
    }
    let paths = specs.iter().cloned().map(PathSpec::into_path).collect();
    Projections::new(paths).map(Some)
}

fn build_executor(node: &PlanNode, ctx: &Arc<QueryContext>) -> Result<Executor, ExecutionError> {
    Ok(match &node.kind {
        NodeKind::EnumerateCollection {
            collection,
            projections: specs,
        } => Executor::EnumerateCollection(EnumerateCollectionExecutor::new(
            ctx.collection(collection)?,
            projections(specs)?,
        )),
        NodeKind::Index {
            index,
            lower,
            upper,
            projections: specs,
        } => {
            let index = ctx.index(index)?;
            let collection = ctx.collection(index.collection())?;
            Executor::Index(IndexExecutor::new(
                index,
                collection,
                lower.clone(),
                upper.clone(),
                projections(specs)?,
            ))
        }
        NodeKind::Calculation { expression } => {
            Executor::Calculation(CalculationExecutor::new(expression.clone()))
        }
        NodeKind::Filter { condition } => Executor::Filter(FilterExecutor::new(condition.clone())),
        NodeKind::Limit {
            offset,
            limit,
            full_count,
        } => Executor::Limit(LimitExecutor::new(*offset, *limit, *full_count)),
        NodeKind::Sort { keys } => Executor::Sort(SortExecutor::new(keys.clone())),
        NodeKind::Collect {
            groups,
            aggregates,
            options,
        } => Executor::Collect(CollectExecutor::new(groups.clone(), aggregates.clone(), *options)),
        NodeKind::Remote { shard } => Executor::Remote(RemoteExecutor::new(shard, ctx.shard(shard)?)),
        NodeKind::Gather {
            parallel,
            dependencies,
        } => {
            let blocks = dependencies
                .iter()
                .map(|pipeline| build_pipeline(pipeline, ctx))
                .collect::<Result<Vec<_>, _>>()?;
            Executor::Gather(GatherExecutor::new(blocks, *parallel))
        }
    })
}

fn build_pipeline(nodes: &[PlanNode], ctx: &Arc<QueryContext>) -> Result<ExecutionBlock, ExecutionError> {
    let mut current: Option<ExecutionBlock> = None;
    for node in nodes {
        let executor = build_executor(node, ctx)?;
        current = Some(ExecutionBlock::new(
            ExecutionNodeId(node.id),
            executor,
            current.take(),
            Arc::clone(ctx),
        ));
    }
    current.ok_or_else(|| ExecutionError::BadParameter("plan pipeline has no nodes".to_string()))
}
