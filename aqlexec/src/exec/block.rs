// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Pull-based execution block
//!
//! Every plan node is wrapped in an [`ExecutionBlock`]. A client asks a
//! block for rows with an [`AqlCall`]; the block drives its executor
//! through a small state machine, pulling input from its dependency with
//! calls derived from what the executor still needs:
//!
//! - `CheckCall` decides between skipping, producing and fast-forwarding
//! - `Skip` lets the executor consume the call's offset
//! - `Produce` lets the executor write rows into the output block
//! - `FastForward` counts (fullCount) or drops the rest of the input
//! - `Upstream` fetches the next input batch from the dependency
//!
//! A dependency answering `Waiting` suspends the block; the partially
//! consumed call is kept so that a retried call continues where the
//! previous one stopped.

use crate::config::ProfileLevel;
use crate::exec::call::AqlCall;
use crate::exec::context::QueryContext;
use crate::exec::error::ExecutionError;
use crate::exec::executors::Executor;
use crate::exec::item_block::{AqlItemBlock, DataRange, OutputRows};
use crate::exec::stats::{ExecutionNodeId, ExecutionNodeStats, ExecutionStats};
use std::sync::Arc;
use std::time::Instant;

/// State reported to the client of a block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    /// More rows may follow
    HasMore,
    /// The block is exhausted
    Done,
    /// A remote dependency has not answered yet; retry the same call
    Waiting,
}

/// Answer to one `execute` call
#[derive(Debug)]
pub struct BlockResult {
    pub state: ExecutionState,
    /// Rows skipped on behalf of the call's offset or fullCount
    pub skipped: usize,
    pub block: Option<AqlItemBlock>,
}

impl BlockResult {
    pub fn new(state: ExecutionState, skipped: usize, block: Option<AqlItemBlock>) -> Self {
        Self { state, skipped, block }
    }

    pub fn waiting() -> Self {
        Self::new(ExecutionState::Waiting, 0, None)
    }

    pub fn done() -> Self {
        Self::new(ExecutionState::Done, 0, None)
    }

    pub fn num_rows(&self) -> usize {
        self.block.as_ref().map_or(0, AqlItemBlock::len)
    }
}

/// State of an executor after one produce or skip step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorState {
    HasMore,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExecState {
    CheckCall,
    Skip,
    Produce,
    FastForward,
    Upstream,
    Done,
}

/// A plan node with its executor and its single dependency
pub struct ExecutionBlock {
    id: ExecutionNodeId,
    executor: Executor,
    dependency: Option<Box<ExecutionBlock>>,
    ctx: Arc<QueryContext>,
    input: DataRange,
    exec_state: ExecState,
    upstream_request: AqlCall,
    /// Partially consumed call of a suspended execution
    client_request: Option<AqlCall>,
    skipped: usize,
    output: Option<OutputRows>,
    executor_done: bool,
    finished: bool,
    stats: ExecutionStats,
    node_stats: ExecutionNodeStats,
}

impl std::fmt::Debug for ExecutionBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionBlock")
            .field("id", &self.id)
            .field("type", &self.executor.node_type())
            .field("exec_state", &self.exec_state)
            .field("finished", &self.finished)
            .field("dependency", &self.dependency)
            .finish()
    }
}

impl ExecutionBlock {
    pub fn new(
        id: ExecutionNodeId,
        executor: Executor,
        dependency: Option<ExecutionBlock>,
        ctx: Arc<QueryContext>,
    ) -> Self {
        let input = if dependency.is_some() {
            DataRange::initial()
        } else {
            DataRange::exhausted()
        };
        Self {
            id,
            executor,
            dependency: dependency.map(Box::new),
            ctx,
            input,
            exec_state: ExecState::CheckCall,
            upstream_request: AqlCall::new(),
            client_request: None,
            skipped: 0,
            output: None,
            executor_done: false,
            finished: false,
            stats: ExecutionStats::new(),
            node_stats: ExecutionNodeStats::default(),
        }
    }

    pub fn id(&self) -> ExecutionNodeId {
        self.id
    }

    pub fn node_type(&self) -> &'static str {
        self.executor.node_type()
    }

    pub fn dependency(&self) -> Option<&ExecutionBlock> {
        self.dependency.as_deref()
    }

    /// Ask the block for rows
    pub fn execute(&mut self, call: AqlCall) -> Result<BlockResult, ExecutionError> {
        self.ctx.check_killed()?;

        let profile = self.ctx.options().profile;
        let started = profile.enabled().then(Instant::now);
        let filtered_before = self.stats.filtered;
        let requested = (profile == ProfileLevel::Blocks).then(|| call.to_string());

        let result = if self.executor.is_self_driven() {
            let ctx = Arc::clone(&self.ctx);
            self.executor.execute_self_driven(call, &ctx, &mut self.stats)?
        } else {
            self.execute_without_trace(call)?
        };

        self.node_stats.calls += 1;
        self.node_stats.items += (result.num_rows() + result.skipped) as u64;
        self.node_stats.filtered += self.stats.filtered.saturating_sub(filtered_before);
        if let Some(started) = started {
            self.node_stats.runtime += started.elapsed().as_secs_f64();
        }
        if profile == ProfileLevel::Blocks {
            log::info!(
                "execute type={} id={} call={} state={:?} skipped={} produced={}",
                self.executor.node_type(),
                self.id,
                requested.unwrap_or_default(),
                result.state,
                result.skipped,
                result.num_rows()
            );
        }
        Ok(result)
    }

    fn next_state(&self, call: &AqlCall) -> ExecState {
        if self.executor_done {
            ExecState::FastForward
        } else if call.get_offset() > 0 {
            ExecState::Skip
        } else if call.get_limit() > 0 {
            ExecState::Produce
        } else if call.has_hard_limit() {
            ExecState::FastForward
        } else {
            ExecState::Done
        }
    }

    fn execute_without_trace(&mut self, call: AqlCall) -> Result<BlockResult, ExecutionError> {
        if self.finished {
            return Ok(BlockResult::done());
        }

        let mut client_call = match self.client_request.take() {
            Some(saved) if self.exec_state == ExecState::Upstream => {
                debug_assert!(
                    saved.request_less_data_than(&call),
                    "suspended call {} asks for more than the resumed call {}",
                    saved,
                    call
                );
                saved
            }
            _ => {
                self.exec_state = ExecState::CheckCall;
                call
            }
        };

        let mut local_state = ExecutorState::HasMore;
        while self.exec_state != ExecState::Done {
            match self.exec_state {
                ExecState::CheckCall => {
                    self.exec_state = self.next_state(&client_call);
                }
                ExecState::Skip => {
                    let (state, _, upstream) =
                        self.executor
                            .skip_rows_range(&mut self.input, &mut client_call, &self.ctx, &mut self.stats)?;
                    self.skipped += client_call.get_skip_count();
                    client_call.reset_skip_count();
                    self.upstream_request = upstream;
                    local_state = state;

                    self.exec_state = if state == ExecutorState::Done {
                        self.executor_done = true;
                        ExecState::FastForward
                    } else if client_call.get_offset() > 0 {
                        ExecState::Upstream
                    } else {
                        ExecState::CheckCall
                    };
                }
                ExecState::Produce => {
                    let monitor = Arc::clone(self.ctx.monitor());
                    let batch_size = self.ctx.batch_size();
                    let output = self
                        .output
                        .get_or_insert_with(|| OutputRows::new(monitor, client_call.clone(), batch_size));
                    if output.block_full() {
                        self.exec_state = ExecState::Done;
                        continue;
                    }
                    output.set_client_call(client_call.clone());

                    let (state, upstream) =
                        self.executor
                            .produce_rows(&mut self.input, output, &self.ctx, &mut self.stats)?;
                    client_call = output.client_call().clone();
                    self.upstream_request = upstream;
                    local_state = state;

                    self.exec_state = if state == ExecutorState::Done {
                        self.executor_done = true;
                        ExecState::FastForward
                    } else if output.block_full() {
                        ExecState::Done
                    } else if client_call.get_limit() > 0 {
                        ExecState::Upstream
                    } else {
                        ExecState::CheckCall
                    };
                }
                ExecState::FastForward => {
                    let counting = client_call.needs_full_count()
                        && client_call.get_offset() == 0
                        && client_call.get_limit() == 0;
                    if counting && !self.executor_done {
                        let (state, _, upstream) = self.executor.skip_rows_range(
                            &mut self.input,
                            &mut client_call,
                            &self.ctx,
                            &mut self.stats,
                        )?;
                        self.skipped += client_call.get_skip_count();
                        client_call.reset_skip_count();
                        self.upstream_request = upstream;
                        local_state = state;

                        if state == ExecutorState::Done {
                            self.executor_done = true;
                        } else {
                            self.exec_state = ExecState::Upstream;
                        }
                    } else {
                        self.input.skip_all_remaining_data_rows();
                        self.input.take_skipped();
                        if self.dependency.is_none() || self.input.upstream_done() {
                            local_state = ExecutorState::Done;
                            self.exec_state = ExecState::Done;
                        } else {
                            self.upstream_request = AqlCall::fast_forward();
                            self.exec_state = ExecState::Upstream;
                        }
                    }
                }
                ExecState::Upstream => match self.dependency.as_mut() {
                    None => {
                        self.input = DataRange::exhausted();
                        self.exec_state = ExecState::CheckCall;
                    }
                    Some(dependency) => {
                        let result = dependency.execute(self.upstream_request.clone())?;
                        if result.state == ExecutionState::Waiting {
                            self.client_request = Some(client_call);
                            return Ok(BlockResult::waiting());
                        }
                        self.input = DataRange::new(result.state, result.skipped, result.block);
                        self.exec_state = ExecState::CheckCall;
                    }
                },
                ExecState::Done => break,
            }
        }

        self.exec_state = ExecState::CheckCall;
        let skipped = std::mem::take(&mut self.skipped);
        let block = self
            .output
            .take()
            .map(OutputRows::into_block)
            .filter(|block| !block.is_empty());

        let state = if local_state == ExecutorState::Done {
            self.finished = true;
            ExecutionState::Done
        } else {
            ExecutionState::HasMore
        };
        Ok(BlockResult::new(state, skipped, block))
    }

    /// Move the statistics gathered so far into `into`
    ///
    /// Collects this block, its dependency chain and the dependencies of
    /// gather executors.
    pub fn collect_stats(&mut self, into: &mut ExecutionStats) {
        into.add(&std::mem::take(&mut self.stats));
        if self.ctx.options().profile.enabled() {
            into.add_node(self.id, &std::mem::take(&mut self.node_stats));
        }
        if let Some(dependency) = self.dependency.as_mut() {
            dependency.collect_stats(into);
        }
        self.executor.collect_dependency_stats(into);
    }
}
