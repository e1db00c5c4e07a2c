// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Unsorted gather over several dependencies

use crate::exec::block::{BlockResult, ExecutionBlock, ExecutionState};
use crate::exec::call::AqlCall;
use crate::exec::context::QueryContext;
use crate::exec::error::ExecutionError;
use crate::exec::item_block::{row_memory, AqlItemBlock, Row};
use crate::exec::resource_monitor::ResourceUsageScope;
use crate::exec::stats::ExecutionStats;
use rayon::prelude::*;
use std::collections::VecDeque;
use std::sync::Arc;

/// Concatenates the rows of its dependencies
///
/// Serially, dependencies are drained one after another with the client's
/// call forwarded unchanged. In parallel mode every dependency with an
/// empty buffer is asked for a batch concurrently and the client is served
/// from the buffers; no order between dependencies is guaranteed.
#[derive(Debug)]
pub struct GatherExecutor {
    dependencies: Vec<ExecutionBlock>,
    parallel: bool,
    current: usize,
    buffers: Vec<VecDeque<Row>>,
    done: Vec<bool>,
    memory: Option<ResourceUsageScope>,
}

impl GatherExecutor {
    pub fn new(dependencies: Vec<ExecutionBlock>, parallel: bool) -> Self {
        let count = dependencies.len();
        Self {
            dependencies,
            parallel,
            current: 0,
            buffers: vec![VecDeque::new(); count],
            done: vec![false; count],
            memory: None,
        }
    }

    pub fn is_parallel(&self) -> bool {
        self.parallel
    }

    pub fn dependencies(&self) -> &[ExecutionBlock] {
        &self.dependencies
    }

    pub fn execute(
        &mut self,
        call: AqlCall,
        ctx: &Arc<QueryContext>,
        _stats: &mut ExecutionStats,
    ) -> Result<BlockResult, ExecutionError> {
        if self.parallel {
            self.execute_parallel(call, ctx)
        } else {
            self.execute_serial(call, ctx)
        }
    }

    fn finish(rows: Vec<Row>, skipped: usize, state: ExecutionState, ctx: &QueryContext) -> Result<BlockResult, ExecutionError> {
        let block = if rows.is_empty() {
            None
        } else {
            Some(AqlItemBlock::from_rows(Arc::clone(ctx.monitor()), rows)?)
        };
        Ok(BlockResult::new(state, skipped, block))
    }

    fn execute_serial(&mut self, mut call: AqlCall, ctx: &QueryContext) -> Result<BlockResult, ExecutionError> {
        let mut rows = Vec::new();
        let mut skipped = 0;

        while self.current < self.dependencies.len() {
            if call.get_offset() == 0 && call.get_limit() == 0 && !call.needs_full_count() {
                if call.has_hard_limit() {
                    self.current = self.dependencies.len();
                }
                break;
            }

            let result = self.dependencies[self.current].execute(call.clone())?;
            if result.state == ExecutionState::Waiting {
                if rows.is_empty() && skipped == 0 {
                    return Ok(BlockResult::waiting());
                }
                break;
            }

            // Skipped rows cover the offset first; the rest were counted
            // past the limit after producing.
            let from_offset = result.skipped.min(call.get_offset());
            call.did_skip(from_offset);
            if let Some(block) = result.block {
                call.did_produce(block.len());
                rows.extend(block.into_rows());
            }
            if result.skipped > from_offset {
                call.did_skip(result.skipped - from_offset);
            }
            call.reset_skip_count();
            skipped += result.skipped;

            if result.state == ExecutionState::Done {
                self.current += 1;
            }
            if !rows.is_empty() || skipped > 0 {
                break;
            }
        }

        let state = if self.current >= self.dependencies.len() {
            ExecutionState::Done
        } else {
            ExecutionState::HasMore
        };
        Self::finish(rows, skipped, state, ctx)
    }

    fn release(&mut self, row: &Row) {
        if let Some(memory) = self.memory.as_mut() {
            memory.decrease(row_memory(row));
        }
    }

    fn prefetch(&mut self, ctx: &QueryContext) -> Result<bool, ExecutionError> {
        let batch_size = ctx.batch_size();
        let needed: Vec<bool> = self
            .done
            .iter()
            .zip(&self.buffers)
            .map(|(done, buffer)| !*done && buffer.is_empty())
            .collect();

        let results: Vec<Option<Result<BlockResult, ExecutionError>>> = self
            .dependencies
            .par_iter_mut()
            .zip(needed.par_iter())
            .map(|(dependency, &needed)| {
                needed.then(|| dependency.execute(AqlCall::simulate_get_some(batch_size)))
            })
            .collect();

        let memory = self
            .memory
            .get_or_insert_with(|| ResourceUsageScope::new(Arc::clone(ctx.monitor())));
        let mut waiting = false;
        for (i, result) in results.into_iter().enumerate() {
            let Some(result) = result.transpose()? else {
                continue;
            };
            match result.state {
                ExecutionState::Waiting => waiting = true,
                ExecutionState::Done => self.done[i] = true,
                ExecutionState::HasMore => {}
            }
            if let Some(block) = result.block {
                for row in block.into_rows() {
                    memory.increase(row_memory(&row))?;
                    self.buffers[i].push_back(row);
                }
            }
        }
        Ok(waiting)
    }

    fn count_remaining(&mut self) -> Result<(usize, bool), ExecutionError> {
        let mut counted = 0;
        let mut waiting = false;
        for (i, dependency) in self.dependencies.iter_mut().enumerate() {
            while !self.done[i] {
                let result = dependency.execute(AqlCall::full_count_only())?;
                counted += result.skipped;
                match result.state {
                    ExecutionState::Done => self.done[i] = true,
                    ExecutionState::Waiting => {
                        waiting = true;
                        break;
                    }
                    ExecutionState::HasMore => {}
                }
            }
        }
        Ok((counted, waiting))
    }

    fn execute_parallel(&mut self, mut call: AqlCall, ctx: &QueryContext) -> Result<BlockResult, ExecutionError> {
        let hard_stop = call.has_hard_limit() && call.get_limit() == 0;
        let waiting = if hard_stop && call.get_offset() == 0 {
            false
        } else {
            self.prefetch(ctx)?
        };

        let batch_size = ctx.batch_size();
        let mut rows = Vec::new();
        let mut skipped = 0;
        for i in 0..self.buffers.len() {
            while call.get_offset() > 0 {
                let Some(row) = self.buffers[i].pop_front() else {
                    break;
                };
                self.release(&row);
                call.did_skip(1);
                skipped += 1;
            }
            while call.get_limit() > 0 && rows.len() < batch_size {
                let Some(row) = self.buffers[i].pop_front() else {
                    break;
                };
                self.release(&row);
                call.did_produce(1);
                rows.push(row);
            }
            if call.get_limit() == 0 && call.needs_full_count() {
                let buffered = std::mem::take(&mut self.buffers[i]);
                for row in &buffered {
                    self.release(row);
                }
                call.did_skip(buffered.len());
                skipped += buffered.len();
            }
        }

        let mut waiting = waiting;
        if hard_stop && call.get_offset() == 0 {
            if call.needs_full_count() {
                let (counted, still_waiting) = self.count_remaining()?;
                skipped += counted;
                waiting = still_waiting;
            } else {
                self.done.iter_mut().for_each(|done| *done = true);
            }
            if !waiting {
                self.buffers.iter_mut().for_each(VecDeque::clear);
                self.memory = None;
            }
        }

        let exhausted = self.done.iter().all(|done| *done) && self.buffers.iter().all(VecDeque::is_empty);
        if exhausted {
            return Self::finish(rows, skipped, ExecutionState::Done, ctx);
        }
        if waiting && rows.is_empty() && skipped == 0 {
            return Ok(BlockResult::waiting());
        }
        Self::finish(rows, skipped, ExecutionState::HasMore, ctx)
    }

    pub fn collect_dependency_stats(&mut self, into: &mut ExecutionStats) {
        for dependency in &mut self.dependencies {
            dependency.collect_stats(into);
        }
    }
}
