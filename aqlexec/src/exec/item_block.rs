// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Row batches passed between execution blocks

use crate::exec::block::ExecutionState;
use crate::exec::call::AqlCall;
use crate::exec::error::ExecutionError;
use crate::exec::resource_monitor::{ResourceMonitor, ResourceUsageScope};
use crate::storage::Value;
use std::sync::Arc;

/// Index of a value within a row
pub type RegisterId = usize;

/// One row: a value per register
pub type Row = Vec<Value>;

pub(crate) fn row_memory(row: &Row) -> u64 {
    row.iter().map(Value::memory_usage).sum::<u64>() + std::mem::size_of::<Row>() as u64
}

/// A batch of rows whose memory is accounted against the query's monitor
///
/// The accounted memory is released when the block is dropped.
#[derive(Debug)]
pub struct AqlItemBlock {
    rows: Vec<Row>,
    memory: ResourceUsageScope,
}

impl AqlItemBlock {
    pub fn new(monitor: Arc<ResourceMonitor>) -> Self {
        Self {
            rows: Vec::new(),
            memory: ResourceUsageScope::new(monitor),
        }
    }

    pub fn with_capacity(monitor: Arc<ResourceMonitor>, capacity: usize) -> Self {
        Self {
            rows: Vec::with_capacity(capacity),
            memory: ResourceUsageScope::new(monitor),
        }
    }

    /// Build a block from rows, failing if the memory limit would be exceeded
    pub fn from_rows(monitor: Arc<ResourceMonitor>, rows: Vec<Row>) -> Result<Self, ExecutionError> {
        let bytes = rows.iter().map(row_memory).sum();
        Ok(Self {
            rows,
            memory: ResourceUsageScope::with_value(monitor, bytes)?,
        })
    }

    pub fn push_row(&mut self, row: Row) -> Result<(), ExecutionError> {
        self.memory.increase(row_memory(&row))?;
        self.rows.push(row);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn row(&self, index: usize) -> Option<&Row> {
        self.rows.get(index)
    }

    /// Accounted memory in bytes
    pub fn memory_usage(&self) -> u64 {
        self.memory.tracked()
    }

    /// Take the rows out; the accounted memory is released
    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    fn take_row(&mut self, index: usize) -> Option<Row> {
        self.rows.get_mut(index).map(std::mem::take)
    }
}

/// Input of a block: the last batch returned by its dependency
///
/// Besides the rows it carries the number of rows the dependency skipped
/// and the dependency's state.
#[derive(Debug)]
pub struct DataRange {
    state: ExecutionState,
    skipped: usize,
    block: Option<AqlItemBlock>,
    index: usize,
}

impl DataRange {
    pub fn new(state: ExecutionState, skipped: usize, block: Option<AqlItemBlock>) -> Self {
        Self {
            state,
            skipped,
            block,
            index: 0,
        }
    }

    /// Range of a block without dependency: no rows, upstream done
    pub fn exhausted() -> Self {
        Self::new(ExecutionState::Done, 0, None)
    }

    /// Range before the first upstream request
    pub fn initial() -> Self {
        Self::new(ExecutionState::HasMore, 0, None)
    }

    pub fn upstream_state(&self) -> ExecutionState {
        self.state
    }

    pub fn upstream_done(&self) -> bool {
        self.state == ExecutionState::Done
    }

    pub fn has_data_row(&self) -> bool {
        self.block.as_ref().is_some_and(|b| self.index < b.len())
    }

    /// Rows left in the current batch
    pub fn count_data_rows(&self) -> usize {
        self.block.as_ref().map_or(0, |b| b.len() - self.index.min(b.len()))
    }

    pub fn peek_data_row(&self) -> Option<&Row> {
        self.block.as_ref().and_then(|b| b.row(self.index))
    }

    pub fn next_data_row(&mut self) -> Option<Row> {
        let block = self.block.as_mut()?;
        let row = block.take_row(self.index)?;
        self.index += 1;
        Some(row)
    }

    /// Drop all remaining rows of the batch, returning how many were dropped
    pub fn skip_all_remaining_data_rows(&mut self) -> usize {
        let remaining = self.count_data_rows();
        self.index += remaining;
        remaining
    }

    /// Rows the dependency reported as skipped, not yet accounted
    pub fn skipped_in_flight(&self) -> usize {
        self.skipped
    }

    pub fn take_skipped(&mut self) -> usize {
        std::mem::take(&mut self.skipped)
    }

    /// State as seen by the consumer of this range
    pub fn final_state(&self) -> ExecutionState {
        if self.has_data_row() || self.skipped > 0 {
            ExecutionState::HasMore
        } else {
            self.state
        }
    }
}

/// Output under construction for one `execute` call
///
/// Tracks the client call so that every written row counts against its
/// limit.
#[derive(Debug)]
pub struct OutputRows {
    block: AqlItemBlock,
    call: AqlCall,
    capacity: usize,
}

impl OutputRows {
    pub fn new(monitor: Arc<ResourceMonitor>, call: AqlCall, capacity: usize) -> Self {
        let hint = capacity.min(call.get_limit());
        Self {
            block: AqlItemBlock::with_capacity(monitor, hint),
            call,
            capacity,
        }
    }

    pub fn add_row(&mut self, row: Row) -> Result<(), ExecutionError> {
        self.block.push_row(row)?;
        self.call.did_produce(1);
        Ok(())
    }

    /// Rows that may still be written
    pub fn num_rows_left(&self) -> usize {
        self.capacity
            .saturating_sub(self.block.len())
            .min(self.call.get_limit())
    }

    pub fn is_full(&self) -> bool {
        self.num_rows_left() == 0
    }

    /// Block size reached, independent of the client limit
    pub fn block_full(&self) -> bool {
        self.block.len() >= self.capacity
    }

    pub fn num_rows_written(&self) -> usize {
        self.block.len()
    }

    pub fn client_call(&self) -> &AqlCall {
        &self.call
    }

    /// Replace the client call, e.g. when a new `execute` resumes output
    pub fn set_client_call(&mut self, call: AqlCall) {
        self.call = call;
    }

    pub fn into_block(self) -> AqlItemBlock {
        self.block
    }
}
