// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Row Iterator - lazy result consumption
//!
//! Pulls batches from the engine only as rows are consumed, so a client
//! that stops early never materializes the rest of the result.

use crate::exec::block::ExecutionState;
use crate::exec::engine::ExecutionEngine;
use crate::exec::error::ExecutionError;
use crate::storage::Value;
use std::collections::VecDeque;

/// Iterator over the client values of a query
///
/// Yields the result register of every row. After an error the iterator
/// is fused.
pub struct ResultIterator<'a> {
    engine: &'a mut ExecutionEngine,
    buffer: VecDeque<Value>,
    done: bool,
}

impl<'a> ResultIterator<'a> {
    pub fn new(engine: &'a mut ExecutionEngine) -> Self {
        Self {
            engine,
            buffer: VecDeque::new(),
            done: false,
        }
    }

    fn fetch(&mut self) -> Result<(), ExecutionError> {
        let batch_size = self.engine.context().batch_size();
        let result = self.engine.get_some(batch_size)?;
        self.done = result.state == ExecutionState::Done;
        if let Some(block) = result.block {
            for row in block.rows() {
                self.buffer.push_back(self.engine.result_value(row));
            }
        }
        Ok(())
    }
}

impl Iterator for ResultIterator<'_> {
    type Item = Result<Value, ExecutionError>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.buffer.is_empty() && !self.done {
            if let Err(error) = self.fetch() {
                self.done = true;
                self.buffer.clear();
                return Some(Err(error));
            }
        }
        self.buffer.pop_front().map(Ok)
    }
}
