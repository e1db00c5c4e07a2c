// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Query execution engine
//!
//! This module provides the pull-based execution core: the row request
//! protocol ([`AqlCall`]), execution blocks and their executors, memory
//! accounting and execution statistics.

pub mod aggregation;
pub mod block;
pub mod call;
pub mod context;
pub mod engine;
pub mod error;
pub mod executors;
pub mod expression;
pub mod item_block;
pub mod projections;
pub mod resource_monitor;
pub mod result;
pub mod row_iterator;
pub mod stats;

// Re-export the main types for convenience
pub use aggregation::{AggregationMethod, AggregationOptions};
pub use block::{BlockResult, ExecutionBlock, ExecutionState, ExecutorState};
pub use call::{AqlCall, Limit, LimitType};
pub use context::QueryContext;
pub use engine::ExecutionEngine;
pub use error::ExecutionError;
pub use expression::{ArithmeticOp, CompareOp, Expression};
pub use item_block::{AqlItemBlock, DataRange, OutputRows, RegisterId, Row};
pub use projections::{Projection, ProjectionType, Projections};
pub use resource_monitor::{MemoryStats, ResourceMonitor, ResourceUsageScope};
pub use result::QueryResult;
pub use row_iterator::ResultIterator;
pub use stats::{ExecutionNodeId, ExecutionNodeStats, ExecutionStats};
