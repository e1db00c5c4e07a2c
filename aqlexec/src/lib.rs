// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! aqlexec - Block-based AQL query execution core
//!
//! aqlexec executes validated query plans as a pipeline of execution
//! blocks. Each block pulls batches of rows from its dependency using the
//! [`AqlCall`] request protocol (offset, soft/hard limit, fullCount).
//!
//! # Features
//!
//! - **Pull-based pipelines**: scan, index, calculation, filter, limit, sort,
//!   collect, remote and gather executors
//! - **fullCount**: hard limits that still count the rows beyond them
//! - **Memory accounting**: per-query memory limit enforced by a
//!   [`ResourceMonitor`]
//! - **Profiling**: per-node calls, items, filtered rows and runtime
//! - **Distribution**: shard requests over a JSON wire format
//!
//! # Usage
//!
//! ```ignore
//! let store = MemoryStore::from_json(&data)?;
//! let mut ctx = QueryContext::new(QueryOptions::default());
//! store.register(&mut ctx);
//!
//! let plan = QueryPlan::from_json(&plan_json)?;
//! let mut engine = ExecutionEngine::instantiate(Arc::new(plan), Arc::new(ctx))?;
//! let result = engine.run()?;
//! ```

pub mod cache;
pub mod config;
pub mod exec;
pub mod plan;
pub mod storage;

pub use cache::{PlanCache, PlanCacheStats};
pub use config::{ProfileLevel, QueryOptions};
pub use exec::executors::{LocalShard, RemoteResponse, ShardConnection};
pub use exec::{
    AggregationMethod, AggregationOptions, AqlCall, AqlItemBlock, BlockResult, ExecutionEngine,
    ExecutionError, ExecutionState, ExecutionStats, Projections, QueryContext, QueryResult,
    ResourceMonitor,
};
pub use plan::QueryPlan;
pub use storage::{MemoryStore, Value};

/// aqlexec version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const CRATE_NAME: &str = env!("CARGO_PKG_NAME");
