// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Remote execution on a shard
//!
//! A remote node forwards each call to a [`ShardConnection`] as
//! `{"call": <AqlCall>}` and expects
//! `{"state": "hasMore"|"done", "skipped": n, "rows": [[...]], "stats": {...}}`
//! back. Statistics shipped with a response are merged into the query's
//! statistics.

use crate::exec::block::{BlockResult, ExecutionState};
use crate::exec::call::{json_type_name, AqlCall};
use crate::exec::context::QueryContext;
use crate::exec::engine::ExecutionEngine;
use crate::exec::error::ExecutionError;
use crate::exec::item_block::AqlItemBlock;
use crate::exec::stats::ExecutionStats;
use crate::plan::QueryPlan;
use crate::storage::Value;
use parking_lot::Mutex;
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;

/// Answer of a shard
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteResponse {
    /// The shard has not finished the request; send it again
    Waiting,
    Ready(JsonValue),
}

/// Transport to a shard executing part of the query
pub trait ShardConnection: Send + Sync {
    fn execute(&self, request: &JsonValue) -> Result<RemoteResponse, ExecutionError>;
}

pub struct RemoteExecutor {
    shard: String,
    connection: Arc<dyn ShardConnection>,
    done: bool,
}

impl std::fmt::Debug for RemoteExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteExecutor")
            .field("shard", &self.shard)
            .field("done", &self.done)
            .finish()
    }
}

impl RemoteExecutor {
    pub fn new(shard: &str, connection: Arc<dyn ShardConnection>) -> Self {
        Self {
            shard: shard.to_string(),
            connection,
            done: false,
        }
    }

    pub fn execute(
        &mut self,
        call: AqlCall,
        ctx: &Arc<QueryContext>,
        stats: &mut ExecutionStats,
    ) -> Result<BlockResult, ExecutionError> {
        if self.done {
            return Ok(BlockResult::done());
        }

        stats.requests += 1;
        let request = json!({ "call": call.to_wire() });
        let body = match self.connection.execute(&request)? {
            RemoteResponse::Waiting => {
                log::debug!("shard '{}' not ready for {}", self.shard, call);
                return Ok(BlockResult::waiting());
            }
            RemoteResponse::Ready(body) => body,
        };

        let result = self.decode(&body, ctx, stats)?;
        self.done = result.state == ExecutionState::Done;
        Ok(result)
    }

    fn decode(
        &self,
        body: &JsonValue,
        ctx: &Arc<QueryContext>,
        stats: &mut ExecutionStats,
    ) -> Result<BlockResult, ExecutionError> {
        let state = match body.get("state").and_then(JsonValue::as_str) {
            Some("hasMore") => ExecutionState::HasMore,
            Some("done") => ExecutionState::Done,
            other => {
                return Err(ExecutionError::Internal(format!(
                    "shard '{}' answered with invalid state {:?}",
                    self.shard, other
                )))
            }
        };

        let skipped = match body.get("skipped") {
            None => 0,
            Some(value) => value
                .as_u64()
                .ok_or_else(|| ExecutionError::type_mismatch("skipped", "unsigned integer"))?
                as usize,
        };

        let rows = match body.get("rows") {
            None | Some(JsonValue::Null) => Vec::new(),
            Some(JsonValue::Array(rows)) => rows
                .iter()
                .map(|row| match row {
                    JsonValue::Array(values) => Ok(values.iter().map(Value::from_json).collect()),
                    other => Err(ExecutionError::Internal(format!(
                        "shard row must be an array, got {}",
                        json_type_name(other)
                    ))),
                })
                .collect::<Result<Vec<_>, _>>()?,
            Some(_) => return Err(ExecutionError::type_mismatch("rows", "array")),
        };

        if let Some(remote_stats) = body.get("stats") {
            stats.add(&ExecutionStats::from_wire(remote_stats)?);
        }

        let block = if rows.is_empty() {
            None
        } else {
            Some(AqlItemBlock::from_rows(Arc::clone(ctx.monitor()), rows)?)
        };
        Ok(BlockResult::new(state, skipped, block))
    }
}

/// In-process shard running its own engine
///
/// Serves the remote protocol from a plan executed against local data,
/// for single-process setups and tests.
pub struct LocalShard {
    engine: Mutex<ExecutionEngine>,
}

impl LocalShard {
    pub fn new(engine: ExecutionEngine) -> Self {
        Self {
            engine: Mutex::new(engine),
        }
    }

    pub fn from_plan(plan: Arc<QueryPlan>, ctx: Arc<QueryContext>) -> Result<Self, ExecutionError> {
        Ok(Self::new(ExecutionEngine::instantiate(plan, ctx)?))
    }
}

impl ShardConnection for LocalShard {
    fn execute(&self, request: &JsonValue) -> Result<RemoteResponse, ExecutionError> {
        let call = AqlCall::from_wire(request.get("call").ok_or_else(|| ExecutionError::missing_key("call"))?)?;
        let mut engine = self.engine.lock();
        let result = engine.execute(call)?;

        let state = match result.state {
            ExecutionState::Waiting => return Ok(RemoteResponse::Waiting),
            ExecutionState::HasMore => "hasMore",
            ExecutionState::Done => "done",
        };

        let resolver = engine.context().resolver();
        let rows = match result.block {
            Some(block) => block
                .rows()
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|value| value.to_json(resolver))
                        .collect::<Result<Vec<_>, _>>()
                        .map(JsonValue::Array)
                })
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };
        let stats = engine.take_stats().to_wire(true);

        Ok(RemoteResponse::Ready(json!({
            "state": state,
            "skipped": result.skipped,
            "rows": rows,
            "stats": stats,
        })))
    }
}
