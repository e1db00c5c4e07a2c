// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Execution plans
//!
//! A plan is a pipeline of nodes in execution order: the first node is a
//! source (collection scan, index scan, remote or gather), every later
//! node consumes the rows of the node before it. Gather nodes carry one
//! nested pipeline per dependency.
//!
//! Plans are read from JSON:
//!
//! ```json
//! {
//!   "nodes": [
//!     {"id": 1, "type": "enumerateCollection", "collection": "users", "projections": ["age"]},
//!     {"id": 2, "type": "filter", "condition": {"type": "compare", "op": ">=",
//!       "left": {"type": "attribute", "register": 0, "path": "age"},
//!       "right": {"type": "constant", "value": 18}}},
//!     {"id": 3, "type": "limit", "offset": 0, "limit": 10, "fullCount": true}
//!   ]
//! }
//! ```

use crate::exec::aggregation::{AggregationMethod, AggregationOptions};
use crate::exec::error::ExecutionError;
use crate::exec::executors::{AggregateFunction, AggregateSpec, SortKey};
use crate::exec::expression::Expression;
use crate::exec::item_block::RegisterId;
use crate::exec::projections::PathSpec;
use crate::exec::stats::ExecutionNodeId;
use crate::storage::Value;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashSet;
use std::str::FromStr;

fn method_undefined(options: &AggregationOptions) -> bool {
    options.method() == AggregationMethod::Undefined
}

/// Node-specific part of a plan node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum NodeKind {
    EnumerateCollection {
        collection: String,
        #[serde(default)]
        projections: Vec<PathSpec>,
    },
    /// Range scan with inclusive bounds on the first indexed field
    Index {
        index: String,
        #[serde(default)]
        lower: Option<Value>,
        #[serde(default)]
        upper: Option<Value>,
        #[serde(default)]
        projections: Vec<PathSpec>,
    },
    Calculation {
        expression: Expression,
    },
    Filter {
        condition: Expression,
    },
    Limit {
        #[serde(default)]
        offset: usize,
        limit: usize,
        #[serde(default)]
        full_count: bool,
    },
    Sort {
        keys: Vec<SortKey>,
    },
    Collect {
        #[serde(default)]
        groups: Vec<Expression>,
        #[serde(default)]
        aggregates: Vec<AggregateSpec>,
        #[serde(default, skip_serializing_if = "method_undefined")]
        options: AggregationOptions,
    },
    Remote {
        shard: String,
    },
    Gather {
        #[serde(default)]
        parallel: bool,
        dependencies: Vec<Vec<PlanNode>>,
    },
}

impl NodeKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            NodeKind::EnumerateCollection { .. } => "enumerateCollection",
            NodeKind::Index { .. } => "index",
            NodeKind::Calculation { .. } => "calculation",
            NodeKind::Filter { .. } => "filter",
            NodeKind::Limit { .. } => "limit",
            NodeKind::Sort { .. } => "sort",
            NodeKind::Collect { .. } => "collect",
            NodeKind::Remote { .. } => "remote",
            NodeKind::Gather { .. } => "gather",
        }
    }

    /// Whether the node produces rows without an input pipeline
    pub fn is_source(&self) -> bool {
        matches!(
            self,
            NodeKind::EnumerateCollection { .. }
                | NodeKind::Index { .. }
                | NodeKind::Remote { .. }
                | NodeKind::Gather { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanNode {
    pub id: u64,
    /// Id under which the node's profile is reported
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<u64>,
    /// Internal nodes are left out of profiles
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub internal: bool,
    #[serde(flatten)]
    pub kind: NodeKind,
}

impl PlanNode {
    pub fn new(id: u64, kind: NodeKind) -> Self {
        Self {
            id,
            alias: None,
            internal: false,
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryPlan {
    pub nodes: Vec<PlanNode>,
    /// Register returned to the client; defaults to the last one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_register: Option<RegisterId>,
}

impl QueryPlan {
    pub fn new(nodes: Vec<PlanNode>) -> Self {
        Self {
            nodes,
            result_register: None,
        }
    }

    pub fn from_json(json: &JsonValue) -> Result<Self, ExecutionError> {
        let plan: QueryPlan = serde_json::from_value(json.clone())?;
        plan.validate()?;
        Ok(plan)
    }

    /// Check the plan's structure and register usage
    ///
    /// Returns the width of the rows the plan produces, when known.
    pub fn validate(&self) -> Result<Option<usize>, ExecutionError> {
        let mut ids = HashSet::new();
        let width = validate_pipeline(&self.nodes, &mut ids)?;
        if let (Some(width), Some(register)) = (width, self.result_register) {
            if register >= width {
                return Err(ExecutionError::BadParameter(format!(
                    "result register {} out of range for rows with {} registers",
                    register, width
                )));
            }
        }
        Ok(width)
    }

    /// Profile aliases of all nodes, nested pipelines included
    pub fn aliases(&self) -> Vec<(ExecutionNodeId, ExecutionNodeId)> {
        let mut aliases = Vec::new();
        collect_aliases(&self.nodes, &mut aliases);
        aliases
    }

    pub fn node_count(&self) -> usize {
        fn count(nodes: &[PlanNode]) -> usize {
            nodes
                .iter()
                .map(|node| match &node.kind {
                    NodeKind::Gather { dependencies, .. } => 1 + dependencies.iter().map(|d| count(d)).sum::<usize>(),
                    _ => 1,
                })
                .sum()
        }
        count(&self.nodes)
    }
}

impl FromStr for QueryPlan {
    type Err = ExecutionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let json: JsonValue = serde_json::from_str(s)?;
        Self::from_json(&json)
    }
}

fn collect_aliases(nodes: &[PlanNode], into: &mut Vec<(ExecutionNodeId, ExecutionNodeId)>) {
    for node in nodes {
        if node.internal {
            into.push((ExecutionNodeId(node.id), ExecutionNodeId::INTERNAL_NODE));
        } else if let Some(alias) = node.alias {
            into.push((ExecutionNodeId(node.id), ExecutionNodeId(alias)));
        }
        if let NodeKind::Gather { dependencies, .. } = &node.kind {
            for dependency in dependencies {
                collect_aliases(dependency, into);
            }
        }
    }
}

fn check_registers(node: &PlanNode, expression: &Expression, width: Option<usize>) -> Result<(), ExecutionError> {
    if let (Some(width), Some(register)) = (width, expression.max_register()) {
        if register >= width {
            return Err(ExecutionError::BadParameter(format!(
                "{} node {} reads register {} but rows have {} registers",
                node.kind.type_name(),
                node.id,
                register,
                width
            )));
        }
    }
    Ok(())
}

fn validate_pipeline(nodes: &[PlanNode], ids: &mut HashSet<u64>) -> Result<Option<usize>, ExecutionError> {
    let first = nodes
        .first()
        .ok_or_else(|| ExecutionError::BadParameter("plan pipeline has no nodes".to_string()))?;
    if !first.kind.is_source() {
        return Err(ExecutionError::BadParameter(format!(
            "pipeline must start with a source node, found {} node {}",
            first.kind.type_name(),
            first.id
        )));
    }

    let mut width = None;
    for (position, node) in nodes.iter().enumerate() {
        if node.id == ExecutionNodeId::INTERNAL_NODE.0 {
            return Err(ExecutionError::BadParameter(format!("node id {} is reserved", node.id)));
        }
        if !ids.insert(node.id) {
            return Err(ExecutionError::BadParameter(format!("duplicate node id {}", node.id)));
        }
        if position > 0 && node.kind.is_source() {
            return Err(ExecutionError::BadParameter(format!(
                "{} node {} must be the first node of its pipeline",
                node.kind.type_name(),
                node.id
            )));
        }

        width = match &node.kind {
            NodeKind::EnumerateCollection { .. } | NodeKind::Index { .. } => Some(1),
            NodeKind::Remote { .. } => None,
            NodeKind::Gather { dependencies, .. } => {
                if dependencies.is_empty() {
                    return Err(ExecutionError::BadParameter(format!(
                        "gather node {} has no dependencies",
                        node.id
                    )));
                }
                let mut widths = Vec::with_capacity(dependencies.len());
                for dependency in dependencies {
                    widths.push(validate_pipeline(dependency, ids)?);
                }
                let known: HashSet<usize> = widths.iter().flatten().copied().collect();
                if known.len() > 1 {
                    return Err(ExecutionError::BadParameter(format!(
                        "gather node {} merges rows of different widths",
                        node.id
                    )));
                }
                if widths.iter().all(Option::is_some) {
                    known.into_iter().next()
                } else {
                    None
                }
            }
            NodeKind::Calculation { expression } => {
                check_registers(node, expression, width)?;
                width.map(|w| w + 1)
            }
            NodeKind::Filter { condition } => {
                check_registers(node, condition, width)?;
                width
            }
            NodeKind::Limit { .. } => width,
            NodeKind::Sort { keys } => {
                for key in keys {
                    check_registers(node, &key.expression, width)?;
                }
                width
            }
            NodeKind::Collect { groups, aggregates, .. } => {
                if groups.is_empty() && aggregates.is_empty() {
                    return Err(ExecutionError::BadParameter(format!(
                        "collect node {} has neither groups nor aggregates",
                        node.id
                    )));
                }
                for group in groups {
                    check_registers(node, group, width)?;
                }
                for aggregate in aggregates {
                    match &aggregate.expression {
                        Some(expression) => check_registers(node, expression, width)?,
                        None if aggregate.function != AggregateFunction::Count => {
                            return Err(ExecutionError::BadParameter(format!(
                                "collect node {}: {:?} needs an expression",
                                node.id, aggregate.function
                            )))
                        }
                        None => {}
                    }
                }
                Some(groups.len() + aggregates.len())
            }
        };
    }
    Ok(width)
}
