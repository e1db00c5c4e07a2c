// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Query execution options

use crate::exec::error::ExecutionError;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::str::FromStr;

/// How much profiling information a query collects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileLevel {
    /// No per-node statistics
    #[default]
    None,
    /// Per-node calls, items, filtered rows and runtime
    Basic,
    /// Basic plus a log line for every block invocation
    Blocks,
}

impl ProfileLevel {
    pub fn enabled(&self) -> bool {
        *self != ProfileLevel::None
    }
}

impl FromStr for ProfileLevel {
    type Err = ExecutionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" | "0" => Ok(ProfileLevel::None),
            "basic" | "1" => Ok(ProfileLevel::Basic),
            "blocks" | "2" => Ok(ProfileLevel::Blocks),
            other => Err(ExecutionError::BadParameter(format!(
                "unknown profile level '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for ProfileLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProfileLevel::None => "none",
            ProfileLevel::Basic => "basic",
            ProfileLevel::Blocks => "blocks",
        })
    }
}

/// Options of one query execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct QueryOptions {
    /// Maximum memory of the query in bytes (0 = unlimited)
    pub memory_limit: u64,

    /// Maximum rows per returned block
    pub batch_size: usize,

    /// Report fullCount in the query statistics
    pub full_count: bool,

    /// Profiling detail
    pub profile: ProfileLevel,

    /// Capacity of the plan cache
    pub max_plan_cache_entries: usize,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            memory_limit: 0,
            batch_size: 1000,
            full_count: false,
            profile: ProfileLevel::None,
            max_plan_cache_entries: 128,
        }
    }
}

impl QueryOptions {
    /// Options for memory-constrained environments
    pub fn memory_constrained(limit: u64) -> Self {
        Self {
            memory_limit: limit,
            batch_size: 100,
            ..Self::default()
        }
    }

    /// Parse options from a JSON object; missing keys keep their defaults
    pub fn from_json(json: &JsonValue) -> Result<Self, ExecutionError> {
        let options: QueryOptions = serde_json::from_value(json.clone())?;
        options.validate()?;
        Ok(options)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ExecutionError> {
        if self.batch_size == 0 {
            return Err(ExecutionError::BadParameter(
                "batchSize must be greater than 0".to_string(),
            ));
        }
        if self.max_plan_cache_entries == 0 {
            return Err(ExecutionError::BadParameter(
                "maxPlanCacheEntries must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
