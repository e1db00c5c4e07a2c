// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Execution error types

use thiserror::Error;

/// Execution errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutionError {
    /// Wire data or plan input has the wrong shape
    #[error("Type error: {0}")]
    TypeError(String),

    /// A parameter is outside of its accepted range
    #[error("Bad parameter: {0}")]
    BadParameter(String),

    /// The query's memory budget would be exceeded
    #[error("Resource limit exceeded: query would use more memory than allowed (requested {requested} bytes, limit {limit} bytes)")]
    ResourceLimit { limit: u64, requested: u64 },

    /// A caller broke an internal contract
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Query killed")]
    QueryKilled,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ExecutionError {
    /// Shorthand for a type mismatch on a named wire attribute
    pub fn type_mismatch(key: &str, expected: &str) -> Self {
        ExecutionError::TypeError(format!(
            "When deserializing: expected '{}' to be {}",
            key, expected
        ))
    }

    /// Shorthand for a missing required wire attribute
    pub fn missing_key(key: &str) -> Self {
        ExecutionError::TypeError(format!(
            "When deserializing: missing required key '{}'",
            key
        ))
    }
}

impl From<serde_json::Error> for ExecutionError {
    fn from(error: serde_json::Error) -> Self {
        ExecutionError::Serialization(error.to_string())
    }
}
