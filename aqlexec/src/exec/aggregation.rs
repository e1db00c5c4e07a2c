// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Grouping strategy of a COLLECT operation

use crate::exec::error::ExecutionError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Value as JsonValue};
use std::fmt;

/// Grouping algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AggregationMethod {
    /// Not pinned yet, either algorithm may be picked
    #[default]
    Undefined,
    Hash,
    /// Requires input sorted by the group keys
    Sorted,
}

impl AggregationMethod {
    /// Parse a method name; anything unrecognized is `Undefined`
    pub fn method_from_string(name: &str) -> Self {
        match name {
            "hash" => AggregationMethod::Hash,
            "sorted" => AggregationMethod::Sorted,
            _ => AggregationMethod::Undefined,
        }
    }

    /// Canonical name of a pinned method
    pub fn method_to_string(self) -> Result<&'static str, ExecutionError> {
        match self {
            AggregationMethod::Hash => Ok("hash"),
            AggregationMethod::Sorted => Ok("sorted"),
            AggregationMethod::Undefined => Err(ExecutionError::Internal(
                "cannot stringify undefined aggregation method".to_string(),
            )),
        }
    }
}

impl fmt::Display for AggregationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.method_to_string().unwrap_or("undefined"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AggregationOptions {
    method: AggregationMethod,
}

impl AggregationOptions {
    pub fn new(method: AggregationMethod) -> Self {
        Self { method }
    }

    pub fn method(&self) -> AggregationMethod {
        self.method
    }

    pub fn set_method(&mut self, method: AggregationMethod) {
        self.method = method;
    }

    /// False only if the sorted method is pinned
    pub fn can_use_hash_method(&self) -> bool {
        self.method != AggregationMethod::Sorted
    }

    /// Read the `method` key of a wire object; absent or unknown values
    /// yield `Undefined`
    pub fn from_wire(slice: &JsonValue) -> Self {
        let method = slice
            .get("method")
            .and_then(JsonValue::as_str)
            .map_or(AggregationMethod::Undefined, AggregationMethod::method_from_string);
        Self { method }
    }

    pub fn to_wire(&self) -> Result<JsonValue, ExecutionError> {
        Ok(json!({ "method": self.method.method_to_string()? }))
    }
}

#[derive(Deserialize)]
struct RawOptions {
    #[serde(default)]
    method: Option<String>,
}

impl<'de> Deserialize<'de> for AggregationOptions {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawOptions::deserialize(deserializer)?;
        Ok(Self {
            method: raw
                .method
                .as_deref()
                .map_or(AggregationMethod::Undefined, AggregationMethod::method_from_string),
        })
    }
}

impl Serialize for AggregationOptions {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_wire()
            .map_err(serde::ser::Error::custom)?
            .serialize(serializer)
    }
}
