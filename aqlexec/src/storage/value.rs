// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Value type system for documents and registers
//!
//! Supports the AQL value types:
//! - Basic types: Null, Bool, Int, Double, String
//! - Collections: Array, Object (insertion-ordered)
//! - Custom: compact internal document ids, rendered as strings on output

use crate::exec::error::ExecutionError;
use crate::storage::IdResolver;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Number, Value as JsonValue};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Internal reference to a document: collection id plus document key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId {
    pub collection_id: u64,
    pub key: String,
}

impl DocumentId {
    pub fn new(collection_id: u64, key: impl Into<String>) -> Self {
        Self {
            collection_id,
            key: key.into(),
        }
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection_id, self.key)
    }
}

/// Result of looking up an attribute path
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Lookup<'a> {
    Found(&'a Value),
    Absent,
}

impl<'a> Lookup<'a> {
    pub fn found(self) -> Option<&'a Value> {
        match self {
            Lookup::Found(value) => Some(value),
            Lookup::Absent => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Lookup::Absent)
    }
}

/// Value types for documents and registers
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    Array(Vec<Value>),
    Object(Vec<(String, Value)>),
    Custom(DocumentId),
}

impl Value {
    /// Extract as number if possible
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Double(n) => Some(*n),
            _ => None,
        }
    }

    /// Extract as string if possible
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Extract as boolean if possible
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Extract as array if possible
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Extract object entries if possible
    pub fn as_object(&self) -> Option<&[(String, Value)]> {
        match self {
            Value::Object(entries) => Some(entries),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_))
    }

    /// Get an attribute of an object; `None` for non-objects
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Object(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Follow an attribute path through nested objects
    ///
    /// A missing attribute and a non-object intermediate both yield
    /// `Lookup::Absent`. The empty path finds the value itself.
    pub fn lookup<S: AsRef<str>>(&self, path: &[S]) -> Lookup<'_> {
        let mut current = self;
        for segment in path {
            match current.get(segment.as_ref()) {
                Some(next) => current = next,
                None => return Lookup::Absent,
            }
        }
        Lookup::Found(current)
    }

    /// AQL truthiness
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Double(n) => *n != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::Array(_) | Value::Object(_) | Value::Custom(_) => true,
        }
    }

    /// Get the type name of this value
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) | Value::Double(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Custom(_) => "custom",
        }
    }

    fn type_rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(_) | Value::Double(_) => 2,
            Value::String(_) => 3,
            Value::Custom(_) => 4,
            Value::Array(_) => 5,
            Value::Object(_) => 6,
        }
    }

    /// Total AQL ordering: null < bool < number < string < custom < array < object
    ///
    /// Objects compare by their attributes in key order; an attribute
    /// missing on one side compares as null.
    pub fn aql_compare(&self, other: &Value) -> Ordering {
        let rank = self.type_rank().cmp(&other.type_rank());
        if rank != Ordering::Equal {
            return rank;
        }

        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Custom(a), Value::Custom(b)) => a.cmp(b),
            (Value::Array(a), Value::Array(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    let ord = x.aql_compare(y);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                a.len().cmp(&b.len())
            }
            (Value::Object(a), Value::Object(b)) => compare_objects(a, b),
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a.total_cmp(&b),
                _ => Ordering::Equal,
            },
        }
    }

    /// Approximate heap and inline size in bytes, used for memory accounting
    pub fn memory_usage(&self) -> u64 {
        let inline = std::mem::size_of::<Value>() as u64;
        inline
            + match self {
                Value::String(s) => s.capacity() as u64,
                Value::Array(items) => items.iter().map(Value::memory_usage).sum(),
                Value::Object(entries) => entries
                    .iter()
                    .map(|(k, v)| k.capacity() as u64 + v.memory_usage())
                    .sum(),
                Value::Custom(id) => id.key.capacity() as u64,
                _ => 0,
            }
    }

    /// Build from JSON; integers that fit into `i64` stay integral
    pub fn from_json(json: &JsonValue) -> Value {
        match json {
            JsonValue::Null => Value::Null,
            JsonValue::Bool(b) => Value::Bool(*b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Double(n.as_f64().unwrap_or(0.0)),
            },
            JsonValue::String(s) => Value::String(s.clone()),
            JsonValue::Array(items) => Value::Array(items.iter().map(Value::from_json).collect()),
            JsonValue::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Convert to JSON, rendering custom ids through the resolver
    ///
    /// Without a resolver, custom ids are rendered as `<collection-id>/<key>`.
    pub fn to_json(&self, resolver: Option<&dyn IdResolver>) -> Result<JsonValue, ExecutionError> {
        Ok(match self {
            Value::Null => JsonValue::Null,
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Int(n) => JsonValue::Number((*n).into()),
            Value::Double(n) => Number::from_f64(*n).map_or(JsonValue::Null, JsonValue::Number),
            Value::String(s) => JsonValue::String(s.clone()),
            Value::Array(items) => JsonValue::Array(
                items
                    .iter()
                    .map(|v| v.to_json(resolver))
                    .collect::<Result<_, _>>()?,
            ),
            Value::Object(entries) => {
                let mut map = Map::with_capacity(entries.len());
                for (k, v) in entries {
                    map.insert(k.clone(), v.to_json(resolver)?);
                }
                JsonValue::Object(map)
            }
            Value::Custom(id) => JsonValue::String(match resolver {
                Some(resolver) => resolver.resolve(id)?,
                None => id.to_string(),
            }),
        })
    }

    /// Replace a custom id by its external string form; other values are
    /// returned unchanged
    pub fn resolve_custom(&self, resolver: Option<&dyn IdResolver>) -> Result<Value, ExecutionError> {
        match self {
            Value::Custom(id) => Ok(Value::String(match resolver {
                Some(resolver) => resolver.resolve(id)?,
                None => id.to_string(),
            })),
            other => Ok(other.clone()),
        }
    }
}

fn compare_objects(a: &[(String, Value)], b: &[(String, Value)]) -> Ordering {
    let mut keys: Vec<&str> = a.iter().chain(b.iter()).map(|(k, _)| k.as_str()).collect();
    keys.sort_unstable();
    keys.dedup();

    let null = Value::Null;
    for key in keys {
        let lhs = a.iter().find(|(k, _)| k == key).map_or(&null, |(_, v)| v);
        let rhs = b.iter().find(|(k, _)| k == key).map_or(&null, |(_, v)| v);
        let ord = lhs.aql_compare(rhs);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.aql_compare(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        self.aql_compare(other)
    }
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_rank().hash(state);
        match self {
            Value::Null => {}
            Value::Bool(b) => b.hash(state),
            Value::Int(_) | Value::Double(_) => {
                // Int(1) and Double(1.0) are equal and must hash alike
                let n = self.as_f64().unwrap_or(0.0);
                let n = if n == 0.0 { 0.0 } else { n };
                n.to_bits().hash(state);
            }
            Value::String(s) => s.hash(state),
            Value::Custom(id) => id.hash(state),
            Value::Array(items) => {
                items.len().hash(state);
                for item in items {
                    item.hash(state);
                }
            }
            Value::Object(entries) => {
                // Null attributes compare equal to missing ones
                let mut sorted: Vec<_> = entries.iter().filter(|(_, v)| !v.is_null()).collect();
                sorted.sort_by(|x, y| x.0.cmp(&y.0));
                for (key, value) in sorted {
                    key.hash(state);
                    value.hash(state);
                }
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_json(None) {
            Ok(json) => write!(f, "{}", json),
            Err(_) => write!(f, "<unprintable>"),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json(None)
            .map_err(serde::ser::Error::custom)?
            .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        JsonValue::deserialize(deserializer).map(|json| Value::from_json(&json))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Double(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<DocumentId> for Value {
    fn from(id: DocumentId) -> Self {
        Value::Custom(id)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

/// Incremental builder for nested objects
///
/// Attributes are appended in call order. Every `open_object` must be
/// matched by a `close` before `finish`.
#[derive(Debug)]
pub struct ObjectBuilder {
    stack: Vec<(String, Vec<(String, Value)>)>,
    opens: usize,
}

impl Default for ObjectBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectBuilder {
    pub fn new() -> Self {
        Self {
            stack: vec![(String::new(), Vec::new())],
            opens: 0,
        }
    }

    /// Open a nested object under `key`
    pub fn open_object(&mut self, key: &str) {
        self.stack.push((key.to_string(), Vec::new()));
        self.opens += 1;
    }

    /// Add an attribute to the innermost open object
    pub fn add(&mut self, key: &str, value: Value) {
        if let Some((_, entries)) = self.stack.last_mut() {
            entries.push((key.to_string(), value));
        }
    }

    /// Close the innermost nested object
    pub fn close(&mut self) -> Result<(), ExecutionError> {
        if self.stack.len() < 2 {
            return Err(ExecutionError::Internal(
                "closing object without matching open".to_string(),
            ));
        }
        let (key, entries) = self
            .stack
            .pop()
            .ok_or_else(|| ExecutionError::Internal("object builder stack empty".to_string()))?;
        self.add(&key, Value::Object(entries));
        Ok(())
    }

    /// Number of nested objects currently open
    pub fn depth(&self) -> usize {
        self.stack.len() - 1
    }

    /// Number of nested objects opened so far
    pub fn opens(&self) -> usize {
        self.opens
    }

    pub fn finish(mut self) -> Result<Value, ExecutionError> {
        if self.stack.len() != 1 {
            return Err(ExecutionError::Internal(format!(
                "object builder finished with {} unclosed objects",
                self.depth()
            )));
        }
        let (_, entries) = self
            .stack
            .pop()
            .ok_or_else(|| ExecutionError::Internal("object builder stack empty".to_string()))?;
        Ok(Value::Object(entries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;

    #[test]
    fn test_lookup() {
        let doc = Value::from_json(&json!({"a": {"b": 1, "c": [1, 2]}, "d": "x"}));

        assert_eq!(doc.lookup(&["a", "b"]), Lookup::Found(&Value::Int(1)));
        assert!(doc.lookup(&["a", "z"]).is_absent());
        assert!(doc.lookup(&["d", "e"]).is_absent());
        assert_eq!(doc.lookup::<&str>(&[]).found(), Some(&doc));
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(Value::Double(0.5).is_truthy());
        assert!(!Value::from("").is_truthy());
        assert!(Value::Array(vec![]).is_truthy());
    }

    #[test]
    fn test_ordering_across_types() {
        let mut values = vec![
            Value::Object(vec![]),
            Value::from("b"),
            Value::Array(vec![]),
            Value::Int(3),
            Value::Null,
            Value::Bool(true),
            Value::Double(1.5),
        ];
        values.sort();
        assert_eq!(
            values,
            vec![
                Value::Null,
                Value::Bool(true),
                Value::Double(1.5),
                Value::Int(3),
                Value::from("b"),
                Value::Array(vec![]),
                Value::Object(vec![]),
            ]
        );
    }

    #[test]
    fn test_numbers_compare_and_hash_alike() {
        assert_eq!(Value::Int(1), Value::Double(1.0));

        let mut set = HashSet::new();
        set.insert(Value::Int(1));
        assert!(set.contains(&Value::Double(1.0)));
    }

    #[test]
    fn test_object_equality_ignores_order() {
        let a = Value::from_json(&json!({"x": 1, "y": 2}));
        let b = Value::from_json(&json!({"y": 2, "x": 1}));
        assert_eq!(a, b);
    }

    #[test]
    fn test_json_round_trip() {
        let json = json!({"a": [1, 2.5, "s", null, true], "b": {"c": -4}});
        assert_eq!(Value::from_json(&json).to_json(None).unwrap(), json);
    }

    #[test]
    fn test_custom_without_resolver() {
        let id = Value::Custom(DocumentId::new(7, "abc"));
        assert_eq!(id.to_json(None).unwrap(), json!("7/abc"));
        assert_eq!(id.resolve_custom(None).unwrap(), Value::from("7/abc"));
    }

    #[test]
    fn test_object_builder() {
        let mut builder = ObjectBuilder::new();
        builder.open_object("a");
        builder.add("b", Value::Int(1));
        assert_eq!(builder.depth(), 1);
        builder.close().unwrap();
        builder.add("c", Value::Int(3));

        assert_eq!(builder.opens(), 1);
        let value = builder.finish().unwrap();
        assert_eq!(value.to_json(None).unwrap(), json!({"a": {"b": 1}, "c": 3}));
    }

    #[test]
    fn test_object_builder_unbalanced() {
        let mut builder = ObjectBuilder::new();
        assert!(builder.close().is_err());
        builder.open_object("a");
        assert!(builder.finish().is_err());
    }

    #[test]
    fn test_memory_usage_grows_with_content() {
        let small = Value::from("a");
        let large = Value::from("a".repeat(1000));
        assert!(large.memory_usage() > small.memory_usage());
    }
}
