// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Storage interfaces consumed by the execution core
//!
//! This module provides:
//! - Value type system for documents and registers
//! - Reader traits for collections and sorted indexes
//! - Id resolution for internal document references
//! - An in-memory implementation of all of the above

pub mod memory;
pub mod value;

pub use memory::{MemoryCollection, MemoryIdResolver, MemoryIndex, MemoryStore};
pub use value::{DocumentId, Lookup, ObjectBuilder, Value};

use crate::exec::error::ExecutionError;
use std::ops::Range;

/// Read access to the documents of one collection
///
/// Documents are addressed by scan position; a full scan visits positions
/// `0..count()` in order.
pub trait CollectionReader: Send + Sync {
    fn id(&self) -> u64;

    fn name(&self) -> &str;

    fn count(&self) -> usize;

    fn document_at(&self, position: usize) -> Result<Option<Value>, ExecutionError>;

    fn document_by_key(&self, key: &str) -> Result<Option<Value>, ExecutionError>;
}

/// One entry of a sorted index
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    /// Key of the indexed document
    pub document_key: String,
    /// Indexed values, one per index field
    pub values: Vec<Value>,
}

/// Read access to a sorted index
pub trait IndexReader: Send + Sync {
    fn name(&self) -> &str;

    /// Name of the indexed collection
    fn collection(&self) -> &str;

    /// Indexed attribute paths; `IndexEntry::values` follows this order
    fn fields(&self) -> &[Vec<String>];

    /// Positions of the entries whose first value lies within the inclusive
    /// bounds
    fn range(&self, lower: Option<&Value>, upper: Option<&Value>) -> Result<Range<usize>, ExecutionError>;

    fn entry_at(&self, position: usize) -> Result<Option<IndexEntry>, ExecutionError>;
}

/// Turns internal document references into external `collection/key` ids
pub trait IdResolver: Send + Sync {
    fn resolve(&self, id: &DocumentId) -> Result<String, ExecutionError>;
}
