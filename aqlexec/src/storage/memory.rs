// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! In-memory collections and indexes for testing and the CLI

use super::{CollectionReader, DocumentId, IdResolver, IndexEntry, IndexReader, Value};
use crate::exec::context::QueryContext;
use crate::exec::error::ExecutionError;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;

/// In-memory collection
///
/// Every stored document carries `_key` and an `_id` custom value.
#[derive(Debug)]
pub struct MemoryCollection {
    id: u64,
    name: String,
    documents: Vec<Value>,
    by_key: HashMap<String, usize>,
}

impl MemoryCollection {
    /// Create a collection from JSON documents
    ///
    /// Documents without `_key` get their position as key.
    pub fn new(id: u64, name: &str, documents: &[JsonValue]) -> Result<Self, ExecutionError> {
        let mut stored = Vec::with_capacity(documents.len());
        let mut by_key = HashMap::with_capacity(documents.len());

        for (position, document) in documents.iter().enumerate() {
            let object = document.as_object().ok_or_else(|| {
                ExecutionError::BadParameter(format!(
                    "document {} in collection '{}' is not an object",
                    position, name
                ))
            })?;

            let key = match object.get("_key") {
                Some(JsonValue::String(key)) => key.clone(),
                Some(other) => {
                    return Err(ExecutionError::BadParameter(format!(
                        "invalid _key {} in collection '{}'",
                        other, name
                    )))
                }
                None => position.to_string(),
            };
            if by_key.insert(key.clone(), position).is_some() {
                return Err(ExecutionError::BadParameter(format!(
                    "duplicate _key '{}' in collection '{}'",
                    key, name
                )));
            }

            let mut entries = Vec::with_capacity(object.len() + 2);
            entries.push(("_key".to_string(), Value::String(key.clone())));
            entries.push(("_id".to_string(), Value::Custom(DocumentId::new(id, key))));
            for (attribute, value) in object {
                if attribute != "_key" && attribute != "_id" {
                    entries.push((attribute.clone(), Value::from_json(value)));
                }
            }
            stored.push(Value::Object(entries));
        }

        Ok(Self {
            id,
            name: name.to_string(),
            documents: stored,
            by_key,
        })
    }

    pub fn documents(&self) -> &[Value] {
        &self.documents
    }
}

impl CollectionReader for MemoryCollection {
    fn id(&self) -> u64 {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn count(&self) -> usize {
        self.documents.len()
    }

    fn document_at(&self, position: usize) -> Result<Option<Value>, ExecutionError> {
        Ok(self.documents.get(position).cloned())
    }

    fn document_by_key(&self, key: &str) -> Result<Option<Value>, ExecutionError> {
        Ok(self
            .by_key
            .get(key)
            .and_then(|&position| self.documents.get(position))
            .cloned())
    }
}

/// Sorted in-memory index over one collection
#[derive(Debug)]
pub struct MemoryIndex {
    name: String,
    collection: String,
    fields: Vec<Vec<String>>,
    entries: Vec<IndexEntry>,
}

impl MemoryIndex {
    /// Build the index from the current documents of `collection`
    ///
    /// Missing attributes are indexed as null. Entries are ordered by their
    /// values, then by document key.
    pub fn build(name: &str, collection: &MemoryCollection, fields: Vec<Vec<String>>) -> Result<Self, ExecutionError> {
        if fields.is_empty() || fields.iter().any(Vec::is_empty) {
            return Err(ExecutionError::BadParameter(format!(
                "index '{}' needs at least one non-empty field",
                name
            )));
        }

        let mut entries: Vec<IndexEntry> = collection
            .documents
            .iter()
            .map(|document| {
                let document_key = document
                    .get("_key")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let values = fields
                    .iter()
                    .map(|field| document.lookup(field).found().cloned().unwrap_or(Value::Null))
                    .collect();
                IndexEntry { document_key, values }
            })
            .collect();
        entries.sort_by(|a, b| a.values.cmp(&b.values).then_with(|| a.document_key.cmp(&b.document_key)));

        Ok(Self {
            name: name.to_string(),
            collection: collection.name.clone(),
            fields,
            entries,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl IndexReader for MemoryIndex {
    fn name(&self) -> &str {
        &self.name
    }

    fn collection(&self) -> &str {
        &self.collection
    }

    fn fields(&self) -> &[Vec<String>] {
        &self.fields
    }

    fn range(&self, lower: Option<&Value>, upper: Option<&Value>) -> Result<Range<usize>, ExecutionError> {
        let first = |entry: &IndexEntry| entry.values.first().cloned().unwrap_or(Value::Null);
        let start = match lower {
            Some(lower) => self.entries.partition_point(|entry| first(entry) < *lower),
            None => 0,
        };
        let end = match upper {
            Some(upper) => self.entries.partition_point(|entry| first(entry) <= *upper),
            None => self.entries.len(),
        };
        Ok(start..end.max(start))
    }

    fn entry_at(&self, position: usize) -> Result<Option<IndexEntry>, ExecutionError> {
        Ok(self.entries.get(position).cloned())
    }
}

/// Resolves custom ids to `<collection name>/<key>`
#[derive(Debug, Default)]
pub struct MemoryIdResolver {
    names: HashMap<u64, String>,
}

impl MemoryIdResolver {
    pub fn new(names: HashMap<u64, String>) -> Self {
        Self { names }
    }
}

impl IdResolver for MemoryIdResolver {
    fn resolve(&self, id: &DocumentId) -> Result<String, ExecutionError> {
        let name = self
            .names
            .get(&id.collection_id)
            .ok_or_else(|| ExecutionError::NotFound(format!("collection id {}", id.collection_id)))?;
        Ok(format!("{}/{}", name, id.key))
    }
}

/// A set of in-memory collections and indexes
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: HashMap<String, Arc<MemoryCollection>>,
    indexes: HashMap<String, Arc<MemoryIndex>>,
    next_id: u64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a store from its JSON description
    ///
    /// ```json
    /// {
    ///   "collections": {"users": [{"_key": "a", "age": 30}]},
    ///   "indexes": [{"name": "by_age", "collection": "users", "fields": ["age"]}]
    /// }
    /// ```
    pub fn from_json(json: &JsonValue) -> Result<Self, ExecutionError> {
        let mut store = Self::new();

        let collections = json
            .get("collections")
            .and_then(JsonValue::as_object)
            .ok_or_else(|| ExecutionError::type_mismatch("collections", "an object"))?;
        for (name, documents) in collections {
            let documents = documents
                .as_array()
                .ok_or_else(|| ExecutionError::type_mismatch(name, "an array of documents"))?;
            store.add_collection(name, documents)?;
        }

        if let Some(indexes) = json.get("indexes") {
            let indexes = indexes
                .as_array()
                .ok_or_else(|| ExecutionError::type_mismatch("indexes", "an array"))?;
            for index in indexes {
                let name = index
                    .get("name")
                    .and_then(JsonValue::as_str)
                    .ok_or_else(|| ExecutionError::type_mismatch("indexes[].name", "a string"))?;
                let collection = index
                    .get("collection")
                    .and_then(JsonValue::as_str)
                    .ok_or_else(|| ExecutionError::type_mismatch("indexes[].collection", "a string"))?;
                let fields = index
                    .get("fields")
                    .and_then(JsonValue::as_array)
                    .ok_or_else(|| ExecutionError::type_mismatch("indexes[].fields", "an array"))?
                    .iter()
                    .map(|field| {
                        field
                            .as_str()
                            .map(|s| s.split('.').map(str::to_string).collect())
                            .ok_or_else(|| ExecutionError::type_mismatch("indexes[].fields", "an array of strings"))
                    })
                    .collect::<Result<Vec<Vec<String>>, _>>()?;
                store.add_index(name, collection, fields)?;
            }
        }

        Ok(store)
    }

    pub fn add_collection(&mut self, name: &str, documents: &[JsonValue]) -> Result<Arc<MemoryCollection>, ExecutionError> {
        if self.collections.contains_key(name) {
            return Err(ExecutionError::BadParameter(format!("duplicate collection '{}'", name)));
        }
        self.next_id += 1;
        let collection = Arc::new(MemoryCollection::new(self.next_id, name, documents)?);
        self.collections.insert(name.to_string(), Arc::clone(&collection));
        log::debug!("loaded collection '{}' with {} documents", name, collection.count());
        Ok(collection)
    }

    pub fn add_index(&mut self, name: &str, collection: &str, fields: Vec<Vec<String>>) -> Result<Arc<MemoryIndex>, ExecutionError> {
        let source = self
            .collections
            .get(collection)
            .ok_or_else(|| ExecutionError::NotFound(format!("collection '{}'", collection)))?;
        let index = Arc::new(MemoryIndex::build(name, source, fields)?);
        self.indexes.insert(name.to_string(), Arc::clone(&index));
        Ok(index)
    }

    pub fn collection(&self, name: &str) -> Option<&Arc<MemoryCollection>> {
        self.collections.get(name)
    }

    pub fn index(&self, name: &str) -> Option<&Arc<MemoryIndex>> {
        self.indexes.get(name)
    }

    pub fn resolver(&self) -> Arc<MemoryIdResolver> {
        Arc::new(MemoryIdResolver::new(
            self.collections
                .values()
                .map(|c| (c.id, c.name.clone()))
                .collect(),
        ))
    }

    /// Make all collections, indexes and the id resolver available to a query
    pub fn register(&self, ctx: &mut QueryContext) {
        for collection in self.collections.values() {
            ctx.register_collection(Arc::clone(collection) as Arc<dyn CollectionReader>);
        }
        for index in self.indexes.values() {
            ctx.register_index(Arc::clone(index) as Arc<dyn IndexReader>);
        }
        ctx.set_resolver(self.resolver());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> MemoryStore {
        MemoryStore::from_json(&json!({
            "collections": {
                "users": [
                    {"_key": "u1", "age": 30, "name": "ann"},
                    {"_key": "u2", "age": 25},
                    {"_key": "u3", "age": 41, "name": "cid"}
                ]
            },
            "indexes": [{"name": "by_age", "collection": "users", "fields": ["age", "name"]}]
        }))
        .unwrap()
    }

    #[test]
    fn test_documents_get_system_attributes() {
        let store = store();
        let users = store.collection("users").unwrap();
        let doc = users.document_by_key("u2").unwrap().unwrap();

        assert_eq!(doc.get("_key"), Some(&Value::from("u2")));
        assert!(matches!(doc.get("_id"), Some(Value::Custom(_))));
        assert_eq!(users.count(), 3);
    }

    #[test]
    fn test_default_keys_and_duplicates() {
        let collection = MemoryCollection::new(1, "c", &[json!({"x": 1}), json!({"x": 2})]).unwrap();
        assert!(collection.document_by_key("1").unwrap().is_some());

        let err = MemoryCollection::new(1, "c", &[json!({"_key": "a"}), json!({"_key": "a"})]);
        assert!(matches!(err, Err(ExecutionError::BadParameter(_))));
    }

    #[test]
    fn test_index_order_and_range() {
        let store = store();
        let index = store.index("by_age").unwrap();

        let keys: Vec<_> = (0..index.len())
            .map(|i| index.entry_at(i).unwrap().unwrap().document_key)
            .collect();
        assert_eq!(keys, vec!["u2", "u1", "u3"]);

        let range = index.range(Some(&Value::Int(26)), Some(&Value::Int(41))).unwrap();
        assert_eq!(range, 1..3);
        let entry = index.entry_at(range.start).unwrap().unwrap();
        assert_eq!(entry.values, vec![Value::Int(30), Value::from("ann")]);
    }

    #[test]
    fn test_missing_attribute_indexed_as_null() {
        let store = store();
        let index = store.index("by_age").unwrap();
        let entry = index.entry_at(0).unwrap().unwrap();
        assert_eq!(entry.values[1], Value::Null);
    }

    #[test]
    fn test_resolver() {
        let store = store();
        let resolver = store.resolver();
        let users = store.collection("users").unwrap();
        assert_eq!(resolver.resolve(&DocumentId::new(users.id(), "u1")).unwrap(), "users/u1");
        assert!(resolver.resolve(&DocumentId::new(999, "x")).is_err());
    }

    #[test]
    fn test_index_on_unknown_collection() {
        let mut store = MemoryStore::new();
        let err = store.add_index("i", "nope", vec![vec!["a".to_string()]]).unwrap_err();
        assert!(matches!(err, ExecutionError::NotFound(_)));
    }
}
