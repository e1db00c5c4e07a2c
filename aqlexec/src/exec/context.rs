// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Per-query context shared by all blocks of one execution

use crate::config::QueryOptions;
use crate::exec::error::ExecutionError;
use crate::exec::executors::remote::ShardConnection;
use crate::exec::resource_monitor::ResourceMonitor;
use crate::storage::{CollectionReader, IdResolver, IndexReader};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Data sources, options and resource accounting of one query
pub struct QueryContext {
    query_id: Uuid,
    options: QueryOptions,
    monitor: Arc<ResourceMonitor>,
    collections: HashMap<String, Arc<dyn CollectionReader>>,
    indexes: HashMap<String, Arc<dyn IndexReader>>,
    shards: HashMap<String, Arc<dyn ShardConnection>>,
    resolver: Option<Arc<dyn IdResolver>>,
    killed: AtomicBool,
}

impl std::fmt::Debug for QueryContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryContext")
            .field("query_id", &self.query_id)
            .field("options", &self.options)
            .field("collections", &self.collections.keys().collect::<Vec<_>>())
            .field("indexes", &self.indexes.keys().collect::<Vec<_>>())
            .field("shards", &self.shards.keys().collect::<Vec<_>>())
            .field("killed", &self.is_killed())
            .finish()
    }
}

impl QueryContext {
    pub fn new(options: QueryOptions) -> Self {
        let monitor = Arc::new(ResourceMonitor::new(options.memory_limit));
        Self {
            query_id: Uuid::new_v4(),
            options,
            monitor,
            collections: HashMap::new(),
            indexes: HashMap::new(),
            shards: HashMap::new(),
            resolver: None,
            killed: AtomicBool::new(false),
        }
    }

    pub fn query_id(&self) -> Uuid {
        self.query_id
    }

    pub fn options(&self) -> &QueryOptions {
        &self.options
    }

    pub fn batch_size(&self) -> usize {
        self.options.batch_size
    }

    pub fn monitor(&self) -> &Arc<ResourceMonitor> {
        &self.monitor
    }

    pub fn register_collection(&mut self, collection: Arc<dyn CollectionReader>) {
        self.collections.insert(collection.name().to_string(), collection);
    }

    pub fn register_index(&mut self, index: Arc<dyn IndexReader>) {
        self.indexes.insert(index.name().to_string(), index);
    }

    pub fn register_shard(&mut self, name: &str, shard: Arc<dyn ShardConnection>) {
        self.shards.insert(name.to_string(), shard);
    }

    pub fn set_resolver(&mut self, resolver: Arc<dyn IdResolver>) {
        self.resolver = Some(resolver);
    }

    pub fn collection(&self, name: &str) -> Result<Arc<dyn CollectionReader>, ExecutionError> {
        self.collections
            .get(name)
            .cloned()
            .ok_or_else(|| ExecutionError::NotFound(format!("collection '{}'", name)))
    }

    pub fn index(&self, name: &str) -> Result<Arc<dyn IndexReader>, ExecutionError> {
        self.indexes
            .get(name)
            .cloned()
            .ok_or_else(|| ExecutionError::NotFound(format!("index '{}'", name)))
    }

    pub fn shard(&self, name: &str) -> Result<Arc<dyn ShardConnection>, ExecutionError> {
        self.shards
            .get(name)
            .cloned()
            .ok_or_else(|| ExecutionError::NotFound(format!("shard '{}'", name)))
    }

    /// Resolver for custom `_id` values, if one is registered
    pub fn resolver(&self) -> Option<&dyn IdResolver> {
        self.resolver.as_deref()
    }

    /// Abort the query at the next block invocation
    pub fn kill(&self) {
        if !self.killed.swap(true, Ordering::SeqCst) {
            log::info!("Query {} killed", self.query_id);
        }
    }

    pub fn is_killed(&self) -> bool {
        self.killed.load(Ordering::SeqCst)
    }

    pub fn check_killed(&self) -> Result<(), ExecutionError> {
        if self.is_killed() {
            Err(ExecutionError::QueryKilled)
        } else {
            Ok(())
        }
    }

    /// Clear the kill flag so the query can be re-run
    pub fn revive(&self) {
        self.killed.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use serde_json::json;

    #[test]
    fn test_lookup_registered_sources() {
        let store = MemoryStore::from_json(&json!({
            "collections": {"users": [{"_key": "a"}]},
            "indexes": [{"name": "by_key", "collection": "users", "fields": ["_key"]}]
        }))
        .unwrap();
        let mut ctx = QueryContext::new(QueryOptions::default());
        store.register(&mut ctx);

        assert_eq!(ctx.collection("users").unwrap().count(), 1);
        assert!(ctx.index("by_key").is_ok());
        assert!(ctx.resolver().is_some());
        assert!(matches!(ctx.collection("nope"), Err(ExecutionError::NotFound(_))));
        assert!(matches!(ctx.shard("s1"), Err(ExecutionError::NotFound(_))));
    }

    #[test]
    fn test_kill_and_revive() {
        let ctx = QueryContext::new(QueryOptions::default());
        assert!(ctx.check_killed().is_ok());
        ctx.kill();
        assert_eq!(ctx.check_killed(), Err(ExecutionError::QueryKilled));
        ctx.revive();
        assert!(!ctx.is_killed());
    }

    #[test]
    fn test_memory_limit_from_options() {
        let ctx = QueryContext::new(QueryOptions::memory_constrained(4096));
        assert_eq!(ctx.monitor().limit(), 4096);
        assert_eq!(ctx.batch_size(), 100);
    }
}
