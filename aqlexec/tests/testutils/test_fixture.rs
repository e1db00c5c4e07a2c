//! Test fixture for aqlexec integration tests
//!
//! Holds an in-memory store and the shard connections a query may use, and
//! builds a fresh query context for every run.

use aqlexec::{
    ExecutionEngine, ExecutionError, MemoryStore, QueryContext, QueryOptions, QueryPlan, QueryResult,
    ShardConnection,
};
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;

pub struct TestFixture {
    store: MemoryStore,
    shards: Vec<(String, Arc<dyn ShardConnection>)>,
}

impl TestFixture {
    pub fn new(data: JsonValue) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        Self {
            store: MemoryStore::from_json(&data).expect("Failed to load test data"),
            shards: Vec::new(),
        }
    }

    /// Four users with ages, cities, and an index on age
    pub fn users() -> Self {
        Self::new(json!({
            "collections": {
                "users": [
                    {"_key": "a", "name": "ann", "age": 31, "city": "Oslo"},
                    {"_key": "b", "name": "bob", "age": 17, "city": "Rome"},
                    {"_key": "c", "name": "cid", "age": 45, "city": "Oslo"},
                    {"_key": "d", "name": "dee", "age": 22, "city": "Lima"}
                ]
            },
            "indexes": [{"name": "by_age", "collection": "users", "fields": ["age"]}]
        }))
    }

    /// Collection `numbers` with documents `{"n": 0}` to `{"n": count - 1}`
    pub fn numbers(count: usize) -> Self {
        let documents: Vec<_> = (0..count).map(|n| json!({"_key": format!("k{}", n), "n": n})).collect();
        Self::new(json!({"collections": {"numbers": documents}}))
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    pub fn with_shard(mut self, name: &str, shard: Arc<dyn ShardConnection>) -> Self {
        self.shards.push((name.to_string(), shard));
        self
    }

    pub fn context(&self, options: QueryOptions) -> QueryContext {
        let mut ctx = QueryContext::new(options);
        self.store.register(&mut ctx);
        for (name, shard) in &self.shards {
            ctx.register_shard(name, Arc::clone(shard));
        }
        ctx
    }

    pub fn try_engine(&self, plan: JsonValue, options: QueryOptions) -> Result<ExecutionEngine, ExecutionError> {
        let plan = QueryPlan::from_json(&plan)?;
        ExecutionEngine::instantiate(Arc::new(plan), Arc::new(self.context(options)))
    }

    pub fn engine(&self, plan: JsonValue, options: QueryOptions) -> ExecutionEngine {
        self.try_engine(plan, options).expect("Failed to instantiate plan")
    }

    pub fn run(&self, plan: JsonValue, options: QueryOptions) -> QueryResult {
        self.engine(plan, options).run().expect("Query failed")
    }

    pub fn run_err(&self, plan: JsonValue, options: QueryOptions) -> ExecutionError {
        match self.try_engine(plan, options) {
            Ok(mut engine) => engine.run().expect_err("Query should fail"),
            Err(error) => error,
        }
    }
}

/// Options with fullCount reporting enabled
pub fn full_count_options() -> QueryOptions {
    QueryOptions {
        full_count: true,
        ..QueryOptions::default()
    }
}

/// Options with a small batch size
pub fn batched(batch_size: usize) -> QueryOptions {
    QueryOptions {
        batch_size,
        ..QueryOptions::default()
    }
}

/// `{"type": "attribute", "register": r, "path": path}`
pub fn attribute(register: usize, path: &str) -> JsonValue {
    json!({"type": "attribute", "register": register, "path": path})
}

/// Scan of `collection` projecting `projections`
pub fn scan(id: u64, collection: &str, projections: &[&str]) -> JsonValue {
    json!({"id": id, "type": "enumerateCollection", "collection": collection, "projections": projections})
}
