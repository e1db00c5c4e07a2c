// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Plan caching to avoid re-parsing and re-validating plans

use crate::config::QueryOptions;
use crate::exec::error::ExecutionError;
use crate::plan::QueryPlan;
use parking_lot::RwLock;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Instant;

/// Key for plan cache entries
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlanCacheKey {
    pub query_hash: u64,
    pub query_len: usize,
    /// Serialized options the plan was prepared for
    pub options: String,
}

impl PlanCacheKey {
    pub fn new(query: &str, options: &QueryOptions) -> Self {
        let mut hasher = DefaultHasher::new();
        query.hash(&mut hasher);
        Self {
            query_hash: hasher.finish(),
            query_len: query.len(),
            options: serde_json::to_string(options).unwrap_or_default(),
        }
    }
}

/// Cached plan entry
#[derive(Debug, Clone)]
pub struct PlanCacheEntry {
    pub plan: Arc<QueryPlan>,
    /// Query text, compared on lookup to rule out hash collisions
    query: String,
    pub usage_count: u64,
    pub last_used: Instant,
}

/// Plan cache statistics
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PlanCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub current_entries: usize,
}

impl PlanCacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Thread-safe LRU cache of validated plans
pub struct PlanCache {
    entries: RwLock<HashMap<PlanCacheKey, PlanCacheEntry>>,
    max_entries: usize,
    stats: RwLock<PlanCacheStats>,
}

impl PlanCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_entries: max_entries.max(1),
            stats: RwLock::new(PlanCacheStats::default()),
        }
    }

    pub fn from_options(options: &QueryOptions) -> Self {
        Self::new(options.max_plan_cache_entries)
    }

    /// Get cached plan if available
    pub fn get(&self, query: &str, options: &QueryOptions) -> Option<Arc<QueryPlan>> {
        let key = PlanCacheKey::new(query, options);
        let mut entries = self.entries.write();
        let mut stats = self.stats.write();

        match entries.get_mut(&key) {
            Some(entry) if entry.query == query => {
                entry.usage_count += 1;
                entry.last_used = Instant::now();
                stats.hits += 1;
                Some(Arc::clone(&entry.plan))
            }
            _ => {
                stats.misses += 1;
                None
            }
        }
    }

    /// Insert plan into cache, evicting the least recently used entry when
    /// full
    pub fn insert(&self, query: &str, options: &QueryOptions, plan: Arc<QueryPlan>) {
        let key = PlanCacheKey::new(query, options);
        let mut entries = self.entries.write();

        if !entries.contains_key(&key) && entries.len() >= self.max_entries {
            let victim = entries
                .iter()
                .min_by(|a, b| {
                    a.1.last_used
                        .cmp(&b.1.last_used)
                        .then(a.1.usage_count.cmp(&b.1.usage_count))
                })
                .map(|(key, _)| key.clone());
            if let Some(victim) = victim {
                entries.remove(&victim);
                self.stats.write().evictions += 1;
                log::debug!("evicted plan from cache ({} entries)", entries.len());
            }
        }

        entries.insert(
            key,
            PlanCacheEntry {
                plan,
                query: query.to_string(),
                usage_count: 0,
                last_used: Instant::now(),
            },
        );
    }

    /// Cached plan for `query`, parsing and validating it on a miss
    pub fn get_or_parse(&self, query: &str, options: &QueryOptions) -> Result<Arc<QueryPlan>, ExecutionError> {
        if let Some(plan) = self.get(query, options) {
            return Ok(plan);
        }
        let plan: Arc<QueryPlan> = Arc::new(query.parse()?);
        self.insert(query, options, Arc::clone(&plan));
        Ok(plan)
    }

    /// Get cache statistics
    pub fn stats(&self) -> PlanCacheStats {
        let mut stats = self.stats.read().clone();
        stats.current_entries = self.entries.read().len();
        stats
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Clear all cached plans
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}
