// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Caching of prepared plans

pub mod plan_cache;

pub use plan_cache::{PlanCache, PlanCacheEntry, PlanCacheKey, PlanCacheStats};
