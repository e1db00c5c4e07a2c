// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Per-query memory accounting
//!
//! Tracks current and peak memory usage of one query and enforces the
//! configured limit. Operators running on different threads share one
//! monitor through an `Arc`; every update is a plain atomic operation.

use crate::exec::error::ExecutionError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Memory usage tracker for one query
///
/// A limit of `0` means unlimited.
///
/// # Usage
/// ```ignore
/// let monitor = ResourceMonitor::new(100 * 1024 * 1024); // 100MB limit
///
/// monitor.increase_memory_usage(1024)?;
/// // ... build the data structure ...
/// monitor.decrease_memory_usage(1024);
/// ```
#[derive(Default)]
pub struct ResourceMonitor {
    /// Maximum allowed memory in bytes (0 = unlimited)
    limit: u64,

    /// Currently accounted memory
    current: AtomicU64,

    /// Highest value `current` ever reached
    peak: AtomicU64,
}

impl std::fmt::Debug for ResourceMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceMonitor")
            .field("limit", &self.limit)
            .field("current", &self.current.load(Ordering::Relaxed))
            .field("peak", &self.peak.load(Ordering::Relaxed))
            .finish()
    }
}

impl ResourceMonitor {
    /// Create a monitor with the given limit in bytes
    pub fn new(limit: u64) -> Self {
        Self {
            limit,
            current: AtomicU64::new(0),
            peak: AtomicU64::new(0),
        }
    }

    /// Create an unlimited monitor (for testing or admin queries)
    pub fn unlimited() -> Self {
        Self::new(0)
    }

    /// Account for `bytes` more memory
    ///
    /// # Returns
    /// - `Ok(())` if the query stays within its limit
    /// - `Err(ExecutionError::ResourceLimit)` otherwise; the addition is rolled
    ///   back so that the accounting stays consistent
    pub fn increase_memory_usage(&self, bytes: u64) -> Result<(), ExecutionError> {
        let previous = self.current.fetch_add(bytes, Ordering::Relaxed);
        // An overflowing sum is over any limit, including "unlimited"
        let now = match previous.checked_add(bytes) {
            Some(now) if self.limit == 0 || now <= self.limit => now,
            now => {
                // wrapping subtraction also undoes a wrapped addition
                self.current.fetch_sub(bytes, Ordering::Relaxed);
                let requested = now.unwrap_or(u64::MAX);
                log::warn!(
                    "memory limit of {} bytes hit, attempted usage {} bytes",
                    self.limit,
                    requested
                );
                return Err(ExecutionError::ResourceLimit {
                    limit: self.limit,
                    requested,
                });
            }
        };

        // Sibling operators may raise the peak concurrently; retry until the
        // stored peak is at least our value.
        let mut peak = self.peak.load(Ordering::Relaxed);
        while now > peak {
            match self
                .peak
                .compare_exchange_weak(peak, now, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => break,
                Err(actual) => peak = actual,
            }
        }

        Ok(())
    }

    /// Give back `bytes` previously added with `increase_memory_usage`
    ///
    /// Callers must never release more than they added.
    pub fn decrease_memory_usage(&self, bytes: u64) {
        let previous = self.current.fetch_sub(bytes, Ordering::Relaxed);
        debug_assert!(
            previous >= bytes,
            "releasing {} bytes but only {} accounted",
            bytes,
            previous
        );
    }

    /// Reset current and peak usage for a fresh execution of a cached plan
    pub fn clear(&self) {
        self.current.store(0, Ordering::Relaxed);
        self.peak.store(0, Ordering::Relaxed);
    }

    /// Currently accounted memory in bytes
    pub fn current(&self) -> u64 {
        self.current.load(Ordering::Relaxed)
    }

    /// Peak accounted memory in bytes
    pub fn peak(&self) -> u64 {
        self.peak.load(Ordering::Relaxed)
    }

    /// Memory limit in bytes, 0 if unlimited
    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Remaining bytes until the limit is hit
    pub fn available(&self) -> Option<u64> {
        if self.limit == 0 {
            None
        } else {
            Some(self.limit.saturating_sub(self.current()))
        }
    }

    /// Snapshot of the monitor for reporting
    pub fn stats(&self) -> MemoryStats {
        MemoryStats {
            limit: self.limit,
            current: self.current(),
            peak: self.peak(),
        }
    }
}

/// Accounting guard: releases its bytes when dropped
///
/// Operators that buffer rows grow the scope as they go; once ownership of
/// the memory moves elsewhere, `steal` hands the accounting over.
pub struct ResourceUsageScope {
    monitor: Arc<ResourceMonitor>,
    value: u64,
}

impl ResourceUsageScope {
    /// Create an empty scope
    pub fn new(monitor: Arc<ResourceMonitor>) -> Self {
        Self { monitor, value: 0 }
    }

    /// Create a scope that accounts for `bytes` right away
    pub fn with_value(monitor: Arc<ResourceMonitor>, bytes: u64) -> Result<Self, ExecutionError> {
        monitor.increase_memory_usage(bytes)?;
        Ok(Self {
            monitor,
            value: bytes,
        })
    }

    pub fn increase(&mut self, bytes: u64) -> Result<(), ExecutionError> {
        self.monitor.increase_memory_usage(bytes)?;
        self.value += bytes;
        Ok(())
    }

    pub fn decrease(&mut self, bytes: u64) {
        debug_assert!(self.value >= bytes);
        let bytes = bytes.min(self.value);
        self.monitor.decrease_memory_usage(bytes);
        self.value -= bytes;
    }

    /// Stop tracking without releasing; returns the bytes handed over
    pub fn steal(&mut self) -> u64 {
        std::mem::take(&mut self.value)
    }

    pub fn tracked(&self) -> u64 {
        self.value
    }

    pub fn monitor(&self) -> &Arc<ResourceMonitor> {
        &self.monitor
    }
}

impl Drop for ResourceUsageScope {
    fn drop(&mut self) {
        if self.value > 0 {
            self.monitor.decrease_memory_usage(self.value);
        }
    }
}

impl std::fmt::Debug for ResourceUsageScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceUsageScope")
            .field("value", &self.value)
            .finish()
    }
}

/// Memory usage statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryStats {
    /// Memory limit in bytes (0 = unlimited)
    pub limit: u64,

    /// Currently accounted memory in bytes
    pub current: u64,

    /// Peak accounted memory in bytes
    pub peak: u64,
}

impl MemoryStats {
    /// Format as human-readable string
    pub fn format_human_readable(&self) -> String {
        let limit = if self.limit == 0 {
            "unlimited".to_string()
        } else {
            Self::format_bytes(self.limit)
        };
        format!(
            "Memory: {}/{}, Peak: {}",
            Self::format_bytes(self.current),
            limit,
            Self::format_bytes(self.peak)
        )
    }

    /// Format bytes as human-readable (KB, MB, GB)
    pub fn format_bytes(bytes: u64) -> String {
        const KB: u64 = 1024;
        const MB: u64 = KB * 1024;
        const GB: u64 = MB * 1024;

        if bytes >= GB {
            format!("{:.2}GB", bytes as f64 / GB as f64)
        } else if bytes >= MB {
            format!("{:.2}MB", bytes as f64 / MB as f64)
        } else if bytes >= KB {
            format!("{:.2}KB", bytes as f64 / KB as f64)
        } else {
            format!("{}B", bytes)
        }
    }
}
