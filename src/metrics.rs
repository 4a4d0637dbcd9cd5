//! Basic Metrics
//!
//! Operation counters and latency tracking for the gateway.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::RwLock;

/// Metrics collector
#[derive(Debug, Default)]
pub struct Metrics {
    /// Total operations count
    total_ops: AtomicU64,

    /// Operations per command type
    ops_by_command: RwLock<HashMap<String, u64>>,

    /// Latency tracking (simplified)
    latency_sum_us: AtomicU64,
    latency_count: AtomicU64,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an operation
    pub fn record_operation(&self, command: &str, latency: Duration) {
        self.total_ops.fetch_add(1, Ordering::Relaxed);

        {
            let mut ops = self.ops_by_command.write();
            *ops.entry(command.to_string()).or_insert(0) += 1;
        }

        let latency_us = latency.as_micros() as u64;
        self.latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);
        self.latency_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Total operations recorded
    pub fn total_ops(&self) -> u64 {
        self.total_ops.load(Ordering::Relaxed)
    }

    /// Count recorded for one command type
    pub fn ops_for(&self, command: &str) -> u64 {
        self.ops_by_command
            .read()
            .get(command)
            .copied()
            .unwrap_or(0)
    }

    /// Average latency in microseconds across all operations
    pub fn avg_latency_us(&self) -> u64 {
        let count = self.latency_count.load(Ordering::Relaxed);
        if count == 0 {
            return 0;
        }
        self.latency_sum_us.load(Ordering::Relaxed) / count
    }
}
