pub mod redis_info;
pub mod scripted;

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::MonitorError;

pub use redis_info::RedisSource;
pub use scripted::ScriptedSource;

/// One reading of a collector's cumulative counters.
/// Produced fresh on every poll and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CounterSnapshot {
    pub name: String,
    pub cumulative_count: u64,
    pub cumulative_time_ms: u64,
    pub captured_at: DateTime<Utc>,
}

/// One reading of a memory pool. `max_bytes == 0` means the pool is unbounded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemorySnapshot {
    pub pool_name: String,
    pub used_bytes: u64,
    pub committed_bytes: u64,
    pub max_bytes: u64,
    pub captured_at: DateTime<Utc>,
}

impl MemorySnapshot {
    /// `used / max * 100`, or `None` when the pool has no defined maximum.
    pub fn usage_percent(&self) -> Option<f64> {
        if self.max_bytes == 0 {
            return None;
        }
        Some(self.used_bytes as f64 / self.max_bytes as f64 * 100.0)
    }
}

/// Read-only view over a host's collector and memory counters.
///
/// Implementations must not mutate host state. A name that disappeared
/// between listing and polling yields [`MonitorError::NotFound`]; a host
/// that cannot be reached at all yields [`MonitorError::SourceUnavailable`].
pub trait CounterSource: Send + Sync + 'static {
    fn list_collectors(&self) -> impl Future<Output = Result<Vec<String>, MonitorError>> + Send;

    fn poll_collector(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<CounterSnapshot, MonitorError>> + Send;

    fn list_memory_pools(&self) -> impl Future<Output = Result<Vec<String>, MonitorError>> + Send;

    fn poll_memory_pool(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<MemorySnapshot, MonitorError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(used_mb: u64, max_mb: u64) -> MemorySnapshot {
        MemorySnapshot {
            pool_name: "heap".into(),
            used_bytes: used_mb * 1024 * 1024,
            committed_bytes: used_mb * 1024 * 1024,
            max_bytes: max_mb * 1024 * 1024,
            captured_at: Utc::now(),
        }
    }

    #[test]
    fn usage_percent_of_bounded_pool() {
        let pct = pool(850, 1000).usage_percent().unwrap();
        assert!((pct - 85.0).abs() < 1e-9);
    }

    #[test]
    fn unbounded_pool_has_no_usage_percent() {
        assert_eq!(pool(850, 0).usage_percent(), None);
    }
}
