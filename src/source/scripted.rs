use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;

use super::{CounterSnapshot, CounterSource, MemorySnapshot};
use crate::MonitorError;

/// In-memory counter source driven by the caller.
///
/// Collectors and pools keep their insertion order. Useful for tests and for
/// embedding the analyzer over counters gathered elsewhere.
#[derive(Default)]
pub struct ScriptedSource {
    inner: Mutex<Script>,
    poll_delay: Option<Duration>,
}

#[derive(Default)]
struct Script {
    collectors: Vec<(String, u64, u64)>,
    pools: Vec<(String, u64, u64, u64)>,
    unavailable: bool,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every poll sleeps for `delay` before answering.
    pub fn with_poll_delay(delay: Duration) -> Self {
        Self {
            inner: Mutex::new(Script::default()),
            poll_delay: Some(delay),
        }
    }

    /// Set (or add) a collector's cumulative count and time.
    pub fn set_collector(&self, name: &str, count: u64, time_ms: u64) {
        let mut s = self.inner.lock();
        match s.collectors.iter_mut().find(|(n, _, _)| n == name) {
            Some(entry) => {
                entry.1 = count;
                entry.2 = time_ms;
            }
            None => s.collectors.push((name.to_string(), count, time_ms)),
        }
    }

    pub fn remove_collector(&self, name: &str) {
        self.inner.lock().collectors.retain(|(n, _, _)| n != name);
    }

    /// Set (or add) a pool's used/committed/max bytes.
    pub fn set_pool(&self, name: &str, used: u64, committed: u64, max: u64) {
        let mut s = self.inner.lock();
        match s.pools.iter_mut().find(|(n, _, _, _)| n == name) {
            Some(entry) => {
                entry.1 = used;
                entry.2 = committed;
                entry.3 = max;
            }
            None => s.pools.push((name.to_string(), used, committed, max)),
        }
    }

    pub fn remove_pool(&self, name: &str) {
        self.inner.lock().pools.retain(|(n, _, _, _)| n != name);
    }

    /// Make every call fail with `SourceUnavailable` until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.lock().unavailable = unavailable;
    }

    async fn delay(&self) {
        if let Some(d) = self.poll_delay {
            tokio::time::sleep(d).await;
        }
    }

    fn check_available(&self) -> Result<(), MonitorError> {
        if self.inner.lock().unavailable {
            return Err(MonitorError::SourceUnavailable("scripted source offline".into()));
        }
        Ok(())
    }
}

impl CounterSource for ScriptedSource {
    async fn list_collectors(&self) -> Result<Vec<String>, MonitorError> {
        self.check_available()?;
        Ok(self.inner.lock().collectors.iter().map(|(n, _, _)| n.clone()).collect())
    }

    async fn poll_collector(&self, name: &str) -> Result<CounterSnapshot, MonitorError> {
        self.delay().await;
        self.check_available()?;
        let s = self.inner.lock();
        let (_, count, time_ms) = s
            .collectors
            .iter()
            .find(|(n, _, _)| n == name)
            .ok_or_else(|| MonitorError::NotFound(name.to_string()))?;
        Ok(CounterSnapshot {
            name: name.to_string(),
            cumulative_count: *count,
            cumulative_time_ms: *time_ms,
            captured_at: Utc::now(),
        })
    }

    async fn list_memory_pools(&self) -> Result<Vec<String>, MonitorError> {
        self.check_available()?;
        Ok(self.inner.lock().pools.iter().map(|(n, ..)| n.clone()).collect())
    }

    async fn poll_memory_pool(&self, name: &str) -> Result<MemorySnapshot, MonitorError> {
        self.delay().await;
        self.check_available()?;
        let s = self.inner.lock();
        let (_, used, committed, max) = s
            .pools
            .iter()
            .find(|(n, ..)| n == name)
            .ok_or_else(|| MonitorError::NotFound(name.to_string()))?;
        Ok(MemorySnapshot {
            pool_name: name.to_string(),
            used_bytes: *used,
            committed_bytes: *committed,
            max_bytes: *max,
            captured_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn removed_collector_is_not_found() {
        let source = ScriptedSource::new();
        source.set_collector("young", 1, 2);
        source.remove_collector("young");
        let err = source.poll_collector("young").await.unwrap_err();
        assert_eq!(err, MonitorError::NotFound("young".into()));
    }

    #[tokio::test]
    async fn set_collector_overwrites_in_place() {
        let source = ScriptedSource::new();
        source.set_collector("young", 1, 2);
        source.set_collector("old", 0, 0);
        source.set_collector("young", 4, 9);
        assert_eq!(source.list_collectors().await.unwrap(), vec!["young", "old"]);
        let snap = source.poll_collector("young").await.unwrap();
        assert_eq!((snap.cumulative_count, snap.cumulative_time_ms), (4, 9));
    }

    #[tokio::test]
    async fn unavailable_source_fails_listing() {
        let source = ScriptedSource::new();
        source.set_unavailable(true);
        assert!(matches!(
            source.list_memory_pools().await,
            Err(MonitorError::SourceUnavailable(_))
        ));
    }
}
