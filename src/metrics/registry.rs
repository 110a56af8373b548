use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;

use super::accumulator::{AccumulatedStats, StatAccumulator};
use super::percentiles::PauseDistribution;
use crate::source::MemorySnapshot;

// ─── Public types ────────────────────────────────────────────────

/// Owner of every accumulator and retained memory snapshot for the current
/// monitoring window.
///
/// The sampler task writes, the analyzer and dashboards read. Tracked names
/// are append-only within a window; [`StatsRegistry::reset`] opens a new one.
pub struct StatsRegistry {
    inner: RwLock<Inner>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NameKind {
    Collector,
    Pool,
}

/// A name that could not be read, and why.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedName {
    pub name: String,
    pub kind: NameKind,
    pub reason: String,
}

/// Read view of one collector at a given window end.
#[derive(Debug, Clone, Serialize)]
pub struct CollectorView {
    pub name: String,
    pub stats: AccumulatedStats,
    pub average_pause_ms: f64,
    pub frequency_per_sec: f64,
    pub overhead_percent: f64,
    pub pauses: PauseDistribution,
}

/// Live state shipped to dashboards; never stops the sampler.
#[derive(Debug, Clone, Serialize)]
pub struct LiveSnapshot {
    pub running: bool,
    pub ticks: u64,
    pub window_started_at: DateTime<Utc>,
    pub elapsed_secs: f64,
    pub collectors: Vec<CollectorView>,
    pub pools: Vec<MemorySnapshot>,
    pub skipped_last_tick: Vec<SkippedName>,
}

// ─── Internal state ──────────────────────────────────────────────

struct Inner {
    collectors: Vec<TrackedCollector>,
    pools: Vec<TrackedPool>,
    skipped_last_tick: Vec<SkippedName>,
    window_started_at: DateTime<Utc>,
    window_ended_at: Option<DateTime<Utc>>,
    ticks: u64,
}

struct TrackedCollector {
    name: String,
    acc: Arc<Mutex<StatAccumulator>>,
}

/// First and most recent reading of a pool within the window.
struct TrackedPool {
    baseline: MemorySnapshot,
    latest: MemorySnapshot,
}

// ─── StatsRegistry impl ──────────────────────────────────────────

impl StatsRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::new()),
        }
    }

    /// Drop everything and open a fresh window starting now.
    pub fn reset(&self) {
        *self.inner.write() = Inner::new();
    }

    /// The accumulator for `name`, created on first sight.
    pub fn accumulator(&self, name: &str) -> Arc<Mutex<StatAccumulator>> {
        if let Some(acc) = self.inner.read().find(name) {
            return acc;
        }

        let mut inner = self.inner.write();
        // Re-check: another writer may have inserted it in between.
        if let Some(acc) = inner.find(name) {
            return acc;
        }
        let acc = Arc::new(Mutex::new(StatAccumulator::new(inner.window_started_at)));
        inner.collectors.push(TrackedCollector {
            name: name.to_string(),
            acc: acc.clone(),
        });
        acc
    }

    /// Retain `snapshot` as the pool's latest reading (and as its baseline
    /// if this is the first one in the window).
    pub fn observe_pool(&self, snapshot: MemorySnapshot) {
        let mut inner = self.inner.write();
        match inner
            .pools
            .iter_mut()
            .find(|p| p.baseline.pool_name == snapshot.pool_name)
        {
            Some(pool) => pool.latest = snapshot,
            None => inner.pools.push(TrackedPool {
                baseline: snapshot.clone(),
                latest: snapshot,
            }),
        }
    }

    pub fn finish_tick(&self, skipped: Vec<SkippedName>) {
        let mut inner = self.inner.write();
        inner.ticks += 1;
        inner.skipped_last_tick = skipped;
    }

    /// Freeze the window end. Later calls keep the first end.
    pub fn close_window(&self) {
        let mut inner = self.inner.write();
        if inner.window_ended_at.is_none() {
            inner.window_ended_at = Some(Utc::now());
        }
    }

    pub fn window(&self) -> (DateTime<Utc>, Option<DateTime<Utc>>) {
        let inner = self.inner.read();
        (inner.window_started_at, inner.window_ended_at)
    }

    pub fn ticks(&self) -> u64 {
        self.inner.read().ticks
    }

    /// Every tracked collector in first-seen order, evaluated at `end`.
    pub fn collectors(&self, end: DateTime<Utc>) -> Vec<CollectorView> {
        // Clone the handles so no accumulator lock is taken under the list lock.
        let tracked: Vec<(String, Arc<Mutex<StatAccumulator>>)> = self
            .inner
            .read()
            .collectors
            .iter()
            .map(|c| (c.name.clone(), c.acc.clone()))
            .collect();

        tracked
            .into_iter()
            .map(|(name, acc)| {
                let acc = acc.lock();
                CollectorView {
                    name,
                    stats: acc.stats().clone(),
                    average_pause_ms: acc.average_pause(),
                    frequency_per_sec: acc.frequency_at(end),
                    overhead_percent: acc.overhead_percent_at(end),
                    pauses: acc.pauses(),
                }
            })
            .collect()
    }

    pub fn pool_baseline(&self, pool_name: &str) -> Option<MemorySnapshot> {
        self.inner
            .read()
            .pools
            .iter()
            .find(|p| p.baseline.pool_name == pool_name)
            .map(|p| p.baseline.clone())
    }

    pub fn latest_pools(&self) -> Vec<MemorySnapshot> {
        self.inner.read().pools.iter().map(|p| p.latest.clone()).collect()
    }

    pub fn skipped_last_tick(&self) -> Vec<SkippedName> {
        self.inner.read().skipped_last_tick.clone()
    }

    pub fn snapshot(&self, running: bool) -> LiveSnapshot {
        let (started, ended) = self.window();
        let end = ended.unwrap_or_else(Utc::now);
        LiveSnapshot {
            running,
            ticks: self.ticks(),
            window_started_at: started,
            elapsed_secs: (end - started).num_milliseconds().max(0) as f64 / 1000.0,
            collectors: self.collectors(end),
            pools: self.latest_pools(),
            skipped_last_tick: self.skipped_last_tick(),
        }
    }
}

impl Default for StatsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Inner impl ──────────────────────────────────────────────────

impl Inner {
    fn new() -> Self {
        Self {
            collectors: Vec::new(),
            pools: Vec::new(),
            skipped_last_tick: Vec::new(),
            window_started_at: Utc::now(),
            window_ended_at: None,
            ticks: 0,
        }
    }

    fn find(&self, name: &str) -> Option<Arc<Mutex<StatAccumulator>>> {
        self.collectors
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.acc.clone())
    }
}
