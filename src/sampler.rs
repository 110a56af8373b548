//! Periodic sampling task.
//!
//! One tokio task per running sampler. Ticks run back to back inside that
//! task, so they never overlap; a tick that overruns its slot makes the
//! ticker skip the missed slots instead of bursting. The first tick fires
//! immediately on start.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::metrics::{Delta, NameKind, SkippedName, StatsRegistry};
use crate::source::CounterSource;
use crate::MonitorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplerState {
    Stopped,
    Running,
}

pub struct Sampler<S> {
    source: Arc<S>,
    registry: Arc<StatsRegistry>,
    poll_timeout: Duration,
    running: AtomicBool,
    task: tokio::sync::Mutex<Option<RunningTask>>,
}

struct RunningTask {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl<S: CounterSource> Sampler<S> {
    pub fn new(source: Arc<S>, registry: Arc<StatsRegistry>, poll_timeout: Duration) -> Self {
        Self {
            source,
            registry,
            poll_timeout,
            running: AtomicBool::new(false),
            task: tokio::sync::Mutex::new(None),
        }
    }

    pub fn state(&self) -> SamplerState {
        if self.running.load(Ordering::SeqCst) {
            SamplerState::Running
        } else {
            SamplerState::Stopped
        }
    }

    /// Stopped → Running. Opens a fresh window in the registry.
    ///
    /// Fails with `SchedulerAlreadyRunning` if already running and with
    /// `SourceUnavailable` if the source cannot list its collectors; in both
    /// cases the registry is left untouched.
    pub async fn start(&self, interval: Duration) -> Result<(), MonitorError> {
        // Held for the whole transition so two starts cannot both spawn.
        let mut guard = self.task.lock().await;
        if guard.is_some() {
            return Err(MonitorError::SchedulerAlreadyRunning);
        }

        let collectors = bounded(self.poll_timeout, self.source.list_collectors())
            .await
            .map_err(unavailable)?;

        self.registry.reset();

        let (shutdown, shutdown_rx) = oneshot::channel();
        let source = self.source.clone();
        let registry = self.registry.clone();
        let poll_timeout = self.poll_timeout;
        let handle = tokio::spawn(async move {
            run(source, registry, interval, poll_timeout, shutdown_rx).await;
        });

        *guard = Some(RunningTask { shutdown, handle });
        self.running.store(true, Ordering::SeqCst);
        tracing::info!(
            interval_ms = interval.as_millis() as u64,
            collectors = collectors.len(),
            "sampler started"
        );
        Ok(())
    }

    /// Running → Stopped. Returns only after the task has exited, so no tick
    /// runs once this resolves. Calling it while stopped is a no-op.
    pub async fn stop(&self) {
        let mut guard = self.task.lock().await;
        let Some(task) = guard.take() else {
            return;
        };

        // The task may already be gone; either way we wait for it.
        let _ = task.shutdown.send(());
        if let Err(err) = task.handle.await {
            tracing::error!(%err, "sampler task did not exit cleanly");
        }

        self.registry.close_window();
        self.running.store(false, Ordering::SeqCst);
        tracing::info!(ticks = self.registry.ticks(), "sampler stopped");
    }
}

/// Collapse any failure of a whole-source call into `SourceUnavailable`.
pub(crate) fn unavailable(err: MonitorError) -> MonitorError {
    match err {
        MonitorError::SourceUnavailable(_) => err,
        other => MonitorError::SourceUnavailable(other.to_string()),
    }
}

// ─── Task loop ───────────────────────────────────────────────────

async fn run<S: CounterSource>(
    source: Arc<S>,
    registry: Arc<StatsRegistry>,
    interval: Duration,
    poll_timeout: Duration,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            _ = ticker.tick() => tick(source.as_ref(), &registry, poll_timeout).await,
        }
    }
}

/// One sampling pass over every collector and pool the source lists.
///
/// Every source call, listings included, is bounded by `poll_timeout`, so a
/// stalled host delays a tick but never wedges the task. Names that vanish,
/// time out or fail are skipped for this tick only; their accumulated state
/// is left as it was.
pub async fn tick<S: CounterSource>(source: &S, registry: &StatsRegistry, poll_timeout: Duration) {
    let mut skipped = Vec::new();

    match bounded(poll_timeout, source.list_collectors()).await {
        Ok(names) => {
            for name in names {
                match bounded(poll_timeout, source.poll_collector(&name)).await {
                    Ok(snap) => {
                        let acc = registry.accumulator(&name);
                        let mut acc = acc.lock();
                        let before = acc.stats().clone();
                        if acc.update(snap.cumulative_count, snap.cumulative_time_ms)
                            == Delta::Rollback
                        {
                            let err = MonitorError::CounterRollback {
                                name: name.clone(),
                                previous_count: before.total_collections,
                                current_count: snap.cumulative_count,
                                previous_time_ms: before.total_time_ms,
                                current_time_ms: snap.cumulative_time_ms,
                            };
                            tracing::warn!(%err, "counter reset, delta clamped to zero");
                        }
                    }
                    Err(err) => skipped.push(skip(name, NameKind::Collector, err)),
                }
            }
        }
        Err(err) => tracing::warn!(%err, "could not list collectors, skipping tick"),
    }

    match bounded(poll_timeout, source.list_memory_pools()).await {
        Ok(names) => {
            for name in names {
                match bounded(poll_timeout, source.poll_memory_pool(&name)).await {
                    Ok(snap) => registry.observe_pool(snap),
                    Err(err) => skipped.push(skip(name, NameKind::Pool, err)),
                }
            }
        }
        Err(err) => tracing::warn!(%err, "could not list memory pools, skipping tick"),
    }

    registry.finish_tick(skipped);
}

/// Run a poll under `limit`, turning an elapsed timeout into an error.
pub(crate) async fn bounded<T>(
    limit: Duration,
    poll: impl std::future::Future<Output = Result<T, MonitorError>>,
) -> Result<T, MonitorError> {
    match tokio::time::timeout(limit, poll).await {
        Ok(result) => result,
        Err(_) => Err(MonitorError::SourceUnavailable(format!(
            "poll timed out after {}ms",
            limit.as_millis()
        ))),
    }
}

pub(crate) fn skip(name: String, kind: NameKind, err: MonitorError) -> SkippedName {
    match &err {
        MonitorError::NotFound(_) => tracing::debug!(%name, ?kind, "name vanished, skipping"),
        _ => tracing::warn!(%name, ?kind, %err, "poll failed, skipping"),
    }
    SkippedName {
        name,
        kind,
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{CounterSnapshot, MemorySnapshot, ScriptedSource};
    use chrono::Utc;
    use std::sync::atomic::AtomicU64;

    const TIMEOUT: Duration = Duration::from_millis(200);

    fn sampler(source: Arc<ScriptedSource>) -> (Sampler<ScriptedSource>, Arc<StatsRegistry>) {
        let registry = Arc::new(StatsRegistry::new());
        (Sampler::new(source, registry.clone(), TIMEOUT), registry)
    }

    #[tokio::test]
    async fn vanished_collector_keeps_stats_and_resumes() {
        let source = ScriptedSource::new();
        let registry = StatsRegistry::new();

        source.set_collector("young", 3, 15);
        tick(&source, &registry, TIMEOUT).await;

        source.remove_collector("young");
        tick(&source, &registry, TIMEOUT).await;
        let views = registry.collectors(Utc::now());
        assert_eq!(views[0].stats.total_collections, 3);
        assert_eq!(views[0].stats.total_time_ms, 15);
        assert_eq!(views[0].stats.ticks, 1);

        source.set_collector("young", 5, 22);
        tick(&source, &registry, TIMEOUT).await;
        let views = registry.collectors(Utc::now());
        assert_eq!(views[0].stats.total_collections, 5);
        assert_eq!(views[0].stats.max_observed_pause_ms, 15);
    }

    #[tokio::test]
    async fn slow_poll_is_skipped_not_stalled() {
        let source = ScriptedSource::with_poll_delay(Duration::from_millis(100));
        source.set_collector("old", 1, 1);
        let registry = StatsRegistry::new();

        tick(&source, &registry, Duration::from_millis(10)).await;

        assert!(registry.collectors(Utc::now()).is_empty());
        let skipped = registry.skipped_last_tick();
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].kind, NameKind::Collector);
    }

    /// Answers the first listing, then never answers again.
    struct StallingSource {
        listings: AtomicU64,
    }

    impl CounterSource for StallingSource {
        async fn list_collectors(&self) -> Result<Vec<String>, MonitorError> {
            if self.listings.fetch_add(1, Ordering::SeqCst) == 0 {
                return Ok(Vec::new());
            }
            std::future::pending().await
        }

        async fn poll_collector(&self, name: &str) -> Result<CounterSnapshot, MonitorError> {
            Err(MonitorError::NotFound(name.to_string()))
        }

        async fn list_memory_pools(&self) -> Result<Vec<String>, MonitorError> {
            std::future::pending().await
        }

        async fn poll_memory_pool(&self, name: &str) -> Result<MemorySnapshot, MonitorError> {
            Err(MonitorError::NotFound(name.to_string()))
        }
    }

    #[tokio::test]
    async fn stalled_listing_does_not_block_stop() {
        let source = Arc::new(StallingSource {
            listings: AtomicU64::new(0),
        });
        let registry = Arc::new(StatsRegistry::new());
        let sampler = Sampler::new(source, registry.clone(), Duration::from_millis(50));

        sampler.start(Duration::from_millis(10)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        tokio::time::timeout(Duration::from_secs(1), sampler.stop())
            .await
            .expect("stop must finish while the host is stalled");
        assert_eq!(sampler.state(), SamplerState::Stopped);
        assert!(registry.ticks() >= 1);
    }

    #[tokio::test]
    async fn stop_before_start_is_a_noop() {
        let (sampler, registry) = sampler(Arc::new(ScriptedSource::new()));
        sampler.stop().await;
        sampler.stop().await;
        assert_eq!(sampler.state(), SamplerState::Stopped);
        assert_eq!(registry.ticks(), 0);
    }

    #[tokio::test]
    async fn second_start_is_rejected() {
        let (sampler, _) = sampler(Arc::new(ScriptedSource::new()));
        sampler.start(Duration::from_millis(50)).await.unwrap();
        assert_eq!(
            sampler.start(Duration::from_millis(50)).await,
            Err(MonitorError::SchedulerAlreadyRunning)
        );
        sampler.stop().await;
    }

    #[tokio::test]
    async fn start_against_offline_source_fails() {
        let source = Arc::new(ScriptedSource::new());
        source.set_unavailable(true);
        let (sampler, _) = sampler(source);
        assert!(matches!(
            sampler.start(Duration::from_millis(50)).await,
            Err(MonitorError::SourceUnavailable(_))
        ));
        assert_eq!(sampler.state(), SamplerState::Stopped);
    }

    #[tokio::test]
    async fn first_tick_fires_immediately_and_stop_freezes_totals() {
        let source = Arc::new(ScriptedSource::new());
        source.set_collector("young", 1, 4);
        let (sampler, registry) = sampler(source.clone());

        sampler.start(Duration::from_secs(60)).await.unwrap();
        for _ in 0..100 {
            if registry.ticks() > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        sampler.stop().await;
        assert_eq!(registry.ticks(), 1);

        let frozen = registry.collectors(Utc::now());
        source.set_collector("young", 50, 400);
        tokio::time::sleep(Duration::from_millis(20)).await;
        sampler.stop().await;
        let after = registry.collectors(Utc::now());
        assert_eq!(frozen[0].stats, after[0].stats);
        assert_eq!(registry.ticks(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_reads_see_consistent_pairs() {
        let source = Arc::new(ScriptedSource::new());
        source.set_collector("young", 0, 0);
        let (sampler, registry) = sampler(source.clone());
        sampler.start(Duration::from_millis(1)).await.unwrap();

        let writer = {
            let source = source.clone();
            tokio::spawn(async move {
                for n in 1..=200u64 {
                    source.set_collector("young", n, n * 5);
                    tokio::task::yield_now().await;
                }
            })
        };

        for _ in 0..500 {
            for view in registry.collectors(Utc::now()) {
                assert_eq!(view.stats.total_time_ms, view.stats.total_collections * 5);
            }
            tokio::task::yield_now().await;
        }

        writer.await.unwrap();
        sampler.stop().await;
    }
}
