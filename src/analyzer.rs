//! Monitoring-window orchestration and report synthesis.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use crate::config::{MonitorConfig, Thresholds};
use crate::metrics::{LiveSnapshot, NameKind, StatsRegistry};
use crate::report::{diagnose, PoolReport, Report};
use crate::sampler::{bounded, skip, unavailable, Sampler, SamplerState};
use crate::source::CounterSource;
use crate::MonitorError;

/// Owns the accumulators of one monitoring window and the sampler feeding
/// them.
///
/// `report` ends the window: it stops the sampler and summarizes what was
/// collected. Further `report` calls return the same frozen collector totals
/// until `start_monitoring` opens a new window.
pub struct Analyzer<S> {
    source: Arc<S>,
    registry: Arc<StatsRegistry>,
    sampler: Sampler<S>,
    thresholds: Thresholds,
    poll_timeout: Duration,
}

impl<S: CounterSource> Analyzer<S> {
    pub fn new(source: S, thresholds: Thresholds, poll_timeout: Duration) -> Self {
        let source = Arc::new(source);
        let registry = Arc::new(StatsRegistry::new());
        let sampler = Sampler::new(source.clone(), registry.clone(), poll_timeout);
        Self {
            source,
            registry,
            sampler,
            thresholds,
            poll_timeout,
        }
    }

    pub fn from_config(source: S, config: &MonitorConfig) -> Self {
        Self::new(source, config.thresholds(), config.poll_timeout())
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    pub fn state(&self) -> SamplerState {
        self.sampler.state()
    }

    /// Open a new window and start sampling every `interval`.
    pub async fn start_monitoring(&self, interval: Duration) -> Result<(), MonitorError> {
        self.sampler.start(interval).await
    }

    /// Stop sampling without building a report. Idempotent.
    pub async fn stop(&self) {
        self.sampler.stop().await;
    }

    /// Current totals without ending the window.
    pub fn live(&self) -> LiveSnapshot {
        self.registry
            .snapshot(self.sampler.state() == SamplerState::Running)
    }

    /// End the window and summarize it.
    ///
    /// Pools are polled fresh; a pool that cannot be read is listed under
    /// `skipped` instead of failing the report. Only a source that cannot
    /// list its pools within the poll timeout fails the call, leaving
    /// accumulated state as is.
    pub async fn report(&self) -> Result<Report, MonitorError> {
        self.sampler.stop().await;
        self.registry.close_window();

        let pool_names = bounded(self.poll_timeout, self.source.list_memory_pools())
            .await
            .map_err(unavailable)?;

        let (started, ended) = self.registry.window();
        let ended = ended.unwrap_or_else(Utc::now);
        let collectors = self.registry.collectors(ended);
        let mut skipped = self.registry.skipped_last_tick();

        let mut memory = Vec::with_capacity(pool_names.len());
        for name in pool_names {
            match bounded(self.poll_timeout, self.source.poll_memory_pool(&name)).await {
                Ok(current) => {
                    let baseline = self.registry.pool_baseline(&name);
                    memory.push(PoolReport::evaluate(
                        &current,
                        baseline.as_ref(),
                        &self.thresholds,
                    ));
                }
                Err(err) => {
                    skipped.retain(|s| !(s.kind == NameKind::Pool && s.name == name));
                    skipped.push(skip(name, NameKind::Pool, err));
                }
            }
        }

        let diagnostics = diagnose(&collectors, &memory, &skipped, &self.thresholds);
        for d in &diagnostics {
            tracing::info!(kind = ?d.kind, subject = %d.subject, "{}", d.message);
        }

        Ok(Report {
            id: Uuid::new_v4(),
            generated_at: Utc::now(),
            window_started_at: started,
            window_ended_at: ended,
            window_secs: (ended - started).num_milliseconds().max(0) as f64 / 1000.0,
            ticks: self.registry.ticks(),
            collectors,
            memory,
            skipped,
            diagnostics,
        })
    }
}
