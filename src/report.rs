use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::config::Thresholds;
use crate::metrics::{CollectorView, NameKind, SkippedName};
use crate::source::MemorySnapshot;

const MIB: f64 = 1024.0 * 1024.0;

/// Summary of one monitoring window. Built once per request, never mutated.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub window_started_at: DateTime<Utc>,
    pub window_ended_at: DateTime<Utc>,
    pub window_secs: f64,
    pub ticks: u64,
    /// In the order the collectors were first seen.
    pub collectors: Vec<CollectorView>,
    pub memory: Vec<PoolReport>,
    /// Names that could not be read on the last tick or while reporting.
    pub skipped: Vec<SkippedName>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Current state of one memory pool against the window's thresholds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoolReport {
    pub pool_name: String,
    pub used_bytes: u64,
    pub committed_bytes: u64,
    pub max_bytes: u64,
    /// Omitted for unbounded pools.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage_percent: Option<f64>,
    pub warning: bool,
    /// Change in used bytes since the first reading of the window.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub growth_bytes: Option<i64>,
    pub leak_suspected: bool,
}

impl PoolReport {
    pub fn evaluate(
        current: &MemorySnapshot,
        baseline: Option<&MemorySnapshot>,
        thresholds: &Thresholds,
    ) -> Self {
        let usage_percent = current.usage_percent();
        let growth_bytes =
            baseline.map(|b| current.used_bytes as i64 - b.used_bytes as i64);
        Self {
            pool_name: current.pool_name.clone(),
            used_bytes: current.used_bytes,
            committed_bytes: current.committed_bytes,
            max_bytes: current.max_bytes,
            usage_percent,
            warning: usage_percent.is_some_and(|p| p > thresholds.heap_warning_percent),
            growth_bytes,
            leak_suspected: growth_bytes
                .is_some_and(|g| g > thresholds.memory_growth_warning_bytes as i64),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    HighMemoryUsage,
    SuspectedLeak,
    HighCollectionOverhead,
    CounterReset,
    SkippedSource,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub subject: String,
    pub message: String,
}

/// Derive threshold diagnostics from an assembled window.
pub fn diagnose(
    collectors: &[CollectorView],
    memory: &[PoolReport],
    skipped: &[SkippedName],
    thresholds: &Thresholds,
) -> Vec<Diagnostic> {
    let mut out = Vec::new();

    for pool in memory {
        if let (true, Some(pct)) = (pool.warning, pool.usage_percent) {
            out.push(Diagnostic {
                kind: DiagnosticKind::HighMemoryUsage,
                subject: pool.pool_name.clone(),
                message: format!(
                    "usage {pct:.1}% exceeds {:.1}%",
                    thresholds.heap_warning_percent
                ),
            });
        }
        if let (true, Some(growth)) = (pool.leak_suspected, pool.growth_bytes) {
            out.push(Diagnostic {
                kind: DiagnosticKind::SuspectedLeak,
                subject: pool.pool_name.clone(),
                message: format!(
                    "used memory grew {:.1} MiB over the window (limit {:.0} MiB)",
                    growth as f64 / MIB,
                    thresholds.memory_growth_warning_bytes as f64 / MIB
                ),
            });
        }
    }

    for c in collectors {
        if c.overhead_percent > thresholds.gc_overhead_warning_percent {
            out.push(Diagnostic {
                kind: DiagnosticKind::HighCollectionOverhead,
                subject: c.name.clone(),
                message: format!(
                    "{:.1}% of the window spent collecting (limit {:.1}%)",
                    c.overhead_percent, thresholds.gc_overhead_warning_percent
                ),
            });
        }
        if c.stats.reset_detected {
            out.push(Diagnostic {
                kind: DiagnosticKind::CounterReset,
                subject: c.name.clone(),
                message: "cumulative counters went backwards; totals restart from the reset"
                    .into(),
            });
        }
    }

    for s in skipped {
        let kind = match s.kind {
            NameKind::Collector => "collector",
            NameKind::Pool => "pool",
        };
        out.push(Diagnostic {
            kind: DiagnosticKind::SkippedSource,
            subject: s.name.clone(),
            message: format!("{kind} skipped: {}", s.reason),
        });
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{AccumulatedStats, PauseDistribution};

    const MB: u64 = 1024 * 1024;

    fn snap(used_mb: u64, max_mb: u64) -> MemorySnapshot {
        MemorySnapshot {
            pool_name: "heap".into(),
            used_bytes: used_mb * MB,
            committed_bytes: used_mb * MB,
            max_bytes: max_mb * MB,
            captured_at: Utc::now(),
        }
    }

    fn collector(overhead: f64, reset: bool) -> CollectorView {
        CollectorView {
            name: "old".into(),
            stats: AccumulatedStats {
                total_collections: 1,
                total_time_ms: 1,
                max_observed_pause_ms: 1,
                window_time_ms: 1,
                started_at: Utc::now(),
                reset_detected: reset,
                ticks: 1,
            },
            average_pause_ms: 1.0,
            frequency_per_sec: 0.1,
            overhead_percent: overhead,
            pauses: PauseDistribution::empty(),
        }
    }

    #[test]
    fn high_usage_raises_warning() {
        let r = PoolReport::evaluate(&snap(850, 1000), None, &Thresholds::default());
        assert!((r.usage_percent.unwrap() - 85.0).abs() < 1e-9);
        assert!(r.warning);
    }

    #[test]
    fn moderate_usage_is_quiet() {
        let r = PoolReport::evaluate(&snap(400, 1000), None, &Thresholds::default());
        assert!(!r.warning);
    }

    #[test]
    fn unbounded_pool_omits_usage() {
        let r = PoolReport::evaluate(&snap(850, 0), None, &Thresholds::default());
        assert_eq!(r.usage_percent, None);
        assert!(!r.warning);
        let json = serde_json::to_value(&r).unwrap();
        assert!(json.get("usage_percent").is_none());
    }

    #[test]
    fn custom_threshold_is_respected() {
        let thresholds = Thresholds {
            heap_warning_percent: 90.0,
            ..Thresholds::default()
        };
        assert!(!PoolReport::evaluate(&snap(850, 1000), None, &thresholds).warning);
    }

    #[test]
    fn growth_past_limit_suspects_leak() {
        let t = Thresholds::default();
        let leaking = PoolReport::evaluate(&snap(350, 0), Some(&snap(200, 0)), &t);
        assert_eq!(leaking.growth_bytes, Some((150 * MB) as i64));
        assert!(leaking.leak_suspected);

        let shrinking = PoolReport::evaluate(&snap(100, 0), Some(&snap(200, 0)), &t);
        assert_eq!(shrinking.growth_bytes, Some(-((100 * MB) as i64)));
        assert!(!shrinking.leak_suspected);
    }

    #[test]
    fn diagnostics_cover_each_condition() {
        let t = Thresholds::default();
        let memory = vec![PoolReport::evaluate(&snap(900, 1000), Some(&snap(700, 1000)), &t)];
        let collectors = vec![collector(12.0, true)];
        let skipped = vec![SkippedName {
            name: "eden".into(),
            kind: NameKind::Pool,
            reason: "gone".into(),
        }];

        let kinds: Vec<_> = diagnose(&collectors, &memory, &skipped, &t)
            .into_iter()
            .map(|d| d.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![
                DiagnosticKind::HighMemoryUsage,
                DiagnosticKind::SuspectedLeak,
                DiagnosticKind::HighCollectionOverhead,
                DiagnosticKind::CounterReset,
                DiagnosticKind::SkippedSource,
            ]
        );
    }

    #[test]
    fn quiet_window_has_no_diagnostics() {
        let t = Thresholds::default();
        let memory = vec![PoolReport::evaluate(&snap(100, 1000), Some(&snap(100, 1000)), &t)];
        assert!(diagnose(&[collector(0.5, false)], &memory, &[], &t).is_empty());
    }
}
