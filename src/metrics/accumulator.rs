use chrono::{DateTime, Utc};
use hdrhistogram::Histogram;
use serde::Serialize;

use super::percentiles::PauseDistribution;

// ─── Configuration ───────────────────────────────────────────────

/// Pause histogram range: 1 ms → 1 h, 3 significant figures
const PAUSE_LOW_MS: u64 = 1;
const PAUSE_HIGH_MS: u64 = 3_600_000;
const PAUSE_SIGFIG: u8 = 3;

// ─── Public types ────────────────────────────────────────────────

/// Running totals for one collector, folded from its cumulative counters.
///
/// `total_collections` and `total_time_ms` mirror the latest cumulative
/// reading; `max_observed_pause_ms` is the largest delta of cumulative time
/// between two consecutive polls. `window_time_ms` only sums the deltas after
/// the first reading, so a host's history before the window is left out.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccumulatedStats {
    pub total_collections: u64,
    pub total_time_ms: u64,
    pub max_observed_pause_ms: u64,
    pub window_time_ms: u64,
    pub started_at: DateTime<Utc>,
    /// Set once a reading went backwards (host reset its counters).
    pub reset_detected: bool,
    /// Number of readings folded in.
    pub ticks: u64,
}

/// What a single [`StatAccumulator::update`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delta {
    /// Counters moved forward (or stayed put) by this many milliseconds.
    Advanced(u64),
    /// Counters went backwards; the delta was clamped to zero.
    Rollback,
}

/// Incremental statistics for one named counter.
///
/// Not synchronized on its own: the registry keeps each accumulator behind
/// a mutex so the `(count, time)` pair is always updated and read together.
pub struct StatAccumulator {
    stats: AccumulatedStats,
    pauses: Histogram<u64>,
}

// ─── StatAccumulator impl ────────────────────────────────────────

impl StatAccumulator {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            stats: AccumulatedStats {
                total_collections: 0,
                total_time_ms: 0,
                max_observed_pause_ms: 0,
                window_time_ms: 0,
                started_at,
                reset_detected: false,
                ticks: 0,
            },
            pauses: Histogram::<u64>::new_with_bounds(PAUSE_LOW_MS, PAUSE_HIGH_MS, PAUSE_SIGFIG)
                .expect("histogram creation"),
        }
    }

    /// Fold in a new cumulative reading. The only mutating entry point.
    pub fn update(&mut self, cumulative_count: u64, cumulative_time_ms: u64) -> Delta {
        let rolled_back = cumulative_count < self.stats.total_collections
            || cumulative_time_ms < self.stats.total_time_ms;

        let delta = if rolled_back {
            self.stats.reset_detected = true;
            Delta::Rollback
        } else {
            let pause = cumulative_time_ms - self.stats.total_time_ms;
            self.stats.max_observed_pause_ms = self.stats.max_observed_pause_ms.max(pause);
            if pause > 0 {
                // Values past the upper bound are dropped from the distribution only.
                let _ = self.pauses.record(pause);
            }
            if self.stats.ticks > 0 {
                self.stats.window_time_ms += pause;
            }
            Delta::Advanced(pause)
        };

        self.stats.total_collections = cumulative_count;
        self.stats.total_time_ms = cumulative_time_ms;
        self.stats.ticks += 1;
        delta
    }

    pub fn stats(&self) -> &AccumulatedStats {
        &self.stats
    }

    /// Mean time per collection; 0 when nothing was collected.
    pub fn average_pause(&self) -> f64 {
        if self.stats.total_collections == 0 {
            return 0.0;
        }
        self.stats.total_time_ms as f64 / self.stats.total_collections as f64
    }

    /// Collections per second since `started_at`.
    pub fn frequency(&self) -> f64 {
        self.frequency_at(Utc::now())
    }

    /// Collections per second over `[started_at, end]`; 0 for an empty window.
    pub fn frequency_at(&self, end: DateTime<Utc>) -> f64 {
        let elapsed_ms = self.elapsed_ms(end);
        if elapsed_ms == 0 {
            return 0.0;
        }
        self.stats.total_collections as f64 / (elapsed_ms as f64 / 1000.0)
    }

    /// Share of `[started_at, end]` spent collecting, in percent.
    ///
    /// Uses `window_time_ms`: the first reading is a baseline, not time spent
    /// inside the window.
    pub fn overhead_percent_at(&self, end: DateTime<Utc>) -> f64 {
        let elapsed_ms = self.elapsed_ms(end);
        if elapsed_ms == 0 {
            return 0.0;
        }
        self.stats.window_time_ms as f64 / elapsed_ms as f64 * 100.0
    }

    pub fn pauses(&self) -> PauseDistribution {
        PauseDistribution::from_histogram(&self.pauses)
    }

    fn elapsed_ms(&self, end: DateTime<Utc>) -> u64 {
        (end - self.stats.started_at).num_milliseconds().max(0) as u64
    }
}
