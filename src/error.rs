use thiserror::Error;

/// Every failure the sampler, analyzer and sources can produce.
///
/// Only `SchedulerAlreadyRunning`, `SourceUnavailable` and `Config` ever
/// reach a caller; `NotFound` and `CounterRollback` are recovered inside a
/// tick and only show up in logs and report annotations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MonitorError {
    #[error("no collector or pool named {0:?}")]
    NotFound(String),

    #[error(
        "cumulative counter {name:?} went backwards \
         (count {previous_count} -> {current_count}, time {previous_time_ms}ms -> {current_time_ms}ms)"
    )]
    CounterRollback {
        name: String,
        previous_count: u64,
        current_count: u64,
        previous_time_ms: u64,
        current_time_ms: u64,
    },

    #[error("sampler is already running")]
    SchedulerAlreadyRunning,

    #[error("counter source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("config error: {0}")]
    Config(String),
}

impl From<redis::RedisError> for MonitorError {
    fn from(err: redis::RedisError) -> Self {
        Self::SourceUnavailable(err.to_string())
    }
}
