pub mod analyzer;
pub mod config;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod metrics;
pub mod middleware;
pub mod redis_client;
pub mod report;
pub mod sampler;
pub mod server;
pub mod source;
pub mod workload;

pub use analyzer::Analyzer;
pub use config::{MonitorConfig, Thresholds};
pub use error::MonitorError;
pub use report::Report;
pub use sampler::{Sampler, SamplerState};
pub use source::{CounterSource, RedisSource, ScriptedSource};

/// Shared application state available to every handler via `State<Arc<AppState>>`.
pub struct AppState {
    /// Owns the sampler and the current window's accumulators.
    pub analyzer: analyzer::Analyzer<RedisSource>,

    /// Effective configuration (file, then CLI overrides).
    pub config: MonitorConfig,
}
