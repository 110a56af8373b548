//! Sampler configuration with TOML file support.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::MonitorError;

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Largest growth threshold whose byte count still fits a `u64`.
const MAX_GROWTH_MB: u64 = u64::MAX / BYTES_PER_MB;

/// Configuration for the sampler, the analyzer thresholds and the
/// surrounding server.
///
/// Can be loaded from a TOML file via [`MonitorConfig::from_toml_file`] or
/// built programmatically (e.g. for tests). Missing keys fall back to the
/// defaults below.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Interval between two sampling ticks.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Upper bound on a single collector/pool poll; slower names are skipped
    /// for that tick.
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,

    /// Pool usage (percent of max) above which a warning is raised.
    #[serde(default = "default_heap_warning_percent")]
    pub heap_warning_percent: f64,

    /// Used-memory growth over a window (MiB) above which a leak is suspected.
    #[serde(default = "default_memory_growth_warning_mb")]
    pub memory_growth_warning_mb: u64,

    /// Share of the window spent collecting above which overhead is flagged.
    #[serde(default = "default_gc_overhead_warning_percent")]
    pub gc_overhead_warning_percent: f64,

    /// Redis server whose INFO counters are sampled.
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// Address the HTTP API binds to.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Log format: "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// ── Serde default helpers ──────────────────────────────────────────

fn default_poll_interval_ms() -> u64 {
    1_000
}

fn default_poll_timeout_ms() -> u64 {
    250
}

fn default_heap_warning_percent() -> f64 {
    80.0
}

fn default_memory_growth_warning_mb() -> u64 {
    100
}

fn default_gc_overhead_warning_percent() -> f64 {
    5.0
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379/".to_string()
}

fn default_listen_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_log_format() -> String {
    "human".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

// ── Impl ───────────────────────────────────────────────────────────

impl MonitorConfig {
    /// Load and validate configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, MonitorError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| MonitorError::Config(format!("{}: {e}", path.as_ref().display())))?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, MonitorError> {
        let config: Self = toml::from_str(s).map_err(|e| MonitorError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> String {
        toml::to_string_pretty(self).expect("MonitorConfig is always serializable to TOML")
    }

    pub fn validate(&self) -> Result<(), MonitorError> {
        if self.poll_interval_ms == 0 {
            return Err(MonitorError::Config("poll_interval_ms must be positive".into()));
        }
        if self.poll_timeout_ms == 0 {
            return Err(MonitorError::Config("poll_timeout_ms must be positive".into()));
        }
        if !(self.heap_warning_percent > 0.0 && self.heap_warning_percent <= 100.0) {
            return Err(MonitorError::Config(
                "heap_warning_percent must be in (0, 100]".into(),
            ));
        }
        if !(self.gc_overhead_warning_percent > 0.0 && self.gc_overhead_warning_percent <= 100.0) {
            return Err(MonitorError::Config(
                "gc_overhead_warning_percent must be in (0, 100]".into(),
            ));
        }
        if self.memory_growth_warning_mb > MAX_GROWTH_MB {
            return Err(MonitorError::Config(format!(
                "memory_growth_warning_mb must be at most {MAX_GROWTH_MB}"
            )));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    /// The analyzer-facing subset of this config.
    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            heap_warning_percent: self.heap_warning_percent,
            memory_growth_warning_bytes: self.memory_growth_warning_mb.saturating_mul(BYTES_PER_MB),
            gc_overhead_warning_percent: self.gc_overhead_warning_percent,
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            poll_timeout_ms: default_poll_timeout_ms(),
            heap_warning_percent: default_heap_warning_percent(),
            memory_growth_warning_mb: default_memory_growth_warning_mb(),
            gc_overhead_warning_percent: default_gc_overhead_warning_percent(),
            redis_url: default_redis_url(),
            listen_addr: default_listen_addr(),
            log_format: default_log_format(),
            log_level: default_log_level(),
        }
    }
}

/// Diagnostic thresholds applied when a report is built.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Thresholds {
    pub heap_warning_percent: f64,
    pub memory_growth_warning_bytes: u64,
    pub gc_overhead_warning_percent: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        MonitorConfig::default().thresholds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_toml() {
        let config = MonitorConfig::default();
        let toml_str = config.to_toml_string();
        let parsed = MonitorConfig::from_toml_str(&toml_str).expect("should parse");
        assert_eq!(parsed.poll_interval_ms, config.poll_interval_ms);
        assert_eq!(parsed.redis_url, config.redis_url);
    }

    #[test]
    fn minimal_toml_uses_defaults() {
        let config = MonitorConfig::from_toml_str("").expect("empty toml should use defaults");
        assert_eq!(config.poll_interval_ms, 1000);
        assert_eq!(config.heap_warning_percent, 80.0);
        assert_eq!(config.memory_growth_warning_mb, 100);
        assert_eq!(config.log_format, "human");
    }

    #[test]
    fn partial_toml_overrides() {
        let toml = r#"
            poll_interval_ms = 250
            heap_warning_percent = 90.0
        "#;
        let config = MonitorConfig::from_toml_str(toml).expect("should parse");
        assert_eq!(config.poll_interval(), Duration::from_millis(250));
        assert_eq!(config.heap_warning_percent, 90.0);
        assert_eq!(config.memory_growth_warning_mb, 100);
    }

    #[test]
    fn zero_interval_is_rejected() {
        let err = MonitorConfig::from_toml_str("poll_interval_ms = 0").unwrap_err();
        assert!(matches!(err, MonitorError::Config(_)));
    }

    #[test]
    fn out_of_range_threshold_is_rejected() {
        assert!(MonitorConfig::from_toml_str("heap_warning_percent = 120.0").is_err());
        assert!(MonitorConfig::from_toml_str("gc_overhead_warning_percent = 0.0").is_err());
    }

    #[test]
    fn thresholds_convert_megabytes() {
        let t = MonitorConfig::default().thresholds();
        assert_eq!(t.memory_growth_warning_bytes, 100 * 1024 * 1024);
        assert_eq!(t.gc_overhead_warning_percent, 5.0);
    }

    #[test]
    fn growth_threshold_past_u64_bytes_is_rejected() {
        let err = MonitorConfig::from_toml_str("memory_growth_warning_mb = 9223372036854775807")
            .unwrap_err();
        assert!(matches!(err, MonitorError::Config(_)));

        let largest = format!("memory_growth_warning_mb = {MAX_GROWTH_MB}");
        let config = MonitorConfig::from_toml_str(&largest).unwrap();
        assert_eq!(
            config.thresholds().memory_growth_warning_bytes,
            MAX_GROWTH_MB * BYTES_PER_MB
        );
    }

    #[test]
    fn unvalidated_growth_threshold_saturates() {
        let config = MonitorConfig {
            memory_growth_warning_mb: u64::MAX,
            ..MonitorConfig::default()
        };
        assert_eq!(config.thresholds().memory_growth_warning_bytes, u64::MAX);
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let err = MonitorConfig::from_toml_file("/nonexistent/telemetry.toml").unwrap_err();
        assert!(matches!(err, MonitorError::Config(_)));
    }
}
