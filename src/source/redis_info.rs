use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::Mutex;
use redis::aio::ConnectionManager;

use super::{CounterSnapshot, CounterSource, MemorySnapshot};
use crate::MonitorError;

/// Pool backed by `used_memory` / `used_memory_rss` / `maxmemory`.
pub const MAIN_POOL: &str = "main";
/// Pool backed by `used_memory_lua` (never bounded).
pub const LUA_POOL: &str = "lua";

/// Commands the sampler itself issues; they would only measure its own polling.
const SELF_COMMANDS: &[&str] = &["info"];

/// How long a listing's `INFO` reply answers the polls that follow it.
const INFO_MAX_AGE: Duration = Duration::from_millis(200);

const COMMANDSTATS: &str = "commandstats";
const MEMORY: &str = "memory";

/// Counter source over a Redis server's `INFO` sections.
///
/// Each `cmdstat_<command>` line of `INFO commandstats` is one collector:
/// `calls` is the cumulative count and `usec` the cumulative time.
/// `INFO memory` provides the `main` and `lua` pools.
///
/// A listing always fetches its section; the per-name polls of the same
/// tick are answered from that reply, so a tick costs one `INFO` per section.
#[derive(Clone)]
pub struct RedisSource {
    conn: ConnectionManager,
    cache: Arc<Mutex<InfoCache>>,
}

impl RedisSource {
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            cache: Arc::new(Mutex::new(InfoCache::new(INFO_MAX_AGE))),
        }
    }

    async fn fetch(&self, section: &'static str) -> Result<Arc<str>, MonitorError> {
        // ConnectionManager clones share one multiplexed connection.
        let mut conn = self.conn.clone();
        let text: String = redis::cmd("INFO").arg(section).query_async(&mut conn).await?;
        let text: Arc<str> = text.into();
        self.cache.lock().store(section, text.clone(), Instant::now());
        Ok(text)
    }

    async fn cached(&self, section: &'static str) -> Result<Arc<str>, MonitorError> {
        let hit = self.cache.lock().fresh(section, Instant::now());
        match hit {
            Some(text) => Ok(text),
            None => self.fetch(section).await,
        }
    }
}

impl CounterSource for RedisSource {
    async fn list_collectors(&self) -> Result<Vec<String>, MonitorError> {
        let text = self.fetch(COMMANDSTATS).await?;
        Ok(sampled_commands(&text).into_iter().map(|c| c.command).collect())
    }

    async fn poll_collector(&self, name: &str) -> Result<CounterSnapshot, MonitorError> {
        let text = self.cached(COMMANDSTATS).await?;
        let stat = sampled_commands(&text)
            .into_iter()
            .find(|c| c.command == name)
            .ok_or_else(|| MonitorError::NotFound(name.to_string()))?;
        Ok(CounterSnapshot {
            name: stat.command,
            cumulative_count: stat.calls,
            cumulative_time_ms: stat.usec / 1_000,
            captured_at: Utc::now(),
        })
    }

    async fn list_memory_pools(&self) -> Result<Vec<String>, MonitorError> {
        let text = self.fetch(MEMORY).await?;
        let fields = parse_info_fields(&text);
        let mut pools = Vec::with_capacity(2);
        if fields.contains_key("used_memory") {
            pools.push(MAIN_POOL.to_string());
        }
        if fields.contains_key("used_memory_lua") {
            pools.push(LUA_POOL.to_string());
        }
        Ok(pools)
    }

    async fn poll_memory_pool(&self, name: &str) -> Result<MemorySnapshot, MonitorError> {
        let text = self.cached(MEMORY).await?;
        memory_pool_from_info(&parse_info_fields(&text), name)
    }
}

// ─── INFO cache ──────────────────────────────────────────────────

/// Latest reply per `INFO` section, with the instant it arrived.
pub(crate) struct InfoCache {
    max_age: Duration,
    replies: HashMap<&'static str, (Instant, Arc<str>)>,
}

impl InfoCache {
    pub(crate) fn new(max_age: Duration) -> Self {
        Self {
            max_age,
            replies: HashMap::new(),
        }
    }

    pub(crate) fn store(&mut self, section: &'static str, text: Arc<str>, at: Instant) {
        self.replies.insert(section, (at, text));
    }

    /// The cached reply for `section`, unless it is older than `max_age`.
    pub(crate) fn fresh(&self, section: &str, now: Instant) -> Option<Arc<str>> {
        let (at, text) = self.replies.get(section)?;
        (now.saturating_duration_since(*at) <= self.max_age).then(|| text.clone())
    }
}

// ─── INFO parsing ────────────────────────────────────────────────

/// Commandstats minus the sampler's own traffic.
pub(crate) fn sampled_commands(text: &str) -> Vec<CommandStat> {
    parse_commandstats(text)
        .into_iter()
        .filter(|c| !SELF_COMMANDS.contains(&c.command.as_str()))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CommandStat {
    pub command: String,
    pub calls: u64,
    pub usec: u64,
}

/// Parse lines like `cmdstat_get:calls=21,usec=175,usec_per_call=8.33,...`.
pub(crate) fn parse_commandstats(text: &str) -> Vec<CommandStat> {
    text.lines()
        .filter_map(|line| {
            let (key, value) = line.trim().split_once(':')?;
            let command = key.strip_prefix("cmdstat_")?;
            let mut calls = None;
            let mut usec = None;
            for pair in value.split(',') {
                match pair.split_once('=') {
                    Some(("calls", v)) => calls = v.parse().ok(),
                    Some(("usec", v)) => usec = v.parse().ok(),
                    _ => {}
                }
            }
            Some(CommandStat {
                command: command.to_string(),
                calls: calls?,
                usec: usec?,
            })
        })
        .collect()
}

/// Parse `key:value` lines, skipping `# Section` headers and blanks.
pub(crate) fn parse_info_fields(text: &str) -> HashMap<String, String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn field(fields: &HashMap<String, String>, key: &str) -> Option<u64> {
    fields.get(key).and_then(|v| v.parse().ok())
}

pub(crate) fn memory_pool_from_info(
    fields: &HashMap<String, String>,
    name: &str,
) -> Result<MemorySnapshot, MonitorError> {
    let not_found = || MonitorError::NotFound(name.to_string());
    let (used, committed, max) = match name {
        MAIN_POOL => {
            let used = field(fields, "used_memory").ok_or_else(not_found)?;
            let rss = field(fields, "used_memory_rss").unwrap_or(used);
            (used, rss, field(fields, "maxmemory").unwrap_or(0))
        }
        LUA_POOL => {
            let used = field(fields, "used_memory_lua").ok_or_else(not_found)?;
            (used, used, 0)
        }
        _ => return Err(not_found()),
    };
    Ok(MemorySnapshot {
        pool_name: name.to_string(),
        used_bytes: used,
        committed_bytes: committed,
        max_bytes: max,
        captured_at: Utc::now(),
    })
}
