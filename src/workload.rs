//! Synthetic GET/SET traffic against the sampled Redis host, so a bounded
//! monitoring window has collector activity to observe.

use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use redis::aio::ConnectionManager;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Keyspace the workload reads and writes; kept small so reads mostly hit.
const KEYSPACE: u32 = 1_000;
const VALUE_MAX_BYTES: usize = 4_096;

#[derive(Debug, Clone, Copy)]
pub struct WorkloadConfig {
    pub concurrency: u32,
    pub duration: Duration,
    /// Percentage of operations that are reads (0–100).
    pub read_pct: u8,
}

/// Spawns `concurrency` Tokio tasks issuing commands until the deadline.
/// A worker whose command fails stops early. Returns the number of commands
/// that succeeded.
pub async fn run(redis: ConnectionManager, config: WorkloadConfig) -> u64 {
    let deadline = Instant::now() + config.duration;
    let issued = Arc::new(AtomicU64::new(0));

    let mut handles = Vec::with_capacity(config.concurrency as usize);

    for worker_id in 0..config.concurrency {
        let issued = issued.clone();
        let conn = redis.clone();

        handles.push(tokio::spawn(async move {
            worker(worker_id, issued, conn, deadline, config.read_pct).await;
        }));
    }

    for h in handles {
        let _ = h.await;
    }

    issued.load(Ordering::Relaxed)
}

#[derive(Debug, PartialEq, Eq)]
enum Op {
    Get(String),
    Set(String, String),
}

fn next_op(rng: &mut StdRng, read_pct: u8) -> Op {
    let key = format!("telemetry:load:{}", rng.gen_range(0..KEYSPACE));
    if rng.gen_range(0u8..100) < read_pct {
        return Op::Get(key);
    }
    let len = rng.gen_range(1..=VALUE_MAX_BYTES);
    let value: String = (0..len).map(|_| rng.gen_range('a'..='z')).collect();
    Op::Set(key, value)
}

async fn worker(
    id: u32,
    issued: Arc<AtomicU64>,
    mut conn: ConnectionManager,
    deadline: Instant,
    read_pct: u8,
) {
    // Each worker gets its own deterministic RNG seeded uniquely.
    let mut rng = StdRng::seed_from_u64(1000 + id as u64);

    while Instant::now() < deadline {
        let result: redis::RedisResult<()> = match next_op(&mut rng, read_pct) {
            Op::Get(key) => redis::cmd("GET")
                .arg(&key)
                .query_async::<_, Option<String>>(&mut conn)
                .await
                .map(|_| ()),
            Op::Set(key, value) => {
                redis::cmd("SET")
                    .arg(&key)
                    .arg(value)
                    .arg("EX")
                    .arg(300u64)
                    .query_async(&mut conn)
                    .await
            }
        };

        match result {
            Ok(()) => {
                issued.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                tracing::warn!(worker = id, %err, "workload command failed, worker exiting");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_pct_bounds_pick_one_command() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            assert!(matches!(next_op(&mut rng, 100), Op::Get(_)));
            assert!(matches!(next_op(&mut rng, 0), Op::Set(..)));
        }
    }

    #[test]
    fn keys_and_values_stay_in_range() {
        let mut rng = StdRng::seed_from_u64(1000);
        for _ in 0..200 {
            if let Op::Set(key, value) = next_op(&mut rng, 50) {
                let n: u32 = key.strip_prefix("telemetry:load:").unwrap().parse().unwrap();
                assert!(n < KEYSPACE);
                assert!((1..=VALUE_MAX_BYTES).contains(&value.len()));
            }
        }
    }

    #[test]
    fn same_seed_replays_same_sequence() {
        let mut a = StdRng::seed_from_u64(1003);
        let mut b = StdRng::seed_from_u64(1003);
        for _ in 0..20 {
            assert_eq!(next_op(&mut a, 70), next_op(&mut b, 70));
        }
    }
}
