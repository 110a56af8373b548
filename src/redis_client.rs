use redis::aio::ConnectionManager;

use crate::MonitorError;

/// Opens a `ConnectionManager` to the Redis host that will be sampled.
///
/// The manager reconnects on its own after transient failures, so a host
/// that goes away mid-window shows up as `SourceUnavailable` polls rather
/// than a dead sampler.
pub async fn connect(url: &str) -> Result<ConnectionManager, MonitorError> {
    let client = redis::Client::open(url)
        .map_err(|e| MonitorError::Config(format!("invalid Redis URL {url:?}: {e}")))?;

    let conn = ConnectionManager::new(client).await?;
    tracing::info!(%url, "connected to Redis");
    Ok(conn)
}
