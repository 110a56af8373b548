//! telemetry-sampler — samples a host's collector and memory counters and
//! reports threshold diagnostics, either as an HTTP service or for a single
//! bounded window.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};

use telemetry_sampler::logging::{init_logging, LogFormat};
use telemetry_sampler::workload::{self, WorkloadConfig};
use telemetry_sampler::{redis_client, server, Analyzer, AppState, MonitorConfig, RedisSource};

#[derive(Parser)]
#[command(name = "telemetry-sampler", about = "Collector/memory counter sampler and analyzer")]
struct Cli {
    /// Path to a TOML configuration file. CLI flags and env vars override it.
    #[arg(long, env = "TELEMETRY_CONFIG")]
    config: Option<PathBuf>,

    /// Redis server to sample.
    #[arg(long, env = "TELEMETRY_REDIS_URL")]
    redis_url: Option<String>,

    /// Sampling interval in milliseconds.
    #[arg(long, env = "TELEMETRY_POLL_INTERVAL_MS")]
    poll_interval_ms: Option<u64>,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[arg(long, env = "TELEMETRY_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format: "human" or "json".
    #[arg(long, env = "TELEMETRY_LOG_FORMAT")]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP API (start/stop/report, live metrics, SSE stream).
    Serve {
        /// Address to bind, e.g. "0.0.0.0:3000".
        #[arg(long, env = "TELEMETRY_LISTEN_ADDR")]
        listen: Option<String>,
    },
    /// Monitor for one bounded window, then print the report as JSON.
    Once {
        /// Length of the monitoring window.
        #[arg(long, default_value_t = 10)]
        window_secs: u64,

        /// Drive GET/SET traffic against the host during the window.
        #[arg(long)]
        workload: bool,

        /// Concurrent workload tasks.
        #[arg(long, default_value_t = 8)]
        concurrency: u32,

        /// Percentage of workload operations that are reads.
        #[arg(long, default_value_t = 70, value_parser = clap::value_parser!(u8).range(0..=100))]
        read_pct: u8,
    },
}

impl Cli {
    /// File settings first, then flags/env on top.
    fn resolve_config(&self) -> anyhow::Result<MonitorConfig> {
        let mut config = match &self.config {
            Some(path) => MonitorConfig::from_toml_file(path)?,
            None => MonitorConfig::default(),
        };
        if let Some(url) = &self.redis_url {
            config.redis_url = url.clone();
        }
        if let Some(ms) = self.poll_interval_ms {
            config.poll_interval_ms = ms;
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.log_format = format.clone();
        }
        if let Command::Serve { listen: Some(addr) } = &self.command {
            config.listen_addr = addr.clone();
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.resolve_config()?;

    let format: LogFormat = config.log_format.parse()?;
    init_logging(format, &config.log_level);

    let conn = redis_client::connect(&config.redis_url)
        .await
        .context("cannot reach the Redis host to sample")?;
    let analyzer = Analyzer::from_config(RedisSource::new(conn.clone()), &config);

    match cli.command {
        Command::Serve { .. } => serve(analyzer, config).await,
        Command::Once {
            window_secs,
            workload,
            concurrency,
            read_pct,
        } => {
            analyzer.start_monitoring(config.poll_interval()).await?;

            let window = Duration::from_secs(window_secs);
            let window_end = tokio::time::Instant::now() + window;
            if workload {
                let load = WorkloadConfig {
                    concurrency,
                    duration: window,
                    read_pct,
                };
                let issued = workload::run(conn, load).await;
                tracing::info!(commands = issued, concurrency, "workload finished");
            }
            // Workers that fail early must not shorten the window.
            tokio::time::sleep_until(window_end).await;

            let report = analyzer.report().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
    }
}

async fn serve(analyzer: Analyzer<RedisSource>, config: MonitorConfig) -> anyhow::Result<()> {
    let addr = config.listen_addr.clone();
    let interval = config.poll_interval();
    let state = Arc::new(AppState { analyzer, config });

    // Sample from boot; clients end the window through /api/report.
    state.analyzer.start_monitoring(interval).await?;

    let app = server::create_router(state.clone());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!(%addr, "serving telemetry API");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("received SIGINT, shutting down");
        })
        .await
        .context("server exited with error")?;

    state.analyzer.stop().await;
    Ok(())
}
