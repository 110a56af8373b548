use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;

/// Adds a `Server-Timing` header to every response and logs API calls.
///
/// The SSE stream is left out of the log since it stays open.
pub async fn timing_middleware(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();

    let start = Instant::now();
    let mut response = next.run(req).await;
    let elapsed = start.elapsed();

    let server_timing = format!("total;dur={:.3}", elapsed.as_secs_f64() * 1000.0);
    if let Ok(val) = server_timing.parse() {
        response.headers_mut().insert("Server-Timing", val);
    }

    let status = response.status().as_u16();
    if path.starts_with("/api/") && !path.ends_with("/stream") {
        tracing::info!(
            %method,
            %path,
            status,
            elapsed_us = elapsed.as_micros() as u64,
            "request"
        );
    }

    response
}
