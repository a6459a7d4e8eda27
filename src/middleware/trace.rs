//! Per-request tracing span.

use std::future::Future;

use tokio::time::Instant;
use tracing::{Instrument, info, info_span, warn};

use crate::response::Response;

/// Runs `fut` inside a `request` span and logs status and latency when it
/// resolves. 5xx responses are logged at `warn`.
pub async fn instrument<F>(method: &http::Method, path: &str, fut: F) -> Response
where
    F: Future<Output = Response>,
{
    let span = info_span!("request", %method, path = %path);
    async move {
        let started = Instant::now();
        let response = fut.await;
        let status = response.status_code();
        let latency_ms = started.elapsed().as_millis() as u64;
        if status >= 500 {
            warn!(status, latency_ms, "request failed");
        } else {
            info!(status, latency_ms, "request completed");
        }
        response
    }
    .instrument(span)
    .await
}
