use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;

/// GET /metrics — Prometheus text exposition of the sticker job counters
/// (`sticker_jobs_total`, `sticker_jobs_completed`, `sticker_jobs_failed`)
/// and the `sticker_queue_depth` gauge.
pub async fn export_metrics(State(handle): State<Arc<PrometheusHandle>>) -> impl IntoResponse {
    handle.render()
}
