use axum::{http::StatusCode, response::IntoResponse};
use prometheus::{Encoder, TextEncoder};

// Prometheus text exposition of every registered metric
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return (StatusCode::INTERNAL_SERVER_ERROR, format!("metrics encoding failed: {e}"));
    }
    (StatusCode::OK, String::from_utf8_lossy(&buffer).into_owned())
}
