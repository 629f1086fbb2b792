//! Prometheus metrics endpoint

use axum::{http::header, routing::get, Router};
use prometheus::{Encoder, TextEncoder};

use crate::error::AppError;
use crate::metrics::REGISTRY;

/// Render every registered instrument in Prometheus text format.
async fn metrics_handler() -> Result<([(header::HeaderName, String); 1], Vec<u8>), AppError> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&REGISTRY.gather(), &mut buffer)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("metrics encoding failed: {}", e)))?;

    Ok((
        [(header::CONTENT_TYPE, encoder.format_type().to_string())],
        buffer,
    ))
}

/// Router exposing `/metrics`.
pub fn metrics_router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new().route("/metrics", get(metrics_handler))
}
