// Presentation layer - HTTP surface
pub mod app_state;
pub mod handlers;

use crate::presentation::app_state::AppState;
use crate::presentation::handlers::{
    analysis, health_check, list_series, push_sample, stream_live, trend, view,
};
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

// Compression is applied per stream frame, so no CompressionLayer here.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(health_check))
        .route("/series", get(list_series))
        .route("/series/:id/trend", get(trend))
        .route("/series/:id/view", post(view))
        .route("/series/:id/samples", post(push_sample))
        .route("/series/:id/live", get(stream_live))
        .route("/series/:id/analysis", get(analysis))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
