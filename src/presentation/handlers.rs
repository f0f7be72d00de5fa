// HTTP request handlers
use crate::application::live_buffer::AppendOutcome;
use crate::application::render::RenderPass;
use crate::application::retention::RangeSummary;
use crate::application::trend_service::TrendError;
use crate::domain::error::TickError;
use crate::domain::sample::{LiveNotification, TimeWindow};
use crate::domain::series::SeriesProfile;
use crate::domain::zoom::{FetchPlan, PanZoomRequest};
use crate::infrastructure::chunked_stream::framed_response;
use crate::presentation::app_state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Deserialize)]
pub struct RangeQuery {
    pub from: i64,
    pub to: i64,
}

#[derive(Deserialize)]
pub struct LiveQuery {
    pub from: Option<i64>,
    pub to: Option<i64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewResponse {
    pub plan: FetchPlan,
    pub pass: RenderPass,
}

#[derive(Serialize)]
pub struct AppendResponse {
    pub outcome: AppendOutcome,
}

#[derive(Debug)]
pub struct ApiError(TrendError);

impl From<TrendError> for ApiError {
    fn from(e: TrendError) -> Self {
        Self(e)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            TrendError::UnknownSeries(_) => StatusCode::NOT_FOUND,
            TrendError::Tick(TickError::StaleGeneration { .. } | TickError::Suspended) => StatusCode::CONFLICT,
            TrendError::Decode(_) => StatusCode::BAD_REQUEST,
            TrendError::Store(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self.0);
        } else {
            tracing::debug!("Request rejected ({}): {}", status, self.0);
        }
        (status, Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
    }
}

fn accepts_brotli(headers: &HeaderMap) -> bool {
    headers
        .get("accept-encoding")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.contains("br"))
        .unwrap_or(false)
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

pub async fn list_series(State(state): State<Arc<AppState>>) -> Json<Vec<SeriesProfile>> {
    Json(state.trend_service.series_profiles().await)
}

/// Reduced history for a window
pub async fn trend(
    Path(id): Path<String>,
    Query(query): Query<RangeQuery>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<RenderPass>, ApiError> {
    let window = TimeWindow::new(query.from, query.to);
    let pass = state.trend_service.load_history(&id, window).await?;
    Ok(Json(pass))
}

/// Pan or zoom reported by the chart
pub async fn view(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
    Json(request): Json<PanZoomRequest>,
) -> Result<Json<ViewResponse>, ApiError> {
    let (plan, pass) = state.trend_service.pan_zoom(&id, request).await?;
    Ok(Json(ViewResponse { plan, pass }))
}

/// Live change-of-value notification
pub async fn push_sample(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
    Json(notification): Json<LiveNotification>,
) -> Result<Json<AppendResponse>, ApiError> {
    let outcome = state.trend_service.push_notification(&id, notification).await?;
    Ok(Json(AppendResponse { outcome }))
}

/// Stream live render passes for a series, optionally preceded by a history window
pub async fn stream_live(
    Path(id): Path<String>,
    Query(query): Query<LiveQuery>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Result<Response, ApiError> {
    let compress = accepts_brotli(&headers);
    let window = query.from.zip(query.to).map(|(from, to)| TimeWindow::new(from, to));

    let rx = state.live_stream.stream_series(&id, window).await?;
    Ok(framed_response(rx, compress).await)
}

/// Min / max / mean over the retained live samples
pub async fn analysis(
    Path(id): Path<String>,
    Query(query): Query<RangeQuery>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Option<RangeSummary>>, ApiError> {
    let window = TimeWindow::new(query.from, query.to);
    let summary = state.trend_service.quick_analysis(&id, window).await?;
    Ok(Json(summary))
}
