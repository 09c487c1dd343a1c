// HTTP request handlers
use crate::infrastructure::chunked_json::stream_from_receiver;
use crate::infrastructure::http_response::{accepts_brotli, json_response};
use crate::presentation::app_state::AppState;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use std::sync::Arc;

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

/// Render every tab; failed cards are reported inline, never as an HTTP error
pub async fn get_dashboard(
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response {
    let dashboard = state.composer.compose().await;
    match json_response(&dashboard, accepts_brotli(&headers)).await {
        Ok(response) => response,
        Err(status) => status.into_response(),
    }
}

pub async fn get_tab(
    Path(id): Path<String>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response {
    let Some(tab) = state.composer.compose_tab(&id).await else {
        tracing::debug!(tab = %id, "unknown tab");
        return (StatusCode::NOT_FOUND, format!("no tab {:?}", id)).into_response();
    };
    match json_response(&tab, accepts_brotli(&headers)).await {
        Ok(response) => response,
        Err(status) => status.into_response(),
    }
}

/// Progressive loading: skeleton, then cards as they finish
pub async fn stream_dashboard(
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let rx = state.streaming_service.stream_dashboard();
    stream_from_receiver(rx, accepts_brotli(&headers))
}
