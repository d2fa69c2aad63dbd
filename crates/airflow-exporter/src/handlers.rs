//! HTTP request handlers: scrape endpoint, health check, landing page.

use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use tracing::error;

use crate::state::AppState;

pub(crate) fn router(state: AppState) -> Router {
    Router::new()
        .route(&state.telemetry_path, get(handle_metrics))
        .route("/health", get(handle_health))
        .route("/", get(handle_index))
        .with_state(state)
}

pub(crate) async fn handle_metrics(State(state): State<AppState>) -> Response {
    match state.metrics.render() {
        Ok(body) => (
            [(header::CONTENT_TYPE, state.metrics.content_type())],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "failed to encode metrics").into_response()
        }
    }
}

pub(crate) async fn handle_health() -> &'static str {
    "ok"
}

pub(crate) async fn handle_index(State(state): State<AppState>) -> Html<String> {
    Html(format!(
        "<html>\
<head><title>Airflow Exporter</title></head>\
<body><h1>Airflow Exporter</h1><p><a href=\"{path}\">Metrics</a></p></body>\
</html>",
        path = state.telemetry_path
    ))
}
