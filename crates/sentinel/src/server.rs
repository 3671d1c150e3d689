//! HTTP control server: health, status, force check and summary.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::error::SentinelError;
use crate::scheduler::{MonitorScheduler, TickTrigger};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<MonitorScheduler>,
}

/// Build the control router.
pub fn build_router(scheduler: Arc<MonitorScheduler>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/status", get(status))
        .route("/check", post(force_check))
        .route("/summary", post(send_summary))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { scheduler })
}

/// Serve the control router until `cancel` fires.
pub async fn serve(
    scheduler: Arc<MonitorScheduler>,
    port: u16,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %addr, "Starting HTTP control server");

    axum::serve(listener, build_router(scheduler))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
}

fn error_response(e: &SentinelError) -> Response {
    let status = match e {
        SentinelError::NotInitialized | SentinelError::ShuttingDown => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "error": e.to_string() }))).into_response()
}

async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "state": state.scheduler.state(),
    }))
}

async fn status(State(state): State<AppState>) -> Response {
    Json(state.scheduler.status()).into_response()
}

async fn force_check(State(state): State<AppState>) -> Response {
    match state.scheduler.tick(TickTrigger::Manual).await {
        Ok(report) => Json(json!({ "status": "ok", "report": report })).into_response(),
        Err(e) => {
            error!(error = %e, "Force check failed");
            error_response(&e)
        }
    }
}

async fn send_summary(State(state): State<AppState>) -> Response {
    match state.scheduler.send_summary().await {
        Ok(report) => Json(json!({ "status": "ok", "summary": report })).into_response(),
        Err(e) => {
            error!(error = %e, "Summary failed");
            error_response(&e)
        }
    }
}
