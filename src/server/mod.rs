//! HTTP surface: the admin update trigger and the peer-to-peer update API.

mod admin;
mod peer;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::net::TcpListener;
use tracing::info;

use crate::coordinator::UpdateCoordinator;
use crate::deployment::RestartScheduler;
use crate::drain::LocalDriveTracker;
use crate::error::{AppError, ErrorResponse};
use crate::peer::{LocalPeer, PEER_DRIVES_PATH, PEER_UPDATE_PATH};

pub const ADMIN_UPDATE_PATH: &str = "/admin/v3/update";
pub const HEALTH_PATH: &str = "/health";

/// Application state shared across HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub local_host: String,
    pub coordinator: Arc<UpdateCoordinator>,
    pub local: Arc<LocalPeer>,
    pub drives: LocalDriveTracker,
    pub restarts: RestartScheduler,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(HEALTH_PATH, get(health_check))
        .route(ADMIN_UPDATE_PATH, post(admin::update))
        .route(PEER_UPDATE_PATH, post(peer::update))
        .route(PEER_DRIVES_PATH, get(peer::drives))
        .with_state(state)
}

/// Serves the API until Ctrl-C.
pub async fn start_server(listen_addr: &str, state: AppState) -> Result<(), AppError> {
    let listener = TcpListener::bind(listen_addr).await?;
    info!(addr = %listener.local_addr()?, host = %state.local_host, "Update API listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown requested");
    }
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

pub(crate) fn error_response(status: StatusCode, code: &str, message: impl Into<String>) -> Response {
    (status, Json(ErrorResponse::new(status, code, message))).into_response()
}
