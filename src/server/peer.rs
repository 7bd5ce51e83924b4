use std::collections::BTreeMap;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::cancel::CancelOnDrop;
use crate::peer::PeerClient;
use crate::types::{DriveMetrics, UpdateRequest};

use super::{error_response, AppState};

/// `POST /peer/v1/update`: apply an update dispatched by a coordinator.
///
/// If the coordinator goes away before the swap starts, the update is abandoned.
pub(super) async fn update(
    State(state): State<AppState>,
    Json(request): Json<UpdateRequest>,
) -> Response {
    let _hold = state.restarts.hold();
    let (_cancel, signal) = CancelOnDrop::new();
    match state.local.apply_update(&request, signal).await {
        Ok(result) => Json(result).into_response(),
        Err(err) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "PeerUpdateFailed",
            err.to_string(),
        ),
    }
}

/// `GET /peer/v1/drives`: activity of every registered local drive.
pub(super) async fn drives(State(state): State<AppState>) -> Json<BTreeMap<String, DriveMetrics>> {
    Json(state.drives.snapshot_all())
}
