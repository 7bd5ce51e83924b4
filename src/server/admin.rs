use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use tracing::warn;

use crate::types::{LegacyUpdateStatus, UpdateApiVersion, UpdateRequest};

use super::{error_response, AppState};

#[derive(Debug, Deserialize)]
pub(super) struct UpdateParams {
    #[serde(rename = "updateURL", default)]
    update_url: Option<String>,
    #[serde(rename = "type", default)]
    api_type: Option<String>,
    #[serde(rename = "dry-run", default)]
    dry_run: Option<String>,
}

fn parse_flag(value: Option<&str>) -> Result<bool, String> {
    match value.map(str::trim) {
        None | Some("") | Some("false") | Some("0") => Ok(false),
        Some("true") | Some("1") => Ok(true),
        Some(other) => Err(format!("invalid dry-run value `{other}`")),
    }
}

/// `POST /admin/v3/update`: update and restart every node in the cluster.
pub(super) async fn update(
    State(state): State<AppState>,
    Query(params): Query<UpdateParams>,
) -> Response {
    let version = match UpdateApiVersion::from_query(params.api_type.as_deref()) {
        Ok(version) => version,
        Err(err) => return error_response(StatusCode::BAD_REQUEST, "InvalidRequest", err.to_string()),
    };
    let dry_run = match parse_flag(params.dry_run.as_deref()) {
        Ok(dry_run) => dry_run,
        Err(message) => return error_response(StatusCode::BAD_REQUEST, "InvalidRequest", message),
    };
    if dry_run && version == UpdateApiVersion::Legacy {
        return error_response(
            StatusCode::BAD_REQUEST,
            "InvalidRequest",
            "dry-run is not supported by the legacy update API",
        );
    }

    let request = UpdateRequest::new(params.update_url.unwrap_or_default(), dry_run);
    let report = match state.coordinator.run_update(&request).await {
        Ok(report) => report,
        Err(err) => {
            warn!(error = %err, "Rejected update request");
            return error_response(StatusCode::BAD_REQUEST, "InvalidRequest", err.to_string());
        }
    };

    match version {
        UpdateApiVersion::Aggregated => Json(report).into_response(),
        UpdateApiVersion::Legacy => match LegacyUpdateStatus::from_report(&report, &state.local_host) {
            Ok(status) => Json(status).into_response(),
            Err(message) => {
                error_response(StatusCode::INTERNAL_SERVER_ERROR, "UpdateFailed", message)
            }
        },
    }
}
