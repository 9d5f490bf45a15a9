//! HTTP handlers.
//!
//! JSON endpoints answer with the `{ success, data?, error? }` envelope.
//! The config endpoints return the raw file so a secondary can write it
//! back byte for byte.

use std::path::Path;

use axum::Json;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::{error, info, warn};

use vipguard_core::{HealthStatus, Role};
use vipguard_rollout::SyncError;

use crate::ApiState;

const YAML_CONTENT_TYPE: &str = "application/x-yaml";

/// Response wrapper for consistent API format.
#[derive(Serialize)]
struct ApiResponse<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> Response {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
        .into_response()
}

// ── Health ─────────────────────────────────────────────────────

#[derive(Serialize)]
struct HealthBody {
    status: HealthStatus,
    role: Role,
}

/// GET /health
pub async fn health(State(state): State<ApiState>) -> Response {
    match state.monitor.health().await {
        HealthStatus::Healthy => ApiResponse::ok(HealthBody {
            status: HealthStatus::Healthy,
            role: state.role,
        })
        .into_response(),
        HealthStatus::Unhealthy => {
            error_response("proxy container is not healthy", StatusCode::SERVICE_UNAVAILABLE)
        }
        HealthStatus::Unknown => {
            error_response("proxy container not found", StatusCode::SERVICE_UNAVAILABLE)
        }
    }
}

// ── Config export ──────────────────────────────────────────────

/// GET /config/dynamic
pub async fn dynamic_config(State(state): State<ApiState>) -> Response {
    serve_file(&state.dynamic_path, "dynamic").await
}

/// GET /config/static
pub async fn static_config(State(state): State<ApiState>) -> Response {
    serve_file(&state.static_path, "static").await
}

async fn serve_file(path: &Path, artifact: &str) -> Response {
    match tokio::fs::read(path).await {
        Ok(content) => ([(header::CONTENT_TYPE, YAML_CONTENT_TYPE)], content).into_response(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(path = %path.display(), "{artifact} configuration file not found");
            error_response(
                &format!("{artifact} configuration file not found"),
                StatusCode::NOT_FOUND,
            )
        }
        Err(e) => {
            error!(path = %path.display(), error = %e, "failed to read {artifact} configuration");
            error_response(
                &format!("failed to read {artifact} configuration"),
                StatusCode::INTERNAL_SERVER_ERROR,
            )
        }
    }
}

// ── Secondary sync ─────────────────────────────────────────────

/// POST /update-config
pub async fn update_config(State(state): State<ApiState>) -> Response {
    info!("received configuration update request");
    // Detached: if the caller hangs up, the restart-and-wait still finishes
    // and keeps holding the sync lock until it does.
    let sync = state.sync.clone();
    let result = match tokio::spawn(async move { sync.update_config().await }).await {
        Ok(result) => result,
        Err(e) => {
            error!(error = %e, "configuration update task failed");
            return error_response("configuration update failed", StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    match result {
        Ok(report) => ApiResponse::ok(report).into_response(),
        Err(e) => {
            let status = sync_status(&e);
            if status.is_server_error() {
                error!(error = %e, status = status.as_u16(), "configuration update failed");
            } else {
                warn!(error = %e, status = status.as_u16(), "configuration update rejected");
            }
            error_response(sync_message(&e), status)
        }
    }
}

fn sync_status(e: &SyncError) -> StatusCode {
    match e {
        SyncError::NotSecondary => StatusCode::BAD_REQUEST,
        SyncError::ContainerNotFound => StatusCode::NOT_FOUND,
        SyncError::HealthTimeout { .. } => StatusCode::SERVICE_UNAVAILABLE,
        SyncError::NoPrimary
        | SyncError::PrimaryUnhealthy
        | SyncError::Fetch { .. }
        | SyncError::Write { .. }
        | SyncError::Runtime(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Caller-facing text. Paths, OS errors and Docker messages stay in the log.
fn sync_message(e: &SyncError) -> &'static str {
    match e {
        SyncError::NotSecondary => "this endpoint is only available on secondary instances",
        SyncError::NoPrimary => "primary endpoint is not configured",
        SyncError::PrimaryUnhealthy => "primary instance is not healthy, not updating configuration",
        SyncError::Fetch { artifact: "dynamic", .. } => {
            "failed to retrieve dynamic configuration from primary"
        }
        SyncError::Fetch { .. } => "failed to retrieve static configuration from primary",
        SyncError::Write { .. } => "failed to write configuration",
        SyncError::ContainerNotFound => "proxy container not found",
        SyncError::HealthTimeout { .. } => "proxy container did not become healthy in time",
        SyncError::Runtime(_) => "container runtime request failed",
    }
}
