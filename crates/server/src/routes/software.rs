use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use orchestrator::{CommandCheck, InstallRequest, ScanReport, SoftwareListing, UpdateStatus};
use serde::{Deserialize, Serialize};
use toolshed_core::InstalledRecord;
use utoipa::ToSchema;

use crate::auth::AuthenticatedUser;
use crate::error::{AppError, ErrorResponse};
use crate::state::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckCommandRequest {
    pub command: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateVersionRequest {
    pub version: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ScanResponse {
    pub success: bool,
    pub message: String,
    pub report: ScanReport,
}

#[utoipa::path(
    get,
    path = "/api/software",
    responses(
        (status = 200, description = "Catalog with install state", body = Vec<SoftwareListing>),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse)
    ),
    tag = "software"
)]
pub async fn list_software(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<Vec<SoftwareListing>>, AppError> {
    let listing = state.software.list_software(&user.owner_id).await?;
    Ok(Json(listing))
}

#[utoipa::path(
    get,
    path = "/api/software/installed",
    responses(
        (status = 200, description = "Caller's installed software", body = Vec<InstalledRecord>)
    ),
    tag = "software"
)]
pub async fn list_installed(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<Vec<InstalledRecord>>, AppError> {
    let records = state.software.list_installed(&user.owner_id).await?;
    Ok(Json(records))
}

#[utoipa::path(
    get,
    path = "/api/software/users/{owner_id}",
    params(("owner_id" = String, Path, description = "Owner whose records to list")),
    responses(
        (status = 200, description = "Owner's installed software", body = Vec<InstalledRecord>),
        (status = 403, description = "Caller is not an admin", body = ErrorResponse)
    ),
    tag = "software"
)]
pub async fn list_installed_for_owner(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(owner_id): Path<String>,
) -> Result<Json<Vec<InstalledRecord>>, AppError> {
    user.require_admin()?;

    let records = state.software.list_installed(&owner_id).await?;
    Ok(Json(records))
}

#[utoipa::path(
    post,
    path = "/api/software/check-command",
    request_body = CheckCommandRequest,
    responses(
        (status = 200, description = "Whether the command or package exists", body = CommandCheck),
        (status = 400, description = "Empty command", body = ErrorResponse)
    ),
    tag = "software"
)]
pub async fn check_command(
    State(state): State<AppState>,
    AuthenticatedUser(_user): AuthenticatedUser,
    Json(payload): Json<CheckCommandRequest>,
) -> Result<Json<CommandCheck>, AppError> {
    let check = state.software.check_command(&payload.command).await?;
    Ok(Json(check))
}

#[utoipa::path(
    post,
    path = "/api/software/install",
    request_body = InstallRequest,
    responses(
        (status = 201, description = "Software installed and recorded", body = InstalledRecord),
        (status = 400, description = "Invalid request or already installed", body = ErrorResponse),
        (status = 404, description = "Unknown app or not available on host", body = ErrorResponse),
        (status = 409, description = "Another install is running", body = ErrorResponse),
        (status = 500, description = "Package manager failure", body = ErrorResponse)
    ),
    tag = "software"
)]
pub async fn install_software(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(payload): Json<InstallRequest>,
) -> Result<(StatusCode, Json<InstalledRecord>), AppError> {
    // Detached from the request: a dropped connection does not cancel brew.
    let installer = state.installer.clone();
    let record = tokio::spawn(async move { installer.install(&user, &payload).await })
        .await
        .map_err(|e| AppError::Internal(format!("Install task failed: {}", e)))??;

    Ok((StatusCode::CREATED, Json(record)))
}

#[utoipa::path(
    post,
    path = "/api/software/scan",
    responses(
        (status = 200, description = "Scan finished; success is false if any query failed", body = ScanResponse)
    ),
    tag = "software"
)]
pub async fn scan_software(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<ScanResponse>, AppError> {
    let report = state.reconciler.scan(&user).await?;
    let success = report.success();

    let message = if success {
        "Software scan completed successfully".to_string()
    } else {
        format!(
            "Software scan finished with {} failed queries",
            report.failed.len()
        )
    };

    Ok(Json(ScanResponse {
        success,
        message,
        report,
    }))
}

#[utoipa::path(
    put,
    path = "/api/software/{app_id}",
    params(("app_id" = String, Path, description = "Catalog id")),
    request_body = UpdateVersionRequest,
    responses(
        (status = 200, description = "Record updated", body = InstalledRecord),
        (status = 404, description = "No record for this app", body = ErrorResponse)
    ),
    tag = "software"
)]
pub async fn update_version(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(app_id): Path<String>,
    Json(payload): Json<UpdateVersionRequest>,
) -> Result<Json<InstalledRecord>, AppError> {
    let record = state
        .software
        .update_version(&user.owner_id, &app_id, &payload.version)
        .await?;
    Ok(Json(record))
}

#[utoipa::path(
    delete,
    path = "/api/software/{app_id}",
    params(("app_id" = String, Path, description = "Catalog id")),
    responses(
        (status = 204, description = "Record removed"),
        (status = 404, description = "No record for this app", body = ErrorResponse)
    ),
    tag = "software"
)]
pub async fn uninstall_software(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(app_id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.software.uninstall(&user.owner_id, &app_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/api/software/{app_id}/updates",
    params(("app_id" = String, Path, description = "Catalog id")),
    responses(
        (status = 200, description = "Recorded and host versions", body = UpdateStatus),
        (status = 404, description = "No record, or absent on host", body = ErrorResponse)
    ),
    tag = "software"
)]
pub async fn check_updates(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(app_id): Path<String>,
) -> Result<Json<UpdateStatus>, AppError> {
    let status = state
        .software
        .check_updates(&user.owner_id, &app_id)
        .await?;
    Ok(Json(status))
}
