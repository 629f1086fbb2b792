//! Asset ticket endpoints
//!
//! All object traffic happens between the client and R2; these routes only
//! mint tickets and record outcomes.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};

use super::dto::{ReportUploadRequest, UploadTicketRequest};
use crate::auth::CurrentUser;
use crate::data::AssetRecord;
use crate::error::AppError;
use crate::service::assets::{DownloadTicket, UploadRequest, UploadTicket};
use crate::AppState;

/// Create assets router
///
/// Routes:
/// - POST /upload-ticket - Mint a presigned upload URL (seller/admin)
/// - POST /:id/report - Record a direct upload's outcome
/// - GET /download-ticket/:product_id - Mint a presigned download URL
pub fn assets_router() -> Router<AppState> {
    Router::new()
        .route("/upload-ticket", post(request_upload_ticket))
        .route("/:id/report", post(report_uploaded))
        .route("/download-ticket/:product_id", get(issue_download_ticket))
}

/// POST /api/assets/upload-ticket
async fn request_upload_ticket(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Json(request): Json<UploadTicketRequest>,
) -> Result<(StatusCode, Json<UploadTicket>), AppError> {
    let ticket = state
        .assets
        .request_upload_ticket(
            &session.account_id,
            UploadRequest {
                file_name: request.file_name,
                content_type: request.content_type,
                media_kind: request.media_kind,
                role: request.role,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(ticket)))
}

/// POST /api/assets/:id/report
async fn report_uploaded(
    State(state): State<AppState>,
    CurrentUser(_session): CurrentUser,
    Path(id): Path<String>,
    Json(request): Json<ReportUploadRequest>,
) -> Result<Json<AssetRecord>, AppError> {
    let asset = state
        .assets
        .report_uploaded(&id, request.file_size, request.success)
        .await?;
    Ok(Json(asset))
}

/// GET /api/assets/download-ticket/:product_id
async fn issue_download_ticket(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(product_id): Path<String>,
) -> Result<Json<DownloadTicket>, AppError> {
    let ticket = state
        .assets
        .issue_download_ticket(&session.account_id, &product_id)
        .await?;
    Ok(Json(ticket))
}
