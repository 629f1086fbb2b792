//! Admin moderation endpoints
//!
//! Account and listing moderation, the seller blacklist, and storage
//! housekeeping. Every route here requires an admin session; the seller
//! reapplication route lives in its own router because sellers call it.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{delete, get, post},
    Router,
};

use super::dto::{
    AccountResponse, ApprovalResponse, BlacklistRequest, BlacklistResponse, ProductPageResponse,
    ReapplyRequest, ReapplyResponse, ReinstatementResponse, RejectRequest, RejectionResponse,
    SweepResponse,
};
use crate::auth::{CurrentUser, RequireAdmin};
use crate::data::{AccountsRepository, Product, ProductFilters, Role};
use crate::error::AppError;
use crate::AppState;

/// Create admin router
///
/// Routes:
/// - POST /accounts/:id/approve - Approve an account
/// - POST /accounts/:id/reject - Reject an account with a reason
/// - POST /accounts/:id/blacklist - Blacklist a seller
/// - DELETE /accounts/:id/blacklist - Lift a seller's blacklist
/// - GET /accounts/:id - Inspect an account
/// - GET /products - Moderation queue over every listing state
/// - POST /products/:id/approve - Approve a listing
/// - POST /products/:id/reject - Reject a listing with a reason
/// - DELETE /assets/:id - Two-phase delete of a stored object
/// - POST /assets/sweep - Retry stuck deletions
pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/accounts/:id", get(get_account))
        .route("/accounts/:id/approve", post(approve_account))
        .route("/accounts/:id/reject", post(reject_account))
        .route(
            "/accounts/:id/blacklist",
            post(blacklist_seller).delete(remove_blacklist),
        )
        .route("/products", get(list_products_for_moderation))
        .route("/products/:id/approve", post(approve_product))
        .route("/products/:id/reject", post(reject_product))
        .route("/assets/:id", delete(delete_asset))
        .route("/assets/sweep", post(sweep_assets))
}

/// Seller-facing blacklist router
///
/// Routes:
/// - POST /reapply - A blacklisted seller requests review
pub fn reapply_router() -> Router<AppState> {
    Router::new().route("/reapply", post(request_reapplication))
}

// =============================================================================
// Accounts
// =============================================================================

/// GET /api/admin/accounts/:id
async fn get_account(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path(id): Path<String>,
) -> Result<Json<AccountResponse>, AppError> {
    let account = state.db.get_account(&id).await?.ok_or(AppError::NotFound)?;
    Ok(Json(account.into()))
}

/// POST /api/admin/accounts/:id/approve
async fn approve_account(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<String>,
) -> Result<Json<ApprovalResponse>, AppError> {
    let outcome = state.moderation.approve(&admin.account_id, &id).await?;
    Ok(Json(outcome.into()))
}

/// POST /api/admin/accounts/:id/reject
async fn reject_account(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<String>,
    Json(request): Json<RejectRequest>,
) -> Result<Json<RejectionResponse>, AppError> {
    let outcome = state
        .moderation
        .reject(&admin.account_id, &id, &request.reason)
        .await?;
    Ok(Json(outcome.into()))
}

/// POST /api/admin/accounts/:id/blacklist
async fn blacklist_seller(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<String>,
    Json(request): Json<BlacklistRequest>,
) -> Result<Json<BlacklistResponse>, AppError> {
    let outcome = state
        .moderation
        .blacklist(&admin.account_id, &id, &request.reason, request.expires_at)
        .await?;
    Ok(Json(BlacklistResponse {
        account: outcome.seller.into(),
        deactivated_products: outcome.deactivated_products,
        notified: outcome.notified,
    }))
}

/// DELETE /api/admin/accounts/:id/blacklist
async fn remove_blacklist(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path(id): Path<String>,
) -> Result<Json<ReinstatementResponse>, AppError> {
    let outcome = state.moderation.remove_blacklist(&id).await?;
    Ok(Json(ReinstatementResponse {
        account: outcome.seller.into(),
        reactivated_products: outcome.reactivated_products,
        notified: outcome.notified,
    }))
}

/// POST /api/blacklist/reapply
async fn request_reapplication(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Json(request): Json<ReapplyRequest>,
) -> Result<Json<ReapplyResponse>, AppError> {
    if session.role != Role::Seller {
        return Err(AppError::Forbidden);
    }
    let outcome = state
        .moderation
        .request_reapplication(&session.account_id, &request.reason)
        .await?;
    Ok(Json(ReapplyResponse {
        notified_admins: outcome.notified_admins,
    }))
}

// =============================================================================
// Listings
// =============================================================================

/// GET /api/admin/products
async fn list_products_for_moderation(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Query(filters): Query<ProductFilters>,
) -> Result<Json<ProductPageResponse>, AppError> {
    let page = state.catalog.list_for_moderation(&filters).await?;
    Ok(Json(page.into()))
}

/// POST /api/admin/products/:id/approve
async fn approve_product(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path(id): Path<String>,
) -> Result<Json<Product>, AppError> {
    let product = state.catalog.approve_product(&id).await?;
    Ok(Json(product))
}

/// POST /api/admin/products/:id/reject
async fn reject_product(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path(id): Path<String>,
    Json(request): Json<RejectRequest>,
) -> Result<Json<Product>, AppError> {
    let product = state.catalog.reject_product(&id, &request.reason).await?;
    Ok(Json(product))
}

// =============================================================================
// Storage housekeeping
// =============================================================================

/// DELETE /api/admin/assets/:id
async fn delete_asset(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.assets.delete_asset(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/admin/assets/sweep
async fn sweep_assets(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
) -> Result<Json<SweepResponse>, AppError> {
    let cleaned = state.assets.sweep_deleting().await?;
    Ok(Json(SweepResponse { cleaned }))
}
