//! Catalog endpoints
//!
//! Public browsing plus seller listing management.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post, put},
    Router,
};

use super::dto::{
    CreateProductRequest, ProductPageResponse, RelatedProductsRequest,
};
use crate::auth::CurrentUser;
use crate::data::{Product, ProductFilters, ProductStatus, Role};
use crate::error::AppError;
use crate::AppState;

/// Create catalog router
///
/// Routes:
/// - GET /products - Browse active, approved listings
/// - GET /products/:id - Fetch one visible listing
/// - POST /products - Create a listing (seller)
/// - GET /my-products - The caller's own listings, any state (seller)
/// - PUT /products/:id/related - Replace related listings (owner or admin)
/// - POST /products/:id/assets/:asset_id - Attach an uploaded asset
pub fn catalog_router() -> Router<AppState> {
    Router::new()
        .route("/products", get(list_products).post(create_product))
        .route("/products/:id", get(get_product))
        .route("/my-products", get(list_my_products))
        .route("/products/:id/related", put(set_related_products))
        .route("/products/:id/assets/:asset_id", post(attach_asset))
}

/// GET /api/catalog/products
async fn list_products(
    State(state): State<AppState>,
    Query(filters): Query<ProductFilters>,
) -> Result<Json<ProductPageResponse>, AppError> {
    let page = state.catalog.list_public(&filters).await?;
    Ok(Json(page.into()))
}

/// GET /api/catalog/products/:id
///
/// Listings that are not active and approved do not exist as far as the
/// public surface is concerned.
async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Product>, AppError> {
    let product = state.catalog.get_product(&id).await?;
    if product.status != ProductStatus::Active || !product.is_admin_approved {
        return Err(AppError::NotFound);
    }
    Ok(Json(product))
}

/// POST /api/catalog/products
async fn create_product(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Json(request): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<Product>), AppError> {
    let product = state
        .catalog
        .create_product(&session.account_id, request.into())
        .await?;
    Ok((StatusCode::CREATED, Json(product)))
}

/// GET /api/catalog/my-products
async fn list_my_products(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Query(mut filters): Query<ProductFilters>,
) -> Result<Json<ProductPageResponse>, AppError> {
    if session.role != Role::Seller {
        return Err(AppError::Forbidden);
    }
    filters.seller_id = Some(session.account_id.clone());
    let page = state.catalog.list_for_moderation(&filters).await?;
    Ok(Json(page.into()))
}

/// PUT /api/catalog/products/:id/related
async fn set_related_products(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(id): Path<String>,
    Json(request): Json<RelatedProductsRequest>,
) -> Result<Json<Product>, AppError> {
    let product = state
        .catalog
        .set_related_products(&session.account_id, session.role, &id, request.related_ids)
        .await?;
    Ok(Json(product))
}

/// POST /api/catalog/products/:id/assets/:asset_id
async fn attach_asset(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path((id, asset_id)): Path<(String, String)>,
) -> Result<Json<Product>, AppError> {
    let product = state
        .catalog
        .attach_asset(&session.account_id, session.role, &id, &asset_id)
        .await?;
    Ok(Json(product))
}
