//! Request and response types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::data::{Account, ApprovalStatus, MediaKind, Page, Product, ProductKind, Role};
use crate::service::assets::AssetRole;
use crate::service::catalog::NewProduct;
use crate::service::moderation::{ApprovalOutcome, RejectionOutcome};

// =============================================================================
// Auth
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub display_name: String,
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Email, or for buyers the issued account id
    pub identifier: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub account: AccountResponse,
}

#[derive(Debug, Deserialize)]
pub struct PasswordResetRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct PasswordResetVerify {
    pub email: String,
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct PasswordResetConfirm {
    pub email: String,
    pub code: String,
    pub new_password: String,
}

#[derive(Debug, Serialize)]
pub struct PasswordResetVerifyResponse {
    pub valid: bool,
}

// =============================================================================
// Accounts
// =============================================================================

/// Public view of an account
#[derive(Debug, Serialize)]
pub struct AccountResponse {
    pub id: String,
    pub email: String,
    pub display_name: String,
    pub role: Role,
    pub approval_status: ApprovalStatus,
    pub rejection_reason: Option<String>,
    pub user_account_id: Option<String>,
    pub is_blacklisted: bool,
    pub blacklist_reason: Option<String>,
    pub blacklist_expires_at: Option<DateTime<Utc>>,
    pub reapplication_requested_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<Account> for AccountResponse {
    fn from(account: Account) -> Self {
        Self {
            id: account.id,
            email: account.email,
            display_name: account.display_name,
            role: account.role,
            approval_status: account.approval_status,
            rejection_reason: account.rejection_reason,
            user_account_id: account.user_account_id,
            is_blacklisted: account.is_blacklisted,
            blacklist_reason: account.blacklist_reason,
            blacklist_expires_at: account.blacklist_expires_at,
            reapplication_requested_at: account.reapplication_requested_at,
            created_at: account.created_at,
        }
    }
}

/// Admin approval response
///
/// `credentials` is the only place the issued buyer password ever appears
/// in an API response.
#[derive(Debug, Serialize)]
pub struct ApprovalResponse {
    pub account: AccountResponse,
    pub credentials: Option<IssuedCredentialsResponse>,
    pub notified: bool,
}

#[derive(Debug, Serialize)]
pub struct IssuedCredentialsResponse {
    pub user_account_id: String,
    pub password: String,
}

impl From<ApprovalOutcome> for ApprovalResponse {
    fn from(outcome: ApprovalOutcome) -> Self {
        Self {
            account: outcome.account.into(),
            credentials: outcome.credentials.map(|c| IssuedCredentialsResponse {
                user_account_id: c.user_account_id,
                password: c.password,
            }),
            notified: outcome.notified,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RejectionResponse {
    pub account: AccountResponse,
    pub notified: bool,
}

impl From<RejectionOutcome> for RejectionResponse {
    fn from(outcome: RejectionOutcome) -> Self {
        Self {
            account: outcome.account.into(),
            notified: outcome.notified,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RejectRequest {
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct BlacklistRequest {
    pub reason: String,
    /// Defaults to the configured review window when omitted
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct BlacklistResponse {
    pub account: AccountResponse,
    pub deactivated_products: u64,
    pub notified: bool,
}

#[derive(Debug, Serialize)]
pub struct ReinstatementResponse {
    pub account: AccountResponse,
    pub reactivated_products: u64,
    pub notified: bool,
}

#[derive(Debug, Deserialize)]
pub struct ReapplyRequest {
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct ReapplyResponse {
    pub notified_admins: usize,
}

// =============================================================================
// Catalog
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub price_amount: Option<i64>,
    pub credits_cost: Option<i64>,
    pub category_id: Option<String>,
    pub item_id: Option<String>,
    pub kit_id: Option<String>,
    #[serde(default)]
    pub is_kit_product: bool,
    #[serde(flatten)]
    pub kind: ProductKind,
}

impl From<CreateProductRequest> for NewProduct {
    fn from(request: CreateProductRequest) -> Self {
        Self {
            name: request.name,
            description: request.description,
            tags: request.tags,
            price_amount: request.price_amount,
            credits_cost: request.credits_cost,
            category_id: request.category_id,
            item_id: request.item_id,
            kit_id: request.kit_id,
            is_kit_product: request.is_kit_product,
            kind: request.kind,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RelatedProductsRequest {
    pub related_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ProductPageResponse {
    pub items: Vec<Product>,
    pub limit: i64,
    pub offset: i64,
}

impl From<Page<Product>> for ProductPageResponse {
    fn from(page: Page<Product>) -> Self {
        Self {
            items: page.items,
            limit: page.limit,
            offset: page.offset,
        }
    }
}

// =============================================================================
// Assets
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct UploadTicketRequest {
    pub file_name: String,
    pub content_type: String,
    pub media_kind: MediaKind,
    pub role: AssetRole,
}

#[derive(Debug, Deserialize)]
pub struct ReportUploadRequest {
    pub file_size: i64,
    pub success: bool,
}

#[derive(Debug, Serialize)]
pub struct SweepResponse {
    pub cleaned: u64,
}
