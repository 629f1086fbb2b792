//! Data models
//!
//! Rust structs representing database entities. All models use ULID for IDs
//! and chrono for timestamps. Tri-state and variant fields are closed enums
//! stored as TEXT, so a row can never hold an undefined state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// ID Types
// =============================================================================

/// Entity ID wrapper (ULID format, 26 characters)
///
/// Example: "01ARZ3NDEKTSV4RRFFQ69G5FAV"
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    /// Generate a new ULID
    pub fn new() -> Self {
        Self(ulid::Ulid::new().to_string())
    }

    /// Create from existing string
    pub fn from_string(s: String) -> Self {
        Self(s)
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Account
// =============================================================================

/// Account role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Seller,
    Buyer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Seller => "seller",
            Self::Buyer => "buyer",
        }
    }
}

/// Tri-state approval gate for sellers, buyers, and products
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

/// A marketplace account (admin, seller, or buyer)
///
/// `approval_status` and `is_blacklisted` are orthogonal axes: a seller can
/// be approved and blacklisted at the same time. Buyer login credentials
/// (`user_account_id`, `password_hash`) are issued only on approval.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Account {
    pub id: String,
    pub email: String,
    pub display_name: String,
    pub role: Role,
    pub approval_status: ApprovalStatus,
    pub rejection_reason: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub approved_by: Option<String>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub rejected_by: Option<String>,
    /// Buyer login identifier, issued only on approval
    pub user_account_id: Option<String>,
    /// Argon2id hash; never serialized out
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub is_blacklisted: bool,
    pub blacklist_reason: Option<String>,
    pub blacklisted_at: Option<DateTime<Utc>>,
    pub blacklist_expires_at: Option<DateTime<Utc>>,
    pub blacklisted_by: Option<String>,
    pub reapplication_requested_at: Option<DateTime<Utc>>,
    pub reapplication_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Product
// =============================================================================

/// Product listing status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum ProductStatus {
    Draft,
    Pending,
    Active,
    Inactive,
    Rejected,
    Archived,
    Deleted,
}

impl ProductStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Rejected => "rejected",
            Self::Archived => "archived",
            Self::Deleted => "deleted",
        }
    }
}

/// Digital asset format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigitalFormat {
    Pdf,
    Document,
    Zip,
    Image,
}

/// Variant-specific product payload
///
/// A closed tagged sum: each variant carries its required fields, so a
/// persisted product can never be missing a variant field at runtime.
/// Consumers match exhaustively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "variant", rename_all = "lowercase")]
pub enum ProductKind {
    Physical {
        stock: i64,
    },
    Digital {
        format: DigitalFormat,
        zip_asset_id: Option<String>,
        preview_asset_id: Option<String>,
    },
    Service {
        delivery_time_days: i64,
        revisions: i64,
        deliverables: String,
        requirements: String,
    },
}

impl ProductKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Physical { .. } => "physical",
            Self::Digital { .. } => "digital",
            Self::Service { .. } => "service",
        }
    }
}

/// A product listing
///
/// Placement invariant: exactly one of `{category_id AND item_id}` or
/// `{kit_id}` is set, and `is_kit_product` agrees with `kit_id` presence.
/// Pricing invariant: at least one of `price_amount`/`credits_cost` is a
/// positive value. Both are enforced before any write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub seller_id: String,
    pub name: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    /// Price in minor currency units
    pub price_amount: Option<i64>,
    /// Alternative price in platform credits
    pub credits_cost: Option<i64>,
    pub status: ProductStatus,
    pub is_admin_approved: bool,
    pub is_admin_rejected: bool,
    pub admin_rejection_reason: Option<String>,
    pub category_id: Option<String>,
    pub item_id: Option<String>,
    pub kit_id: Option<String>,
    pub is_kit_product: bool,
    pub kind: ProductKind,
    pub related_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Read-side filters for product listings
///
/// Pure narrowing: filters never affect state. `limit` is clamped by the
/// repository.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductFilters {
    pub seller_id: Option<String>,
    pub category_id: Option<String>,
    pub item_id: Option<String>,
    pub kit_id: Option<String>,
    /// Case-insensitive name substring
    pub name: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// A page of results
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub limit: i64,
    pub offset: i64,
}

// =============================================================================
// Asset (File/Image)
// =============================================================================

/// Storage realm backing an object key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum StorageRealm {
    /// Browsable via deterministic URL (previews, thumbnails, carousels)
    Public,
    /// Accessible only via signed, time-boxed URLs (main/zip assets)
    Private,
}

impl StorageRealm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
        }
    }
}

/// Media kind of a stored file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum MediaKind {
    Pdf,
    Document,
    Zip,
    Image,
}

/// Object lifecycle state
///
/// `uploaded` reflects the client's report, not a storage probe.
/// `deleting` is the first phase of the two-phase delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum AssetStatus {
    Pending,
    Uploaded,
    Failed,
    Deleting,
}

/// File/Image metadata record
///
/// The object itself lives in R2; this row holds the key, realm, role flags,
/// and lifecycle state.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AssetRecord {
    pub id: String,
    pub object_key: String,
    pub file_name: String,
    pub content_type: String,
    pub media_kind: MediaKind,
    pub realm: StorageRealm,
    pub is_preview: bool,
    pub is_main: bool,
    pub is_thumbnail: bool,
    pub product_id: Option<String>,
    pub status: AssetStatus,
    pub file_size: Option<i64>,
    /// Deterministic public URL; only set for public-realm assets
    pub public_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// One-time codes
// =============================================================================

/// Purpose a one-time code is scoped to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum OtpPurpose {
    PasswordReset,
}

impl OtpPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PasswordReset => "password_reset",
        }
    }
}

/// Short-lived single-use numeric code
///
/// At most one live code exists per `(email, purpose)`; issuing a new one
/// deletes the previous row.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct OneTimeCode {
    pub id: String,
    pub email: String,
    pub code: String,
    pub purpose: OtpPurpose,
    pub expires_at: DateTime<Utc>,
    pub is_used: bool,
    pub created_at: DateTime<Utc>,
}
