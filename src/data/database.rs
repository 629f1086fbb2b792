//! SQLite database operations
//!
//! All persistent state goes through this module. The [`Database`] wrapper
//! owns the pool and implements every repository trait in
//! [`crate::data::repo`]; guarded transitions are single conditional
//! `UPDATE ... WHERE` statements whose `rows_affected` result is the guard
//! outcome.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, QueryBuilder, Sqlite, SqlitePool};
use std::path::Path;

use super::models::*;
use super::repo::{
    AccountsRepository, AssetsRepository, OneTimeCodesRepository, ProductsRepository,
};
use crate::error::{AppError, Result};

const DEFAULT_PAGE_LIMIT: i64 = 50;
const MAX_PAGE_LIMIT: i64 = 200;

/// Database connection pool wrapper.
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    /// Connect to the SQLite database
    ///
    /// Creates the database file if it doesn't exist.
    /// Runs pending migrations automatically.
    ///
    /// # Arguments
    /// * `path` - Path to SQLite database file
    ///
    /// # Errors
    /// Returns error if connection or migration fails
    pub async fn connect(path: &Path) -> Result<Self> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| AppError::Database(sqlx::Error::Io(e)))?;
        }

        let connection_string = format!("sqlite:{}?mode=rwc", path.display());
        let pool = SqlitePool::connect(&connection_string).await?;

        sqlx::migrate!("./migrations").run(&pool).await.map_err(|e| {
            tracing::error!("Migration failed: {}", e);
            AppError::Internal(anyhow::anyhow!("Migration failed: {}", e))
        })?;

        tracing::info!("Database connected and migrated successfully");

        Ok(Self { pool })
    }
}

/// Whether a repository error is a UNIQUE constraint violation.
///
/// Used by credential issuance to retry with a fresh identifier when the
/// database, not the pre-insert probe, detects the collision.
pub fn is_unique_violation(error: &AppError) -> bool {
    match error {
        AppError::Database(sqlx::Error::Database(db)) => db.is_unique_violation(),
        _ => false,
    }
}

// =============================================================================
// Product row mapping
// =============================================================================

/// Raw product row; JSON columns are decoded into [`Product`] on read so the
/// tagged variant is always well-formed in memory.
#[derive(sqlx::FromRow)]
struct ProductRow {
    id: String,
    seller_id: String,
    name: String,
    description: Option<String>,
    tags: String,
    price_amount: Option<i64>,
    credits_cost: Option<i64>,
    status: ProductStatus,
    is_admin_approved: bool,
    is_admin_rejected: bool,
    admin_rejection_reason: Option<String>,
    category_id: Option<String>,
    item_id: Option<String>,
    kit_id: Option<String>,
    is_kit_product: bool,
    variant_data: String,
    related_ids: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProductRow> for Product {
    type Error = AppError;

    fn try_from(row: ProductRow) -> Result<Product> {
        let kind: ProductKind = serde_json::from_str(&row.variant_data).map_err(|e| {
            AppError::Internal(anyhow::anyhow!(
                "corrupt variant payload for product {}: {}",
                row.id,
                e
            ))
        })?;
        let tags: Vec<String> = serde_json::from_str(&row.tags).unwrap_or_default();
        let related_ids: Vec<String> = serde_json::from_str(&row.related_ids).unwrap_or_default();

        Ok(Product {
            id: row.id,
            seller_id: row.seller_id,
            name: row.name,
            description: row.description,
            tags,
            price_amount: row.price_amount,
            credits_cost: row.credits_cost,
            status: row.status,
            is_admin_approved: row.is_admin_approved,
            is_admin_rejected: row.is_admin_rejected,
            admin_rejection_reason: row.admin_rejection_reason,
            category_id: row.category_id,
            item_id: row.item_id,
            kit_id: row.kit_id,
            is_kit_product: row.is_kit_product,
            kind,
            related_ids,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn encode_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| AppError::Internal(e.into()))
}

/// Escape `LIKE` metacharacters so a name filter matches literally.
fn escape_like(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn page_bounds(filters: &ProductFilters) -> (i64, i64) {
    let limit = filters
        .limit
        .unwrap_or(DEFAULT_PAGE_LIMIT)
        .clamp(1, MAX_PAGE_LIMIT);
    let offset = filters.offset.unwrap_or(0).max(0);
    (limit, offset)
}

impl Database {
    async fn list_products(
        &self,
        filters: &ProductFilters,
        public_only: bool,
    ) -> Result<Page<Product>> {
        let (limit, offset) = page_bounds(filters);

        let mut query = QueryBuilder::<Sqlite>::new("SELECT * FROM products WHERE 1 = 1");
        if public_only {
            query.push(" AND status = 'active' AND is_admin_approved = 1");
        }
        if let Some(seller_id) = &filters.seller_id {
            query.push(" AND seller_id = ").push_bind(seller_id);
        }
        if let Some(category_id) = &filters.category_id {
            query.push(" AND category_id = ").push_bind(category_id);
        }
        if let Some(item_id) = &filters.item_id {
            query.push(" AND item_id = ").push_bind(item_id);
        }
        if let Some(kit_id) = &filters.kit_id {
            query.push(" AND kit_id = ").push_bind(kit_id);
        }
        if let Some(name) = &filters.name {
            query
                .push(" AND LOWER(name) LIKE ")
                .push_bind(format!("%{}%", escape_like(&name.to_lowercase())))
                .push(" ESCAPE '\\'");
        }
        query.push(" ORDER BY created_at DESC, id DESC LIMIT ");
        query.push_bind(limit);
        query.push(" OFFSET ");
        query.push_bind(offset);

        let rows: Vec<ProductRow> = query.build_query_as().fetch_all(&self.pool).await?;
        let items = rows
            .into_iter()
            .map(Product::try_from)
            .collect::<Result<Vec<_>>>()?;

        Ok(Page {
            items,
            limit,
            offset,
        })
    }
}

// =============================================================================
// Accounts
// =============================================================================

#[async_trait]
impl AccountsRepository for Database {
    async fn insert_account(&self, account: &Account) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO accounts (
                id, email, display_name, role, approval_status,
                rejection_reason, approved_at, approved_by, rejected_at, rejected_by,
                user_account_id, password_hash,
                is_blacklisted, blacklist_reason, blacklisted_at,
                blacklist_expires_at, blacklisted_by,
                reapplication_requested_at, reapplication_reason,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&account.id)
        .bind(&account.email)
        .bind(&account.display_name)
        .bind(account.role)
        .bind(account.approval_status)
        .bind(&account.rejection_reason)
        .bind(account.approved_at)
        .bind(&account.approved_by)
        .bind(account.rejected_at)
        .bind(&account.rejected_by)
        .bind(&account.user_account_id)
        .bind(&account.password_hash)
        .bind(account.is_blacklisted)
        .bind(&account.blacklist_reason)
        .bind(account.blacklisted_at)
        .bind(account.blacklist_expires_at)
        .bind(&account.blacklisted_by)
        .bind(account.reapplication_requested_at)
        .bind(&account.reapplication_reason)
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_account(&self, id: &str) -> Result<Option<Account>> {
        let account = sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(account)
    }

    async fn get_account_by_email(&self, email: &str) -> Result<Option<Account>> {
        let account = sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(account)
    }

    async fn get_account_by_login(&self, identifier: &str) -> Result<Option<Account>> {
        let account = sqlx::query_as::<_, Account>(
            "SELECT * FROM accounts WHERE email = ?1 OR user_account_id = ?1",
        )
        .bind(identifier)
        .fetch_optional(&self.pool)
        .await?;
        Ok(account)
    }

    async fn mark_approved(&self, id: &str, admin_id: &str, at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE accounts
            SET approval_status = 'approved', approved_at = ?, approved_by = ?,
                rejection_reason = NULL, rejected_at = NULL, rejected_by = NULL,
                updated_at = ?
            WHERE id = ? AND approval_status <> 'approved'
            "#,
        )
        .bind(at)
        .bind(admin_id)
        .bind(at)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn mark_approved_with_credentials(
        &self,
        id: &str,
        admin_id: &str,
        user_account_id: &str,
        password_hash: &str,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE accounts
            SET approval_status = 'approved', approved_at = ?, approved_by = ?,
                user_account_id = ?, password_hash = ?,
                rejection_reason = NULL, rejected_at = NULL, rejected_by = NULL,
                updated_at = ?
            WHERE id = ? AND approval_status <> 'approved'
            "#,
        )
        .bind(at)
        .bind(admin_id)
        .bind(user_account_id)
        .bind(password_hash)
        .bind(at)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn mark_rejected(
        &self,
        id: &str,
        admin_id: &str,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE accounts
            SET approval_status = 'rejected', rejected_at = ?, rejected_by = ?,
                rejection_reason = ?,
                approved_at = NULL, approved_by = NULL,
                updated_at = ?
            WHERE id = ? AND approval_status <> 'rejected'
            "#,
        )
        .bind(at)
        .bind(admin_id)
        .bind(reason)
        .bind(at)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn user_account_id_exists(&self, candidate: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM accounts WHERE user_account_id = ?",
        )
        .bind(candidate)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    async fn set_blacklist(
        &self,
        id: &str,
        admin_id: &str,
        reason: &str,
        expires_at: DateTime<Utc>,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE accounts
            SET is_blacklisted = 1, blacklist_reason = ?, blacklisted_at = ?,
                blacklist_expires_at = ?, blacklisted_by = ?, updated_at = ?
            WHERE id = ? AND is_blacklisted = 0
            "#,
        )
        .bind(reason)
        .bind(at)
        .bind(expires_at)
        .bind(admin_id)
        .bind(at)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn clear_blacklist(&self, id: &str, at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE accounts
            SET is_blacklisted = 0, blacklist_reason = NULL, blacklisted_at = NULL,
                blacklist_expires_at = NULL, blacklisted_by = NULL,
                reapplication_requested_at = NULL, reapplication_reason = NULL,
                updated_at = ?
            WHERE id = ? AND is_blacklisted = 1
            "#,
        )
        .bind(at)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn record_reapplication(
        &self,
        id: &str,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE accounts
            SET reapplication_requested_at = ?, reapplication_reason = ?, updated_at = ?
            WHERE id = ? AND is_blacklisted = 1
            "#,
        )
        .bind(at)
        .bind(reason)
        .bind(at)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_admin_emails(&self) -> Result<Vec<String>> {
        let emails: Vec<String> =
            sqlx::query_scalar("SELECT email FROM accounts WHERE role = 'admin'")
                .fetch_all(&self.pool)
                .await?;
        Ok(emails)
    }

    async fn update_password_hash(
        &self,
        email: &str,
        password_hash: &str,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let result =
            sqlx::query("UPDATE accounts SET password_hash = ?, updated_at = ? WHERE email = ?")
                .bind(password_hash)
                .bind(at)
                .bind(email)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() == 1)
    }
}

// =============================================================================
// Products
// =============================================================================

#[async_trait]
impl ProductsRepository for Database {
    async fn insert_product(&self, product: &Product) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO products (
                id, seller_id, name, description, tags,
                price_amount, credits_cost, status,
                is_admin_approved, is_admin_rejected, admin_rejection_reason,
                category_id, item_id, kit_id, is_kit_product,
                variant, variant_data, related_ids,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&product.id)
        .bind(&product.seller_id)
        .bind(&product.name)
        .bind(&product.description)
        .bind(encode_json(&product.tags)?)
        .bind(product.price_amount)
        .bind(product.credits_cost)
        .bind(product.status)
        .bind(product.is_admin_approved)
        .bind(product.is_admin_rejected)
        .bind(&product.admin_rejection_reason)
        .bind(&product.category_id)
        .bind(&product.item_id)
        .bind(&product.kit_id)
        .bind(product.is_kit_product)
        .bind(product.kind.as_str())
        .bind(encode_json(&product.kind)?)
        .bind(encode_json(&product.related_ids)?)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_product(&self, id: &str) -> Result<Option<Product>> {
        let row = sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Product::try_from).transpose()
    }

    async fn mark_product_approved(&self, id: &str, at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE products
            SET status = 'active', is_admin_approved = 1,
                is_admin_rejected = 0, admin_rejection_reason = NULL,
                updated_at = ?
            WHERE id = ? AND is_admin_approved = 0
            "#,
        )
        .bind(at)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn mark_product_rejected(
        &self,
        id: &str,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE products
            SET status = 'rejected', is_admin_rejected = 1, admin_rejection_reason = ?,
                is_admin_approved = 0,
                updated_at = ?
            WHERE id = ? AND is_admin_rejected = 0
            "#,
        )
        .bind(reason)
        .bind(at)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn deactivate_all_for_seller(
        &self,
        seller_id: &str,
        at: DateTime<Utc>,
    ) -> Result<u64> {
        // One bounded statement so a crash cannot leave a partial sweep.
        let result = sqlx::query(
            "UPDATE products SET status = 'inactive', updated_at = ? WHERE seller_id = ?",
        )
        .bind(at)
        .bind(seller_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn reactivate_inactive_for_seller(
        &self,
        seller_id: &str,
        at: DateTime<Utc>,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE products SET status = 'active', updated_at = ?
            WHERE seller_id = ? AND status = 'inactive'
            "#,
        )
        .bind(at)
        .bind(seller_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn list_public(&self, filters: &ProductFilters) -> Result<Page<Product>> {
        self.list_products(filters, true).await
    }

    async fn list_for_moderation(&self, filters: &ProductFilters) -> Result<Page<Product>> {
        self.list_products(filters, false).await
    }

    async fn set_related_products(
        &self,
        id: &str,
        related_ids: &[String],
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let result =
            sqlx::query("UPDATE products SET related_ids = ?, updated_at = ? WHERE id = ?")
                .bind(encode_json(&related_ids)?)
                .bind(at)
                .bind(id)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn update_kind(
        &self,
        id: &str,
        kind: &ProductKind,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE products SET variant = ?, variant_data = ?, updated_at = ? WHERE id = ?",
        )
        .bind(kind.as_str())
        .bind(encode_json(kind)?)
        .bind(at)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

// =============================================================================
// Assets
// =============================================================================

#[async_trait]
impl AssetsRepository for Database {
    async fn record_uploaded(&self, asset: &AssetRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO assets (
                id, object_key, file_name, content_type, media_kind, realm,
                is_preview, is_main, is_thumbnail, product_id,
                status, file_size, public_url, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(object_key) DO UPDATE SET
                status = excluded.status,
                file_size = excluded.file_size,
                public_url = excluded.public_url,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&asset.id)
        .bind(&asset.object_key)
        .bind(&asset.file_name)
        .bind(&asset.content_type)
        .bind(asset.media_kind)
        .bind(asset.realm)
        .bind(asset.is_preview)
        .bind(asset.is_main)
        .bind(asset.is_thumbnail)
        .bind(&asset.product_id)
        .bind(asset.status)
        .bind(asset.file_size)
        .bind(&asset.public_url)
        .bind(asset.created_at)
        .bind(asset.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_asset(&self, id: &str) -> Result<Option<AssetRecord>> {
        let asset = sqlx::query_as::<_, AssetRecord>("SELECT * FROM assets WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(asset)
    }

    async fn find_main_private_for_product(
        &self,
        product_id: &str,
    ) -> Result<Option<AssetRecord>> {
        let asset = sqlx::query_as::<_, AssetRecord>(
            r#"
            SELECT * FROM assets
            WHERE product_id = ? AND realm = 'private' AND is_main = 1 AND status = 'uploaded'
            ORDER BY created_at DESC LIMIT 1
            "#,
        )
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(asset)
    }

    async fn attach_to_product(
        &self,
        asset_id: &str,
        product_id: &str,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query("UPDATE assets SET product_id = ?, updated_at = ? WHERE id = ?")
            .bind(product_id)
            .bind(at)
            .bind(asset_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn mark_deleting(&self, object_key: &str, at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE assets SET status = 'deleting', updated_at = ?
            WHERE object_key = ? AND status <> 'deleting'
            "#,
        )
        .bind(at)
        .bind(object_key)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete_by_key(&self, object_key: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM assets WHERE object_key = ?")
            .bind(object_key)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_deleting(&self) -> Result<Vec<AssetRecord>> {
        let assets =
            sqlx::query_as::<_, AssetRecord>("SELECT * FROM assets WHERE status = 'deleting'")
                .fetch_all(&self.pool)
                .await?;
        Ok(assets)
    }
}

// =============================================================================
// One-time codes
// =============================================================================

#[async_trait]
impl OneTimeCodesRepository for Database {
    async fn delete_codes(&self, email: &str, purpose: OtpPurpose) -> Result<u64> {
        let result = sqlx::query("DELETE FROM one_time_codes WHERE email = ? AND purpose = ?")
            .bind(email)
            .bind(purpose)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn insert_code(&self, code: &OneTimeCode) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO one_time_codes (id, email, code, purpose, expires_at, is_used, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&code.id)
        .bind(&code.email)
        .bind(&code.code)
        .bind(code.purpose)
        .bind(code.expires_at)
        .bind(code.is_used)
        .bind(code.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_live(
        &self,
        email: &str,
        code: &str,
        purpose: OtpPurpose,
        now: DateTime<Utc>,
    ) -> Result<Option<OneTimeCode>> {
        let record = sqlx::query_as::<_, OneTimeCode>(
            r#"
            SELECT * FROM one_time_codes
            WHERE email = ? AND code = ? AND purpose = ? AND is_used = 0 AND expires_at > ?
            "#,
        )
        .bind(email)
        .bind(code)
        .bind(purpose)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    async fn mark_used(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE one_time_codes SET is_used = 1 WHERE id = ? AND is_used = 0")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }
}
