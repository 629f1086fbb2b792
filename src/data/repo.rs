//! Repository traits
//!
//! Persistence access is injected into services as per-entity repository
//! interfaces rather than resolved through a shared handle, so each service
//! is independently testable. The production implementation for all of them
//! is [`crate::data::Database`].
//!
//! Guarded transitions are expressed as conditional writes: the
//! implementation must perform a single `UPDATE ... WHERE <state check>` and
//! report whether a row was affected, never a read followed by a blind
//! write.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::models::{
    Account, AssetRecord, OneTimeCode, OtpPurpose, Page, Product, ProductFilters, ProductKind,
};
use crate::error::Result;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AccountsRepository: Send + Sync {
    async fn insert_account(&self, account: &Account) -> Result<()>;

    async fn get_account(&self, id: &str) -> Result<Option<Account>>;

    async fn get_account_by_email(&self, email: &str) -> Result<Option<Account>>;

    /// Look up an account by email or issued `user_account_id`.
    async fn get_account_by_login(&self, identifier: &str) -> Result<Option<Account>>;

    /// Flip to `approved`, clearing rejection fields.
    ///
    /// Conditional on not already being approved; returns `false` when the
    /// guard does not match.
    async fn mark_approved(
        &self,
        id: &str,
        admin_id: &str,
        at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Buyer approval: flip to `approved` and issue login credentials in the
    /// same conditional write, so concurrent approvals cannot both issue.
    ///
    /// The `user_account_id` column carries a UNIQUE constraint; a collision
    /// surfaces as a database error the caller retries with a fresh id.
    async fn mark_approved_with_credentials(
        &self,
        id: &str,
        admin_id: &str,
        user_account_id: &str,
        password_hash: &str,
        at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Flip to `rejected` with a reason, clearing approval fields.
    async fn mark_rejected(
        &self,
        id: &str,
        admin_id: &str,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<bool>;

    async fn user_account_id_exists(&self, candidate: &str) -> Result<bool>;

    /// Set the blacklist flag and metadata; conditional on not blacklisted.
    async fn set_blacklist(
        &self,
        id: &str,
        admin_id: &str,
        reason: &str,
        expires_at: DateTime<Utc>,
        at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Clear all blacklist fields, including any pending reapplication;
    /// conditional on currently blacklisted.
    async fn clear_blacklist(&self, id: &str, at: DateTime<Utc>) -> Result<bool>;

    /// Record a reapplication request; conditional on currently blacklisted.
    async fn record_reapplication(
        &self,
        id: &str,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<bool>;

    async fn list_admin_emails(&self) -> Result<Vec<String>>;

    async fn update_password_hash(
        &self,
        email: &str,
        password_hash: &str,
        at: DateTime<Utc>,
    ) -> Result<bool>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProductsRepository: Send + Sync {
    async fn insert_product(&self, product: &Product) -> Result<()>;

    async fn get_product(&self, id: &str) -> Result<Option<Product>>;

    /// Approve: `status = active`, approved flag set, rejection fields
    /// cleared. Conditional on not already approved.
    async fn mark_product_approved(&self, id: &str, at: DateTime<Utc>) -> Result<bool>;

    /// Reject: `status = rejected` with reason, approval fields cleared.
    /// Conditional on not already rejected.
    async fn mark_product_rejected(
        &self,
        id: &str,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Blacklist cascade: set every product of the seller to `inactive`
    /// in one bounded statement, regardless of prior status.
    ///
    /// # Returns
    /// Number of products swept.
    async fn deactivate_all_for_seller(
        &self,
        seller_id: &str,
        at: DateTime<Utc>,
    ) -> Result<u64>;

    /// Reactivate products currently `inactive` for the seller.
    ///
    /// # Returns
    /// Number of products reactivated.
    async fn reactivate_inactive_for_seller(
        &self,
        seller_id: &str,
        at: DateTime<Utc>,
    ) -> Result<u64>;

    /// Buyer-visible listing: `active` and admin-approved only.
    async fn list_public(&self, filters: &ProductFilters) -> Result<Page<Product>>;

    /// Admin/seller listing, unrestricted by approval state.
    async fn list_for_moderation(&self, filters: &ProductFilters) -> Result<Page<Product>>;

    /// Replace the related-products set; an empty slice clears it.
    async fn set_related_products(
        &self,
        id: &str,
        related_ids: &[String],
        at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Rewrite the variant payload (e.g. digital asset references).
    async fn update_kind(&self, id: &str, kind: &ProductKind, at: DateTime<Utc>)
        -> Result<bool>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AssetsRepository: Send + Sync {
    /// Record a reported upload. Re-reports for the same key update the
    /// existing row in place.
    async fn record_uploaded(&self, asset: &AssetRecord) -> Result<()>;

    async fn get_asset(&self, id: &str) -> Result<Option<AssetRecord>>;

    /// The downloadable main asset of a product (private realm, uploaded).
    async fn find_main_private_for_product(
        &self,
        product_id: &str,
    ) -> Result<Option<AssetRecord>>;

    async fn attach_to_product(
        &self,
        asset_id: &str,
        product_id: &str,
        at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Phase one of the two-phase delete. Returns `false` when the record is
    /// already `deleting` (the sweep owns it then).
    async fn mark_deleting(&self, object_key: &str, at: DateTime<Utc>) -> Result<bool>;

    /// Phase two: drop the metadata row.
    async fn delete_by_key(&self, object_key: &str) -> Result<bool>;

    /// Records stranded in `deleting` by a crash mid-sequence.
    async fn list_deleting(&self) -> Result<Vec<AssetRecord>>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OneTimeCodesRepository: Send + Sync {
    /// Invalidate any live code for `(email, purpose)`.
    async fn delete_codes(&self, email: &str, purpose: OtpPurpose) -> Result<u64>;

    async fn insert_code(&self, code: &OneTimeCode) -> Result<()>;

    /// A matching, unused, unexpired code, if any.
    async fn find_live(
        &self,
        email: &str,
        code: &str,
        purpose: OtpPurpose,
        now: DateTime<Utc>,
    ) -> Result<Option<OneTimeCode>>;

    /// Consume: conditional on `is_used = 0`, so a concurrent double-consume
    /// loses the race.
    async fn mark_used(&self, id: &str) -> Result<bool>;
}
