//! Asset access control
//!
//! Upload and download never pass through this server: clients talk to R2
//! directly with tickets minted here. A ticket is a presigned URL plus the
//! bookkeeping row that tracks the object's lifecycle. Public-realm objects
//! get a deterministic custom-domain URL once uploaded; private-realm
//! objects are only ever reachable through short-lived signed GETs.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::data::{
    Account, AccountsRepository, ApprovalStatus, AssetRecord, AssetStatus, AssetsRepository,
    EntityId, MediaKind, ProductStatus, ProductsRepository, Role, StorageRealm,
};
use crate::error::{AppError, Result};
use crate::metrics::{DOWNLOAD_TICKETS_TOTAL, UPLOAD_TICKETS_TOTAL};
use crate::storage::ObjectStore;

/// Decides whether a buyer may download a product's main asset.
///
/// Purchases and orders live outside this system, so the production
/// wiring uses [`AllowAllEntitlements`]; deployments with an order store
/// inject their own implementation.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EntitlementPolicy: Send + Sync {
    async fn may_download(&self, buyer_id: &str, product_id: &str) -> Result<bool>;
}

/// Grants every approved buyer access to every active listing.
pub struct AllowAllEntitlements;

#[async_trait]
impl EntitlementPolicy for AllowAllEntitlements {
    async fn may_download(&self, _buyer_id: &str, _product_id: &str) -> Result<bool> {
        Ok(true)
    }
}

/// Requested role of an object being uploaded; fixes its realm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetRole {
    Preview,
    Thumbnail,
    Main,
}

impl AssetRole {
    /// Previews and thumbnails are browsable; main files are protected.
    pub fn realm(self) -> StorageRealm {
        match self {
            Self::Preview | Self::Thumbnail => StorageRealm::Public,
            Self::Main => StorageRealm::Private,
        }
    }
}

#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub file_name: String,
    pub content_type: String,
    pub media_kind: MediaKind,
    pub role: AssetRole,
}

/// A minted upload ticket
#[derive(Debug, Clone, serde::Serialize)]
pub struct UploadTicket {
    pub asset_id: String,
    pub object_key: String,
    pub upload_url: String,
    pub expires_in_seconds: u64,
    pub realm: StorageRealm,
}

/// A minted download ticket
#[derive(Debug, Clone, serde::Serialize)]
pub struct DownloadTicket {
    pub download_url: String,
    pub expires_in_seconds: u64,
    pub file_name: String,
}

pub struct AssetService {
    assets: Arc<dyn AssetsRepository>,
    products: Arc<dyn ProductsRepository>,
    accounts: Arc<dyn AccountsRepository>,
    store: Arc<dyn ObjectStore>,
    entitlements: Arc<dyn EntitlementPolicy>,
    upload_ttl: Duration,
    download_ttl: Duration,
}

fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned
    }
}

impl AssetService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        assets: Arc<dyn AssetsRepository>,
        products: Arc<dyn ProductsRepository>,
        accounts: Arc<dyn AccountsRepository>,
        store: Arc<dyn ObjectStore>,
        entitlements: Arc<dyn EntitlementPolicy>,
        upload_ttl: Duration,
        download_ttl: Duration,
    ) -> Self {
        Self {
            assets,
            products,
            accounts,
            store,
            entitlements,
            upload_ttl,
            download_ttl,
        }
    }

    fn require_uploader(account: &Account) -> Result<()> {
        match account.role {
            Role::Admin => Ok(()),
            Role::Seller
                if account.approval_status == ApprovalStatus::Approved
                    && !account.is_blacklisted =>
            {
                Ok(())
            }
            _ => Err(AppError::Forbidden),
        }
    }

    /// Mint a presigned upload URL and record the pending object.
    ///
    /// The realm follows the asset's role, never the caller's choice, so a
    /// client cannot place a main file where the CDN would serve it.
    pub async fn request_upload_ticket(
        &self,
        actor_id: &str,
        request: UploadRequest,
    ) -> Result<UploadTicket> {
        let actor = self
            .accounts
            .get_account(actor_id)
            .await?
            .ok_or(AppError::Unauthorized)?;
        Self::require_uploader(&actor)?;

        if request.content_type.trim().is_empty() {
            return Err(AppError::Validation("content type is required".to_string()));
        }

        let realm = request.role.realm();
        let asset_id = EntityId::new().0;
        let object_key = format!(
            "{}/{}/{}",
            realm.as_str(),
            asset_id,
            sanitize_file_name(&request.file_name)
        );

        let upload_url = self
            .store
            .issue_put_url(
                realm,
                &object_key,
                &request.content_type,
                self.upload_ttl,
                realm == StorageRealm::Private,
            )
            .await?;

        let now = Utc::now();
        let asset = AssetRecord {
            id: asset_id.clone(),
            object_key: object_key.clone(),
            file_name: request.file_name,
            content_type: request.content_type,
            media_kind: request.media_kind,
            realm,
            is_preview: request.role == AssetRole::Preview,
            is_main: request.role == AssetRole::Main,
            is_thumbnail: request.role == AssetRole::Thumbnail,
            product_id: None,
            status: AssetStatus::Pending,
            file_size: None,
            public_url: None,
            created_at: now,
            updated_at: now,
        };
        self.assets.record_uploaded(&asset).await?;

        UPLOAD_TICKETS_TOTAL.with_label_values(&[realm.as_str()]).inc();
        tracing::debug!(asset_id = %asset_id, realm = realm.as_str(), "upload ticket issued");

        Ok(UploadTicket {
            asset_id,
            object_key,
            upload_url,
            expires_in_seconds: self.upload_ttl.as_secs(),
            realm,
        })
    }

    /// Record the outcome of a client's direct upload.
    ///
    /// The report is taken at face value; no storage probe is made. A
    /// successful public-realm upload gets its deterministic URL here.
    pub async fn report_uploaded(
        &self,
        asset_id: &str,
        file_size: i64,
        success: bool,
    ) -> Result<AssetRecord> {
        let mut asset = self
            .assets
            .get_asset(asset_id)
            .await?
            .ok_or(AppError::NotFound)?;
        if asset.status != AssetStatus::Pending {
            return Err(AppError::StateConflict(
                "upload outcome is already recorded".to_string(),
            ));
        }

        asset.status = if success {
            AssetStatus::Uploaded
        } else {
            AssetStatus::Failed
        };
        asset.file_size = Some(file_size);
        if success && asset.realm == StorageRealm::Public {
            asset.public_url = Some(self.store.public_url(&asset.object_key));
        }
        asset.updated_at = Utc::now();
        self.assets.record_uploaded(&asset).await?;

        Ok(asset)
    }

    /// Mint a time-boxed download URL for a product's main asset.
    pub async fn issue_download_ticket(
        &self,
        buyer_id: &str,
        product_id: &str,
    ) -> Result<DownloadTicket> {
        let buyer = self
            .accounts
            .get_account(buyer_id)
            .await?
            .ok_or(AppError::Unauthorized)?;
        if buyer.role == Role::Buyer
            && (buyer.approval_status != ApprovalStatus::Approved || buyer.is_blacklisted)
        {
            return Err(AppError::Forbidden);
        }

        let product = self
            .products
            .get_product(product_id)
            .await?
            .ok_or(AppError::NotFound)?;
        if product.status != ProductStatus::Active || !product.is_admin_approved {
            return Err(AppError::NotFound);
        }

        if !self.entitlements.may_download(&buyer.id, &product.id).await? {
            return Err(AppError::Forbidden);
        }

        let asset = self
            .assets
            .find_main_private_for_product(&product.id)
            .await?
            .ok_or(AppError::NotFound)?;

        let download_url = self
            .store
            .issue_get_url(&asset.object_key, self.download_ttl)
            .await?;

        DOWNLOAD_TICKETS_TOTAL.inc();
        // Audit line: must survive the default info-level filter
        tracing::info!(
            product_id = %product.id,
            buyer_id = %buyer.id,
            "download ticket issued"
        );

        Ok(DownloadTicket {
            download_url,
            expires_in_seconds: self.download_ttl.as_secs(),
            file_name: asset.file_name,
        })
    }

    /// Two-phase delete: mark the row, remove the object, drop the row.
    ///
    /// A storage failure leaves the row in `deleting` for the sweep to
    /// retry, so an orphaned object always has a marker pointing at it.
    pub async fn delete_asset(&self, asset_id: &str) -> Result<()> {
        let asset = self
            .assets
            .get_asset(asset_id)
            .await?
            .ok_or(AppError::NotFound)?;

        self.assets.mark_deleting(&asset.object_key, Utc::now()).await?;
        self.store.delete_object(asset.realm, &asset.object_key).await?;
        self.assets.delete_by_key(&asset.object_key).await?;

        Ok(())
    }

    /// Retry removal for every row stuck in `deleting`.
    ///
    /// Returns how many rows were fully cleaned up.
    pub async fn sweep_deleting(&self) -> Result<u64> {
        let mut cleaned = 0;
        for asset in self.assets.list_deleting().await? {
            match self.store.delete_object(asset.realm, &asset.object_key).await {
                Ok(()) => {
                    if self.assets.delete_by_key(&asset.object_key).await? {
                        cleaned += 1;
                    }
                }
                Err(error) => {
                    tracing::warn!(
                        object_key = %asset.object_key,
                        "sweep could not remove object: {}",
                        error
                    );
                }
            }
        }
        Ok(cleaned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Database, Product, ProductKind};
    use crate::notify::MockNotifier;
    use crate::service::moderation::ModerationService;
    use crate::storage::MockObjectStore;
    use tempfile::TempDir;

    async fn create_test_db() -> (Arc<Database>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("assets-test.db");
        let db = Database::connect(&db_path).await.unwrap();
        (Arc::new(db), temp_dir)
    }

    fn service_over(
        db: &Arc<Database>,
        store: MockObjectStore,
        entitlements: Arc<dyn EntitlementPolicy>,
    ) -> AssetService {
        AssetService::new(
            db.clone(),
            db.clone(),
            db.clone(),
            Arc::new(store),
            entitlements,
            Duration::from_secs(3600),
            Duration::from_secs(300),
        )
    }

    async fn approved_account(db: &Arc<Database>, email: &str, role: Role) -> Account {
        let mut notifier = MockNotifier::new();
        notifier.expect_send().returning(|_, _| Ok(()));
        let moderation = ModerationService::new(db.clone(), db.clone(), Arc::new(notifier), 30);
        let account = moderation.register(email, "Someone", role).await.unwrap();
        moderation.approve("admin-1", &account.id).await.unwrap();
        db.get_account(&account.id).await.unwrap().unwrap()
    }

    async fn active_product(db: &Arc<Database>, seller_id: &str) -> Product {
        let now = Utc::now();
        let product = Product {
            id: EntityId::new().0,
            seller_id: seller_id.to_string(),
            name: "Pattern pack".to_string(),
            description: None,
            tags: vec![],
            price_amount: Some(1000),
            credits_cost: None,
            status: ProductStatus::Active,
            is_admin_approved: true,
            is_admin_rejected: false,
            admin_rejection_reason: None,
            category_id: Some("cat".to_string()),
            item_id: Some("item".to_string()),
            kit_id: None,
            is_kit_product: false,
            kind: ProductKind::Physical { stock: 1 },
            related_ids: vec![],
            created_at: now,
            updated_at: now,
        };
        db.insert_product(&product).await.unwrap();
        product
    }

    fn upload_request(role: AssetRole) -> UploadRequest {
        UploadRequest {
            file_name: "my file (1).zip".to_string(),
            content_type: "application/zip".to_string(),
            media_kind: MediaKind::Zip,
            role,
        }
    }

    #[tokio::test]
    async fn upload_tickets_pin_realm_to_role() {
        let (db, _temp_dir) = create_test_db().await;
        let seller = approved_account(&db, "seller@example.com", Role::Seller).await;

        let mut store = MockObjectStore::new();
        store
            .expect_issue_put_url()
            .withf(|realm, _, _, _, protected| {
                *realm == StorageRealm::Private && *protected
            })
            .times(1)
            .returning(|_, _, _, _, _| Ok("https://signed.example/put".to_string()));

        let service = service_over(&db, store, Arc::new(AllowAllEntitlements));
        let ticket = service
            .request_upload_ticket(&seller.id, upload_request(AssetRole::Main))
            .await
            .unwrap();

        assert_eq!(ticket.realm, StorageRealm::Private);
        assert!(ticket.object_key.starts_with("private/"));
        assert!(ticket.object_key.ends_with("/my_file__1_.zip"));
        assert_eq!(ticket.expires_in_seconds, 3600);

        let asset = db.get_asset(&ticket.asset_id).await.unwrap().unwrap();
        assert_eq!(asset.status, AssetStatus::Pending);
        assert!(asset.is_main);
    }

    #[tokio::test]
    async fn unapproved_sellers_cannot_upload() {
        let (db, _temp_dir) = create_test_db().await;

        let mut notifier = MockNotifier::new();
        notifier.expect_send().returning(|_, _| Ok(()));
        let moderation = ModerationService::new(db.clone(), db.clone(), Arc::new(notifier), 30);
        let pending = moderation
            .register("pending@example.com", "Pending", Role::Seller)
            .await
            .unwrap();

        let service = service_over(&db, MockObjectStore::new(), Arc::new(AllowAllEntitlements));
        let error = service
            .request_upload_ticket(&pending.id, upload_request(AssetRole::Preview))
            .await
            .unwrap_err();
        assert!(matches!(error, AppError::Forbidden));
    }

    #[tokio::test]
    async fn successful_public_upload_gets_its_deterministic_url() {
        let (db, _temp_dir) = create_test_db().await;
        let seller = approved_account(&db, "seller@example.com", Role::Seller).await;

        let mut store = MockObjectStore::new();
        store
            .expect_issue_put_url()
            .returning(|_, _, _, _, _| Ok("https://signed.example/put".to_string()));
        store
            .expect_public_url()
            .returning(|key| format!("https://assets.example.com/{}", key));

        let service = service_over(&db, store, Arc::new(AllowAllEntitlements));
        let ticket = service
            .request_upload_ticket(
                &seller.id,
                UploadRequest {
                    file_name: "preview.webp".to_string(),
                    content_type: "image/webp".to_string(),
                    media_kind: MediaKind::Image,
                    role: AssetRole::Preview,
                },
            )
            .await
            .unwrap();

        let reported = service
            .report_uploaded(&ticket.asset_id, 2048, true)
            .await
            .unwrap();
        assert_eq!(reported.status, AssetStatus::Uploaded);
        assert_eq!(reported.file_size, Some(2048));
        assert_eq!(
            reported.public_url.as_deref(),
            Some(format!("https://assets.example.com/{}", ticket.object_key).as_str())
        );

        // The outcome is recorded once
        let error = service
            .report_uploaded(&ticket.asset_id, 2048, true)
            .await
            .unwrap_err();
        assert!(matches!(error, AppError::StateConflict(_)));
    }

    #[tokio::test]
    async fn failed_uploads_never_get_a_public_url() {
        let (db, _temp_dir) = create_test_db().await;
        let seller = approved_account(&db, "seller@example.com", Role::Seller).await;

        let mut store = MockObjectStore::new();
        store
            .expect_issue_put_url()
            .returning(|_, _, _, _, _| Ok("https://signed.example/put".to_string()));

        let service = service_over(&db, store, Arc::new(AllowAllEntitlements));
        let ticket = service
            .request_upload_ticket(
                &seller.id,
                UploadRequest {
                    file_name: "preview.webp".to_string(),
                    content_type: "image/webp".to_string(),
                    media_kind: MediaKind::Image,
                    role: AssetRole::Preview,
                },
            )
            .await
            .unwrap();

        let reported = service
            .report_uploaded(&ticket.asset_id, 0, false)
            .await
            .unwrap();
        assert_eq!(reported.status, AssetStatus::Failed);
        assert!(reported.public_url.is_none());
    }

    async fn uploaded_main_asset(
        db: &Arc<Database>,
        service: &AssetService,
        seller_id: &str,
        product_id: &str,
    ) -> AssetRecord {
        let ticket = service
            .request_upload_ticket(seller_id, upload_request(AssetRole::Main))
            .await
            .unwrap();
        service
            .report_uploaded(&ticket.asset_id, 4096, true)
            .await
            .unwrap();
        db.attach_to_product(&ticket.asset_id, product_id, Utc::now())
            .await
            .unwrap();
        db.get_asset(&ticket.asset_id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn approved_buyers_get_time_boxed_download_urls() {
        let (db, _temp_dir) = create_test_db().await;
        let seller = approved_account(&db, "seller@example.com", Role::Seller).await;
        let buyer = approved_account(&db, "buyer@example.com", Role::Buyer).await;
        let product = active_product(&db, &seller.id).await;

        let mut store = MockObjectStore::new();
        store
            .expect_issue_put_url()
            .returning(|_, _, _, _, _| Ok("https://signed.example/put".to_string()));
        store
            .expect_issue_get_url()
            .withf(|_, ttl| *ttl == Duration::from_secs(300))
            .times(1)
            .returning(|_, _| Ok("https://signed.example/get".to_string()));

        let service = service_over(&db, store, Arc::new(AllowAllEntitlements));
        uploaded_main_asset(&db, &service, &seller.id, &product.id).await;

        let ticket = service
            .issue_download_ticket(&buyer.id, &product.id)
            .await
            .unwrap();
        assert_eq!(ticket.download_url, "https://signed.example/get");
        assert_eq!(ticket.expires_in_seconds, 300);
        assert_eq!(ticket.file_name, "my file (1).zip");
    }

    #[tokio::test]
    async fn denying_entitlement_policy_blocks_downloads() {
        let (db, _temp_dir) = create_test_db().await;
        let seller = approved_account(&db, "seller@example.com", Role::Seller).await;
        let buyer = approved_account(&db, "buyer@example.com", Role::Buyer).await;
        let product = active_product(&db, &seller.id).await;

        let mut store = MockObjectStore::new();
        store
            .expect_issue_put_url()
            .returning(|_, _, _, _, _| Ok("https://signed.example/put".to_string()));
        store.expect_issue_get_url().times(0);

        let mut entitlements = MockEntitlementPolicy::new();
        entitlements
            .expect_may_download()
            .returning(|_, _| Ok(false));

        let service = service_over(&db, store, Arc::new(entitlements));
        uploaded_main_asset(&db, &service, &seller.id, &product.id).await;

        let error = service
            .issue_download_ticket(&buyer.id, &product.id)
            .await
            .unwrap_err();
        assert!(matches!(error, AppError::Forbidden));
    }

    #[tokio::test]
    async fn unapproved_buyers_cannot_download() {
        let (db, _temp_dir) = create_test_db().await;
        let seller = approved_account(&db, "seller@example.com", Role::Seller).await;
        let product = active_product(&db, &seller.id).await;

        let mut notifier = MockNotifier::new();
        notifier.expect_send().returning(|_, _| Ok(()));
        let moderation = ModerationService::new(db.clone(), db.clone(), Arc::new(notifier), 30);
        let pending_buyer = moderation
            .register("pending@example.com", "Pending", Role::Buyer)
            .await
            .unwrap();

        let service = service_over(&db, MockObjectStore::new(), Arc::new(AllowAllEntitlements));
        let error = service
            .issue_download_ticket(&pending_buyer.id, &product.id)
            .await
            .unwrap_err();
        assert!(matches!(error, AppError::Forbidden));
    }

    #[tokio::test]
    async fn download_needs_a_visible_product_and_a_main_asset() {
        let (db, _temp_dir) = create_test_db().await;
        let seller = approved_account(&db, "seller@example.com", Role::Seller).await;
        let buyer = approved_account(&db, "buyer@example.com", Role::Buyer).await;
        let product = active_product(&db, &seller.id).await;

        let service = service_over(&db, MockObjectStore::new(), Arc::new(AllowAllEntitlements));

        // No main asset attached yet
        let error = service
            .issue_download_ticket(&buyer.id, &product.id)
            .await
            .unwrap_err();
        assert!(matches!(error, AppError::NotFound));

        // Deactivated products look like they do not exist
        db.deactivate_all_for_seller(&seller.id, Utc::now())
            .await
            .unwrap();
        let error = service
            .issue_download_ticket(&buyer.id, &product.id)
            .await
            .unwrap_err();
        assert!(matches!(error, AppError::NotFound));
    }

    #[tokio::test]
    async fn delete_is_two_phase_and_swept_on_storage_failure() {
        let (db, _temp_dir) = create_test_db().await;
        let seller = approved_account(&db, "seller@example.com", Role::Seller).await;

        let mut store = MockObjectStore::new();
        store
            .expect_issue_put_url()
            .returning(|_, _, _, _, _| Ok("https://signed.example/put".to_string()));
        store
            .expect_delete_object()
            .times(1)
            .returning(|_, _| Err(AppError::Storage("R2 unreachable".to_string())));

        let service = service_over(&db, store, Arc::new(AllowAllEntitlements));
        let ticket = service
            .request_upload_ticket(&seller.id, upload_request(AssetRole::Main))
            .await
            .unwrap();
        service
            .report_uploaded(&ticket.asset_id, 4096, true)
            .await
            .unwrap();

        // Storage failure leaves the marker row behind
        assert!(service.delete_asset(&ticket.asset_id).await.is_err());
        let stuck = db.get_asset(&ticket.asset_id).await.unwrap().unwrap();
        assert_eq!(stuck.status, AssetStatus::Deleting);

        // A later sweep with working storage finishes the job
        let mut store = MockObjectStore::new();
        store.expect_delete_object().returning(|_, _| Ok(()));
        let service = service_over(&db, store, Arc::new(AllowAllEntitlements));

        let cleaned = service.sweep_deleting().await.unwrap();
        assert_eq!(cleaned, 1);
        assert!(db.get_asset(&ticket.asset_id).await.unwrap().is_none());
    }
}
