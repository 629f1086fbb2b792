//! Product catalog
//!
//! Listing creation and moderation. Placement and pricing invariants are
//! checked before any write, so the products table never holds a listing
//! that is both (or neither) kit-placed and catalog-placed, or that has no
//! positive price in any currency.

use std::sync::Arc;

use chrono::Utc;

use crate::data::{
    Account, AccountsRepository, ApprovalStatus, AssetsRepository, EntityId, MediaKind, Page,
    Product, ProductFilters, ProductKind, ProductStatus, ProductsRepository, Role, StorageRealm,
};
use crate::error::{AppError, Result};
use crate::metrics::MODERATION_TRANSITIONS_TOTAL;

/// Input for a new listing
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub name: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub price_amount: Option<i64>,
    pub credits_cost: Option<i64>,
    pub category_id: Option<String>,
    pub item_id: Option<String>,
    pub kit_id: Option<String>,
    pub is_kit_product: bool,
    pub kind: ProductKind,
}

pub struct CatalogService {
    products: Arc<dyn ProductsRepository>,
    accounts: Arc<dyn AccountsRepository>,
    assets: Arc<dyn AssetsRepository>,
}

fn validate_placement(input: &NewProduct) -> Result<()> {
    let catalog_placed = input.category_id.is_some() || input.item_id.is_some();
    let kit_placed = input.kit_id.is_some();

    match (catalog_placed, kit_placed) {
        (true, true) => Err(AppError::InvalidPlacement(
            "a listing is placed under a category/item or a kit, not both".to_string(),
        )),
        (false, false) => Err(AppError::InvalidPlacement(
            "a listing needs either a category and item or a kit".to_string(),
        )),
        (true, false) => {
            if input.category_id.is_none() || input.item_id.is_none() {
                return Err(AppError::InvalidPlacement(
                    "catalog placement needs both a category and an item".to_string(),
                ));
            }
            if input.is_kit_product {
                return Err(AppError::InvalidPlacement(
                    "is_kit_product is set but no kit is referenced".to_string(),
                ));
            }
            Ok(())
        }
        (false, true) => {
            if !input.is_kit_product {
                return Err(AppError::InvalidPlacement(
                    "kit placement requires is_kit_product".to_string(),
                ));
            }
            Ok(())
        }
    }
}

fn validate_pricing(input: &NewProduct) -> Result<()> {
    if let Some(amount) = input.price_amount {
        if amount <= 0 {
            return Err(AppError::InvalidPricing(
                "price must be greater than zero".to_string(),
            ));
        }
    }
    if let Some(credits) = input.credits_cost {
        if credits <= 0 {
            return Err(AppError::InvalidPricing(
                "credits cost must be greater than zero".to_string(),
            ));
        }
    }
    if input.price_amount.is_none() && input.credits_cost.is_none() {
        return Err(AppError::InvalidPricing(
            "a listing needs a price or a credits cost".to_string(),
        ));
    }
    Ok(())
}

fn validate_kind(kind: &ProductKind) -> Result<()> {
    match kind {
        ProductKind::Physical { stock } => {
            if *stock < 0 {
                return Err(AppError::Validation("stock cannot be negative".to_string()));
            }
        }
        ProductKind::Digital { .. } => {}
        ProductKind::Service {
            delivery_time_days,
            revisions,
            deliverables,
            ..
        } => {
            if *delivery_time_days <= 0 {
                return Err(AppError::Validation(
                    "delivery time must be at least one day".to_string(),
                ));
            }
            if *revisions < 0 {
                return Err(AppError::Validation(
                    "revisions cannot be negative".to_string(),
                ));
            }
            if deliverables.trim().is_empty() {
                return Err(AppError::Validation(
                    "service listings must state their deliverables".to_string(),
                ));
            }
        }
    }
    Ok(())
}

fn require_active_seller(seller: &Account) -> Result<()> {
    if seller.role != Role::Seller {
        return Err(AppError::Forbidden);
    }
    if seller.approval_status != ApprovalStatus::Approved || seller.is_blacklisted {
        return Err(AppError::Forbidden);
    }
    Ok(())
}

impl CatalogService {
    pub fn new(
        products: Arc<dyn ProductsRepository>,
        accounts: Arc<dyn AccountsRepository>,
        assets: Arc<dyn AssetsRepository>,
    ) -> Self {
        Self {
            products,
            accounts,
            assets,
        }
    }

    /// Create a listing for a seller.
    ///
    /// The listing starts `pending` and stays out of public results until a
    /// moderator approves it.
    pub async fn create_product(&self, seller_id: &str, input: NewProduct) -> Result<Product> {
        let seller = self
            .accounts
            .get_account(seller_id)
            .await?
            .ok_or(AppError::NotFound)?;
        require_active_seller(&seller)?;

        if input.name.trim().is_empty() {
            return Err(AppError::Validation("name is required".to_string()));
        }
        validate_placement(&input)?;
        validate_pricing(&input)?;
        validate_kind(&input.kind)?;

        let now = Utc::now();
        let product = Product {
            id: EntityId::new().0,
            seller_id: seller.id.clone(),
            name: input.name.trim().to_string(),
            description: input.description,
            tags: input.tags,
            price_amount: input.price_amount,
            credits_cost: input.credits_cost,
            status: ProductStatus::Pending,
            is_admin_approved: false,
            is_admin_rejected: false,
            admin_rejection_reason: None,
            category_id: input.category_id,
            item_id: input.item_id,
            kit_id: input.kit_id,
            is_kit_product: input.is_kit_product,
            kind: input.kind,
            related_ids: vec![],
            created_at: now,
            updated_at: now,
        };
        self.products.insert_product(&product).await?;

        tracing::info!(product_id = %product.id, seller_id = %seller.id, "listing created");
        Ok(product)
    }

    pub async fn get_product(&self, id: &str) -> Result<Product> {
        self.products.get_product(id).await?.ok_or(AppError::NotFound)
    }

    /// Approve a listing, making it publicly visible.
    pub async fn approve_product(&self, product_id: &str) -> Result<Product> {
        let product = self.get_product(product_id).await?;

        if !self
            .products
            .mark_product_approved(&product.id, Utc::now())
            .await?
        {
            return Err(AppError::StateConflict(
                "listing is already approved".to_string(),
            ));
        }

        MODERATION_TRANSITIONS_TOTAL
            .with_label_values(&["product", "approve"])
            .inc();
        self.get_product(product_id).await
    }

    /// Reject a listing with a mandatory reason.
    pub async fn reject_product(&self, product_id: &str, reason: &str) -> Result<Product> {
        if reason.trim().is_empty() {
            return Err(AppError::MissingReason);
        }

        let product = self.get_product(product_id).await?;
        if !self
            .products
            .mark_product_rejected(&product.id, reason.trim(), Utc::now())
            .await?
        {
            return Err(AppError::StateConflict(
                "listing is already rejected".to_string(),
            ));
        }

        MODERATION_TRANSITIONS_TOTAL
            .with_label_values(&["product", "reject"])
            .inc();
        self.get_product(product_id).await
    }

    /// Active, approved listings only.
    pub async fn list_public(&self, filters: &ProductFilters) -> Result<Page<Product>> {
        self.products.list_public(filters).await
    }

    /// Every listing regardless of state, for the moderation queue.
    pub async fn list_for_moderation(&self, filters: &ProductFilters) -> Result<Page<Product>> {
        self.products.list_for_moderation(filters).await
    }

    /// Replace a listing's related-products set.
    ///
    /// Every referenced listing must exist, belong to the same seller, and
    /// differ from the listing itself. Admins may edit any listing.
    pub async fn set_related_products(
        &self,
        actor_id: &str,
        actor_role: Role,
        product_id: &str,
        related_ids: Vec<String>,
    ) -> Result<Product> {
        let product = self.get_product(product_id).await?;
        if actor_role != Role::Admin && product.seller_id != actor_id {
            return Err(AppError::Forbidden);
        }

        for related_id in &related_ids {
            if related_id == product_id {
                return Err(AppError::Validation(
                    "a listing cannot relate to itself".to_string(),
                ));
            }
            let related = self
                .products
                .get_product(related_id)
                .await?
                .ok_or_else(|| {
                    AppError::Validation(format!("related listing {} does not exist", related_id))
                })?;
            if related.seller_id != product.seller_id {
                return Err(AppError::Validation(
                    "related listings must belong to the same seller".to_string(),
                ));
            }
        }

        if !self
            .products
            .set_related_products(&product.id, &related_ids, Utc::now())
            .await?
        {
            return Err(AppError::NotFound);
        }
        self.get_product(product_id).await
    }

    /// Attach an uploaded asset to a listing.
    ///
    /// Role and realm must agree: previews and thumbnails are public-realm
    /// objects, main files are private, and zip archives attach only to
    /// digital listings. Digital listings additionally record the attached
    /// zip and preview asset ids on the variant payload.
    pub async fn attach_asset(
        &self,
        actor_id: &str,
        actor_role: Role,
        product_id: &str,
        asset_id: &str,
    ) -> Result<Product> {
        let product = self.get_product(product_id).await?;
        if actor_role != Role::Admin && product.seller_id != actor_id {
            return Err(AppError::Forbidden);
        }

        let asset = self
            .assets
            .get_asset(asset_id)
            .await?
            .ok_or(AppError::NotFound)?;
        if asset.status != crate::data::AssetStatus::Uploaded {
            return Err(AppError::Validation(
                "asset has not completed upload".to_string(),
            ));
        }

        if (asset.is_preview || asset.is_thumbnail) && asset.realm != StorageRealm::Public {
            return Err(AppError::Validation(
                "previews and thumbnails must live in the public realm".to_string(),
            ));
        }
        if asset.is_main && asset.realm != StorageRealm::Private {
            return Err(AppError::Validation(
                "main files must live in the private realm".to_string(),
            ));
        }
        if asset.media_kind == MediaKind::Zip && !matches!(product.kind, ProductKind::Digital { .. })
        {
            return Err(AppError::Validation(
                "zip archives attach only to digital listings".to_string(),
            ));
        }

        let now = Utc::now();
        if !self.assets.attach_to_product(&asset.id, &product.id, now).await? {
            return Err(AppError::NotFound);
        }

        // Digital listings track their delivery and preview objects on the
        // variant payload as well
        if let ProductKind::Digital {
            format,
            zip_asset_id,
            preview_asset_id,
        } = &product.kind
        {
            let updated = ProductKind::Digital {
                format: *format,
                zip_asset_id: if asset.media_kind == MediaKind::Zip {
                    Some(asset.id.clone())
                } else {
                    zip_asset_id.clone()
                },
                preview_asset_id: if asset.is_preview {
                    Some(asset.id.clone())
                } else {
                    preview_asset_id.clone()
                },
            };
            if updated != product.kind
                && !self.products.update_kind(&product.id, &updated, now).await?
            {
                return Err(AppError::NotFound);
            }
        }

        self.get_product(product_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{AssetRecord, AssetStatus, Database, DigitalFormat};
    use crate::notify::MockNotifier;
    use crate::service::moderation::ModerationService;
    use tempfile::TempDir;

    async fn create_test_db() -> (Arc<Database>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("catalog-test.db");
        let db = Database::connect(&db_path).await.unwrap();
        (Arc::new(db), temp_dir)
    }

    fn catalog(db: &Arc<Database>) -> CatalogService {
        CatalogService::new(db.clone(), db.clone(), db.clone())
    }

    async fn approved_seller(db: &Arc<Database>) -> Account {
        let mut notifier = MockNotifier::new();
        notifier.expect_send().returning(|_, _| Ok(()));
        let moderation = ModerationService::new(db.clone(), db.clone(), Arc::new(notifier), 30);
        let seller = moderation
            .register("seller@example.com", "Seller", Role::Seller)
            .await
            .unwrap();
        moderation.approve("admin-1", &seller.id).await.unwrap();
        db.get_account(&seller.id).await.unwrap().unwrap()
    }

    fn physical_listing() -> NewProduct {
        NewProduct {
            name: "Hand tool".to_string(),
            description: Some("Forged".to_string()),
            tags: vec!["tools".to_string()],
            price_amount: Some(2500),
            credits_cost: None,
            category_id: Some("cat-1".to_string()),
            item_id: Some("item-1".to_string()),
            kit_id: None,
            is_kit_product: false,
            kind: ProductKind::Physical { stock: 10 },
        }
    }

    fn digital_listing() -> NewProduct {
        NewProduct {
            name: "Pattern pack".to_string(),
            description: None,
            tags: vec![],
            price_amount: None,
            credits_cost: Some(40),
            category_id: None,
            item_id: None,
            kit_id: Some("kit-1".to_string()),
            is_kit_product: true,
            kind: ProductKind::Digital {
                format: DigitalFormat::Zip,
                zip_asset_id: None,
                preview_asset_id: None,
            },
        }
    }

    async fn insert_asset(
        db: &Database,
        realm: StorageRealm,
        media_kind: MediaKind,
        is_main: bool,
        is_preview: bool,
    ) -> AssetRecord {
        let now = Utc::now();
        let asset = AssetRecord {
            id: EntityId::new().0,
            object_key: format!("k/{}", EntityId::new().0),
            file_name: "file.bin".to_string(),
            content_type: "application/octet-stream".to_string(),
            media_kind,
            realm,
            is_preview,
            is_main,
            is_thumbnail: false,
            product_id: None,
            status: AssetStatus::Uploaded,
            file_size: Some(1024),
            public_url: None,
            created_at: now,
            updated_at: now,
        };
        db.record_uploaded(&asset).await.unwrap();
        asset
    }

    #[tokio::test]
    async fn new_listings_start_pending() {
        let (db, _temp_dir) = create_test_db().await;
        let seller = approved_seller(&db).await;
        let service = catalog(&db);

        let product = service
            .create_product(&seller.id, physical_listing())
            .await
            .unwrap();
        assert_eq!(product.status, ProductStatus::Pending);
        assert!(!product.is_admin_approved);

        let public = service.list_public(&ProductFilters::default()).await.unwrap();
        assert!(public.items.is_empty());
    }

    #[tokio::test]
    async fn placement_must_be_exactly_one_of_catalog_or_kit() {
        let (db, _temp_dir) = create_test_db().await;
        let seller = approved_seller(&db).await;
        let service = catalog(&db);

        let mut both = physical_listing();
        both.kit_id = Some("kit-1".to_string());
        let error = service.create_product(&seller.id, both).await.unwrap_err();
        assert!(matches!(error, AppError::InvalidPlacement(_)));

        let mut neither = physical_listing();
        neither.category_id = None;
        neither.item_id = None;
        let error = service.create_product(&seller.id, neither).await.unwrap_err();
        assert!(matches!(error, AppError::InvalidPlacement(_)));

        let mut half = physical_listing();
        half.item_id = None;
        let error = service.create_product(&seller.id, half).await.unwrap_err();
        assert!(matches!(error, AppError::InvalidPlacement(_)));

        let mut flag_mismatch = digital_listing();
        flag_mismatch.is_kit_product = false;
        let error = service
            .create_product(&seller.id, flag_mismatch)
            .await
            .unwrap_err();
        assert!(matches!(error, AppError::InvalidPlacement(_)));
    }

    #[tokio::test]
    async fn pricing_requires_a_positive_value() {
        let (db, _temp_dir) = create_test_db().await;
        let seller = approved_seller(&db).await;
        let service = catalog(&db);

        let mut unpriced = physical_listing();
        unpriced.price_amount = None;
        let error = service.create_product(&seller.id, unpriced).await.unwrap_err();
        assert!(matches!(error, AppError::InvalidPricing(_)));

        let mut free = physical_listing();
        free.price_amount = Some(0);
        let error = service.create_product(&seller.id, free).await.unwrap_err();
        assert!(matches!(error, AppError::InvalidPricing(_)));
    }

    #[tokio::test]
    async fn blacklisted_sellers_cannot_list() {
        let (db, _temp_dir) = create_test_db().await;
        let seller = approved_seller(&db).await;
        db.set_blacklist(&seller.id, "admin-1", "policy", Utc::now(), Utc::now())
            .await
            .unwrap();

        let service = catalog(&db);
        let error = service
            .create_product(&seller.id, physical_listing())
            .await
            .unwrap_err();
        assert!(matches!(error, AppError::Forbidden));
    }

    #[tokio::test]
    async fn approval_makes_a_listing_public_once() {
        let (db, _temp_dir) = create_test_db().await;
        let seller = approved_seller(&db).await;
        let service = catalog(&db);

        let product = service
            .create_product(&seller.id, physical_listing())
            .await
            .unwrap();

        let approved = service.approve_product(&product.id).await.unwrap();
        assert_eq!(approved.status, ProductStatus::Active);

        let public = service.list_public(&ProductFilters::default()).await.unwrap();
        assert_eq!(public.items.len(), 1);

        let error = service.approve_product(&product.id).await.unwrap_err();
        assert!(matches!(error, AppError::StateConflict(_)));
    }

    #[tokio::test]
    async fn rejection_requires_a_reason() {
        let (db, _temp_dir) = create_test_db().await;
        let seller = approved_seller(&db).await;
        let service = catalog(&db);

        let product = service
            .create_product(&seller.id, physical_listing())
            .await
            .unwrap();
        let error = service.reject_product(&product.id, "").await.unwrap_err();
        assert!(matches!(error, AppError::MissingReason));

        let rejected = service
            .reject_product(&product.id, "stock photo")
            .await
            .unwrap();
        assert_eq!(rejected.status, ProductStatus::Rejected);
        assert_eq!(rejected.admin_rejection_reason.as_deref(), Some("stock photo"));
    }

    #[tokio::test]
    async fn related_listings_are_validated() {
        let (db, _temp_dir) = create_test_db().await;
        let seller = approved_seller(&db).await;
        let service = catalog(&db);

        let first = service
            .create_product(&seller.id, physical_listing())
            .await
            .unwrap();
        let second = service
            .create_product(&seller.id, digital_listing())
            .await
            .unwrap();

        let error = service
            .set_related_products(
                &seller.id,
                Role::Seller,
                &first.id,
                vec![first.id.clone()],
            )
            .await
            .unwrap_err();
        assert!(matches!(error, AppError::Validation(_)));

        let error = service
            .set_related_products(
                &seller.id,
                Role::Seller,
                &first.id,
                vec!["missing".to_string()],
            )
            .await
            .unwrap_err();
        assert!(matches!(error, AppError::Validation(_)));

        let updated = service
            .set_related_products(&seller.id, Role::Seller, &first.id, vec![second.id.clone()])
            .await
            .unwrap();
        assert_eq!(updated.related_ids, vec![second.id.clone()]);

        let error = service
            .set_related_products("someone-else", Role::Seller, &first.id, vec![])
            .await
            .unwrap_err();
        assert!(matches!(error, AppError::Forbidden));
    }

    #[tokio::test]
    async fn asset_roles_and_realms_must_agree() {
        let (db, _temp_dir) = create_test_db().await;
        let seller = approved_seller(&db).await;
        let service = catalog(&db);

        let product = service
            .create_product(&seller.id, physical_listing())
            .await
            .unwrap();

        // Main file in the public realm is rejected
        let misplaced_main =
            insert_asset(&db, StorageRealm::Public, MediaKind::Document, true, false).await;
        let error = service
            .attach_asset(&seller.id, Role::Seller, &product.id, &misplaced_main.id)
            .await
            .unwrap_err();
        assert!(matches!(error, AppError::Validation(_)));

        // Preview in the private realm is rejected
        let misplaced_preview =
            insert_asset(&db, StorageRealm::Private, MediaKind::Image, false, true).await;
        let error = service
            .attach_asset(&seller.id, Role::Seller, &product.id, &misplaced_preview.id)
            .await
            .unwrap_err();
        assert!(matches!(error, AppError::Validation(_)));

        // Zip on a physical listing is rejected
        let zip = insert_asset(&db, StorageRealm::Private, MediaKind::Zip, true, false).await;
        let error = service
            .attach_asset(&seller.id, Role::Seller, &product.id, &zip.id)
            .await
            .unwrap_err();
        assert!(matches!(error, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn digital_listings_track_their_zip_and_preview() {
        let (db, _temp_dir) = create_test_db().await;
        let seller = approved_seller(&db).await;
        let service = catalog(&db);

        let product = service
            .create_product(&seller.id, digital_listing())
            .await
            .unwrap();

        let zip = insert_asset(&db, StorageRealm::Private, MediaKind::Zip, true, false).await;
        let preview = insert_asset(&db, StorageRealm::Public, MediaKind::Image, false, true).await;

        service
            .attach_asset(&seller.id, Role::Seller, &product.id, &zip.id)
            .await
            .unwrap();
        let updated = service
            .attach_asset(&seller.id, Role::Seller, &product.id, &preview.id)
            .await
            .unwrap();

        match updated.kind {
            ProductKind::Digital {
                zip_asset_id,
                preview_asset_id,
                ..
            } => {
                assert_eq!(zip_asset_id.as_deref(), Some(zip.id.as_str()));
                assert_eq!(preview_asset_id.as_deref(), Some(preview.id.as_str()));
            }
            other => panic!("expected digital variant, got {other:?}"),
        }

        let stored_zip = db.get_asset(&zip.id).await.unwrap().unwrap();
        assert_eq!(stored_zip.product_id.as_deref(), Some(product.id.as_str()));
    }
}
