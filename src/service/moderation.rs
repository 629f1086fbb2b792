//! Account moderation
//!
//! Registration, approval, rejection, and the seller blacklist. Every
//! transition is a conditional write so concurrent moderators cannot apply
//! the same decision twice, and blacklisting cascades over the seller's
//! listings in one statement. Notifications are side effects: a failed send
//! never rolls back a decision.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::auth::password::hash_password;
use crate::data::database::is_unique_violation;
use crate::data::{
    Account, AccountsRepository, ApprovalStatus, EntityId, ProductsRepository, Role,
};
use crate::error::{AppError, Result};
use crate::metrics::MODERATION_TRANSITIONS_TOTAL;
use crate::notify::{send_best_effort, Notification, Notifier};
use crate::service::credentials::{self, IssuedCredentials};

/// Attempts at issuing a collision-free buyer identifier before giving up.
/// The pre-insert probe makes collisions rare; this bounds the pathological
/// case where the UNIQUE column keeps rejecting candidates.
const MAX_CREDENTIAL_ATTEMPTS: usize = 3;

/// Result of approving an account.
///
/// `credentials` is populated only for buyers and holds the one-time
/// plaintext password; it is reported to the admin and mailed to the buyer
/// but never stored.
#[derive(Debug)]
pub struct ApprovalOutcome {
    pub account: Account,
    pub credentials: Option<IssuedCredentials>,
    pub notified: bool,
}

#[derive(Debug)]
pub struct RejectionOutcome {
    pub account: Account,
    pub notified: bool,
}

#[derive(Debug)]
pub struct BlacklistOutcome {
    pub seller: Account,
    pub deactivated_products: u64,
    pub notified: bool,
}

#[derive(Debug)]
pub struct ReinstatementOutcome {
    pub seller: Account,
    pub reactivated_products: u64,
    pub notified: bool,
}

#[derive(Debug)]
pub struct ReapplicationOutcome {
    pub notified_admins: usize,
}

pub struct ModerationService {
    accounts: Arc<dyn AccountsRepository>,
    products: Arc<dyn ProductsRepository>,
    notifier: Arc<dyn Notifier>,
    blacklist_default_days: i64,
}

impl ModerationService {
    pub fn new(
        accounts: Arc<dyn AccountsRepository>,
        products: Arc<dyn ProductsRepository>,
        notifier: Arc<dyn Notifier>,
        blacklist_default_days: i64,
    ) -> Self {
        Self {
            accounts,
            products,
            notifier,
            blacklist_default_days,
        }
    }

    /// Register a new seller or buyer application.
    ///
    /// Accounts start `pending` and cannot sign in until approved.
    pub async fn register(&self, email: &str, display_name: &str, role: Role) -> Result<Account> {
        if role == Role::Admin {
            return Err(AppError::Validation(
                "admin accounts are provisioned, not registered".to_string(),
            ));
        }
        if !email.contains('@') {
            return Err(AppError::Validation("invalid email address".to_string()));
        }
        if display_name.trim().is_empty() {
            return Err(AppError::Validation("display name is required".to_string()));
        }

        if self.accounts.get_account_by_email(email).await?.is_some() {
            return Err(AppError::StateConflict(
                "an account with this email already exists".to_string(),
            ));
        }

        let now = Utc::now();
        let account = Account {
            id: EntityId::new().0,
            email: email.to_string(),
            display_name: display_name.trim().to_string(),
            role,
            approval_status: ApprovalStatus::Pending,
            rejection_reason: None,
            approved_at: None,
            approved_by: None,
            rejected_at: None,
            rejected_by: None,
            user_account_id: None,
            password_hash: None,
            is_blacklisted: false,
            blacklist_reason: None,
            blacklisted_at: None,
            blacklisted_by: None,
            blacklist_expires_at: None,
            reapplication_requested_at: None,
            reapplication_reason: None,
            created_at: now,
            updated_at: now,
        };
        self.accounts.insert_account(&account).await?;

        tracing::info!(account_id = %account.id, role = role.as_str(), "account registered");
        Ok(account)
    }

    /// Approve a pending or previously rejected account.
    ///
    /// Buyers receive generated login credentials in the same write that
    /// flips the status, so two racing approvals cannot both issue.
    pub async fn approve(&self, admin_id: &str, account_id: &str) -> Result<ApprovalOutcome> {
        let account = self
            .accounts
            .get_account(account_id)
            .await?
            .ok_or(AppError::NotFound)?;

        let now = Utc::now();
        let credentials = match account.role {
            Role::Buyer => Some(self.approve_buyer(admin_id, &account.id, now).await?),
            _ => {
                if !self.accounts.mark_approved(&account.id, admin_id, now).await? {
                    return Err(AppError::StateConflict(
                        "account is already approved".to_string(),
                    ));
                }
                None
            }
        };

        MODERATION_TRANSITIONS_TOTAL
            .with_label_values(&["account", "approve"])
            .inc();

        let notification = match (&account.role, &credentials) {
            (Role::Buyer, Some(issued)) => Notification::BuyerApproved {
                display_name: account.display_name.clone(),
                user_account_id: issued.user_account_id.clone(),
                password: issued.password.clone(),
            },
            _ => Notification::SellerApproved {
                display_name: account.display_name.clone(),
            },
        };
        let notified =
            send_best_effort(self.notifier.as_ref(), &account.email, &notification).await;

        let account = self
            .accounts
            .get_account(account_id)
            .await?
            .ok_or(AppError::NotFound)?;

        Ok(ApprovalOutcome {
            account,
            credentials,
            notified,
        })
    }

    async fn approve_buyer(
        &self,
        admin_id: &str,
        account_id: &str,
        now: DateTime<Utc>,
    ) -> Result<IssuedCredentials> {
        let password = credentials::generate_password();
        let password_hash = hash_password(&password)?;

        for _ in 0..MAX_CREDENTIAL_ATTEMPTS {
            let candidate =
                credentials::generate_unique_account_id(self.accounts.as_ref()).await?;
            match self
                .accounts
                .mark_approved_with_credentials(
                    account_id,
                    admin_id,
                    &candidate,
                    &password_hash,
                    now,
                )
                .await
            {
                Ok(true) => {
                    return Ok(IssuedCredentials {
                        user_account_id: candidate,
                        password,
                    })
                }
                Ok(false) => {
                    return Err(AppError::StateConflict(
                        "account is already approved".to_string(),
                    ))
                }
                Err(error) if is_unique_violation(&error) => {
                    tracing::debug!(account_id, "credential id collision, retrying");
                    continue;
                }
                Err(error) => return Err(error),
            }
        }

        Err(AppError::ExhaustedRetries)
    }

    /// Reject an account with a mandatory reason.
    pub async fn reject(
        &self,
        admin_id: &str,
        account_id: &str,
        reason: &str,
    ) -> Result<RejectionOutcome> {
        if reason.trim().is_empty() {
            return Err(AppError::MissingReason);
        }

        let account = self
            .accounts
            .get_account(account_id)
            .await?
            .ok_or(AppError::NotFound)?;

        let now = Utc::now();
        if !self
            .accounts
            .mark_rejected(&account.id, admin_id, reason.trim(), now)
            .await?
        {
            return Err(AppError::StateConflict(
                "account is already rejected".to_string(),
            ));
        }

        MODERATION_TRANSITIONS_TOTAL
            .with_label_values(&["account", "reject"])
            .inc();

        let notified = send_best_effort(
            self.notifier.as_ref(),
            &account.email,
            &Notification::AccountRejected {
                display_name: account.display_name.clone(),
                reason: reason.trim().to_string(),
            },
        )
        .await;

        let account = self
            .accounts
            .get_account(account_id)
            .await?
            .ok_or(AppError::NotFound)?;

        Ok(RejectionOutcome { account, notified })
    }

    /// Blacklist a seller, deactivating every one of their listings.
    ///
    /// `expires_at` defaults to the configured review window.
    pub async fn blacklist(
        &self,
        admin_id: &str,
        seller_id: &str,
        reason: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<BlacklistOutcome> {
        if reason.trim().is_empty() {
            return Err(AppError::MissingReason);
        }

        let seller = self
            .accounts
            .get_account(seller_id)
            .await?
            .ok_or(AppError::NotFound)?;
        if seller.role != Role::Seller {
            return Err(AppError::Validation(
                "only seller accounts can be blacklisted".to_string(),
            ));
        }

        let now = Utc::now();
        let expires_at =
            expires_at.unwrap_or_else(|| now + Duration::days(self.blacklist_default_days));

        if !self
            .accounts
            .set_blacklist(&seller.id, admin_id, reason.trim(), expires_at, now)
            .await?
        {
            return Err(AppError::StateConflict(
                "seller is already blacklisted".to_string(),
            ));
        }

        let deactivated_products = self.products.deactivate_all_for_seller(&seller.id, now).await?;

        MODERATION_TRANSITIONS_TOTAL
            .with_label_values(&["account", "blacklist"])
            .inc();
        tracing::info!(
            seller_id = %seller.id,
            deactivated_products,
            "seller blacklisted"
        );

        let notified = send_best_effort(
            self.notifier.as_ref(),
            &seller.email,
            &Notification::SellerBlacklisted {
                display_name: seller.display_name.clone(),
                reason: reason.trim().to_string(),
                expires_at,
            },
        )
        .await;

        let seller = self
            .accounts
            .get_account(seller_id)
            .await?
            .ok_or(AppError::NotFound)?;

        Ok(BlacklistOutcome {
            seller,
            deactivated_products,
            notified,
        })
    }

    /// Lift a seller's blacklist and restore listings the cascade disabled.
    ///
    /// Only `inactive` listings come back; anything the seller had in draft
    /// or that moderation rejected keeps its state.
    pub async fn remove_blacklist(&self, seller_id: &str) -> Result<ReinstatementOutcome> {
        let seller = self
            .accounts
            .get_account(seller_id)
            .await?
            .ok_or(AppError::NotFound)?;

        let now = Utc::now();
        if !self.accounts.clear_blacklist(&seller.id, now).await? {
            return Err(AppError::StateConflict(
                "seller is not blacklisted".to_string(),
            ));
        }

        let reactivated_products = self
            .products
            .reactivate_inactive_for_seller(&seller.id, now)
            .await?;

        MODERATION_TRANSITIONS_TOTAL
            .with_label_values(&["account", "unblacklist"])
            .inc();
        tracing::info!(
            seller_id = %seller.id,
            reactivated_products,
            "seller reinstated"
        );

        let notified = send_best_effort(
            self.notifier.as_ref(),
            &seller.email,
            &Notification::BlacklistLifted {
                display_name: seller.display_name.clone(),
            },
        )
        .await;

        let seller = self
            .accounts
            .get_account(seller_id)
            .await?
            .ok_or(AppError::NotFound)?;

        Ok(ReinstatementOutcome {
            seller,
            reactivated_products,
            notified,
        })
    }

    /// A blacklisted seller asks to be reviewed again.
    ///
    /// Records the request on the account and alerts every admin. The
    /// blacklist itself is untouched; lifting it stays a manual decision.
    pub async fn request_reapplication(
        &self,
        seller_id: &str,
        reason: &str,
    ) -> Result<ReapplicationOutcome> {
        if reason.trim().is_empty() {
            return Err(AppError::MissingReason);
        }

        let seller = self
            .accounts
            .get_account(seller_id)
            .await?
            .ok_or(AppError::NotFound)?;

        let now = Utc::now();
        if !self
            .accounts
            .record_reapplication(&seller.id, reason.trim(), now)
            .await?
        {
            return Err(AppError::StateConflict(
                "account is not blacklisted".to_string(),
            ));
        }

        let notification = Notification::ReapplicationReceived {
            seller_email: seller.email.clone(),
            reason: reason.trim().to_string(),
        };
        let mut notified_admins = 0;
        for admin_email in self.accounts.list_admin_emails().await? {
            if send_best_effort(self.notifier.as_ref(), &admin_email, &notification).await {
                notified_admins += 1;
            }
        }

        Ok(ReapplicationOutcome { notified_admins })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password::verify_password;
    use crate::data::{Database, Product, ProductKind, ProductStatus};
    use crate::notify::MockNotifier;
    use tempfile::TempDir;

    async fn create_test_db() -> (Arc<Database>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("moderation-test.db");
        let db = Database::connect(&db_path).await.unwrap();
        (Arc::new(db), temp_dir)
    }

    fn ok_notifier() -> Arc<MockNotifier> {
        let mut notifier = MockNotifier::new();
        notifier.expect_send().returning(|_, _| Ok(()));
        Arc::new(notifier)
    }

    fn service_over(db: Arc<Database>, notifier: Arc<MockNotifier>) -> ModerationService {
        ModerationService::new(db.clone(), db, notifier, 30)
    }

    async fn insert_product(db: &Database, seller_id: &str, status: ProductStatus) -> String {
        let now = Utc::now();
        let product = Product {
            id: EntityId::new().0,
            seller_id: seller_id.to_string(),
            name: "Widget".to_string(),
            description: None,
            tags: vec![],
            price_amount: Some(1000),
            credits_cost: None,
            status,
            is_admin_approved: status == ProductStatus::Active,
            is_admin_rejected: false,
            admin_rejection_reason: None,
            category_id: Some("cat".to_string()),
            item_id: Some("item".to_string()),
            kit_id: None,
            is_kit_product: false,
            kind: ProductKind::Physical { stock: 3 },
            related_ids: vec![],
            created_at: now,
            updated_at: now,
        };
        db.insert_product(&product).await.unwrap();
        product.id
    }

    #[tokio::test]
    async fn seller_approval_flips_status_without_credentials() {
        let (db, _temp_dir) = create_test_db().await;
        let service = service_over(db.clone(), ok_notifier());

        let account = service
            .register("seller@example.com", "Seller", Role::Seller)
            .await
            .unwrap();
        assert_eq!(account.approval_status, ApprovalStatus::Pending);

        let outcome = service.approve("admin-1", &account.id).await.unwrap();
        assert_eq!(outcome.account.approval_status, ApprovalStatus::Approved);
        assert!(outcome.credentials.is_none());
        assert!(outcome.notified);
    }

    #[tokio::test]
    async fn duplicate_registration_conflicts() {
        let (db, _temp_dir) = create_test_db().await;
        let service = service_over(db.clone(), ok_notifier());

        service
            .register("dup@example.com", "First", Role::Buyer)
            .await
            .unwrap();
        let error = service
            .register("dup@example.com", "Second", Role::Buyer)
            .await
            .unwrap_err();
        assert!(matches!(error, AppError::StateConflict(_)));
    }

    #[tokio::test]
    async fn buyer_approval_issues_working_credentials() {
        let (db, _temp_dir) = create_test_db().await;
        let service = service_over(db.clone(), ok_notifier());

        let account = service
            .register("buyer@example.com", "Buyer", Role::Buyer)
            .await
            .unwrap();
        let outcome = service.approve("admin-1", &account.id).await.unwrap();

        let issued = outcome.credentials.expect("buyer approval issues credentials");
        assert!(issued.user_account_id.starts_with("TP-"));

        let stored = db.get_account(&account.id).await.unwrap().unwrap();
        assert_eq!(
            stored.user_account_id.as_deref(),
            Some(issued.user_account_id.as_str())
        );
        let hash = stored.password_hash.expect("hash persisted");
        assert!(verify_password(&issued.password, &hash).unwrap());
    }

    #[tokio::test]
    async fn second_approval_is_a_conflict() {
        let (db, _temp_dir) = create_test_db().await;
        let service = service_over(db.clone(), ok_notifier());

        let account = service
            .register("seller@example.com", "Seller", Role::Seller)
            .await
            .unwrap();
        service.approve("admin-1", &account.id).await.unwrap();

        let error = service.approve("admin-2", &account.id).await.unwrap_err();
        assert!(matches!(error, AppError::StateConflict(_)));
    }

    #[tokio::test]
    async fn rejection_requires_a_reason() {
        let (db, _temp_dir) = create_test_db().await;
        let service = service_over(db.clone(), ok_notifier());

        let account = service
            .register("seller@example.com", "Seller", Role::Seller)
            .await
            .unwrap();
        let error = service.reject("admin-1", &account.id, "  ").await.unwrap_err();
        assert!(matches!(error, AppError::MissingReason));
    }

    #[tokio::test]
    async fn rejected_account_can_still_be_approved() {
        let (db, _temp_dir) = create_test_db().await;
        let service = service_over(db.clone(), ok_notifier());

        let account = service
            .register("seller@example.com", "Seller", Role::Seller)
            .await
            .unwrap();
        let rejected = service
            .reject("admin-1", &account.id, "incomplete application")
            .await
            .unwrap();
        assert_eq!(rejected.account.approval_status, ApprovalStatus::Rejected);

        let outcome = service.approve("admin-1", &account.id).await.unwrap();
        assert_eq!(outcome.account.approval_status, ApprovalStatus::Approved);
        assert!(outcome.account.rejection_reason.is_none());
    }

    #[tokio::test]
    async fn blacklist_cascades_over_all_listings() {
        let (db, _temp_dir) = create_test_db().await;
        let service = service_over(db.clone(), ok_notifier());

        let seller = service
            .register("seller@example.com", "Seller", Role::Seller)
            .await
            .unwrap();
        service.approve("admin-1", &seller.id).await.unwrap();
        insert_product(&db, &seller.id, ProductStatus::Active).await;
        insert_product(&db, &seller.id, ProductStatus::Pending).await;
        insert_product(&db, &seller.id, ProductStatus::Draft).await;

        let outcome = service
            .blacklist("admin-1", &seller.id, "policy violation", None)
            .await
            .unwrap();
        assert_eq!(outcome.deactivated_products, 3);
        assert!(outcome.seller.is_blacklisted);

        let expires = outcome.seller.blacklist_expires_at.expect("default expiry set");
        let days = (expires - Utc::now()).num_days();
        assert!((29..=30).contains(&days));

        let error = service
            .blacklist("admin-2", &seller.id, "again", None)
            .await
            .unwrap_err();
        assert!(matches!(error, AppError::StateConflict(_)));
    }

    #[tokio::test]
    async fn only_sellers_can_be_blacklisted() {
        let (db, _temp_dir) = create_test_db().await;
        let service = service_over(db.clone(), ok_notifier());

        let buyer = service
            .register("buyer@example.com", "Buyer", Role::Buyer)
            .await
            .unwrap();
        let error = service
            .blacklist("admin-1", &buyer.id, "nope", None)
            .await
            .unwrap_err();
        assert!(matches!(error, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn reinstatement_restores_cascaded_listings() {
        let (db, _temp_dir) = create_test_db().await;
        let service = service_over(db.clone(), ok_notifier());

        let seller = service
            .register("seller@example.com", "Seller", Role::Seller)
            .await
            .unwrap();
        service.approve("admin-1", &seller.id).await.unwrap();
        let product_id = insert_product(&db, &seller.id, ProductStatus::Active).await;

        service
            .blacklist("admin-1", &seller.id, "policy violation", None)
            .await
            .unwrap();
        let outcome = service.remove_blacklist(&seller.id).await.unwrap();
        assert_eq!(outcome.reactivated_products, 1);
        assert!(!outcome.seller.is_blacklisted);
        assert!(outcome.seller.blacklist_reason.is_none());

        let product = db.get_product(&product_id).await.unwrap().unwrap();
        assert_eq!(product.status, ProductStatus::Active);

        let error = service.remove_blacklist(&seller.id).await.unwrap_err();
        assert!(matches!(error, AppError::StateConflict(_)));
    }

    #[tokio::test]
    async fn reapplication_notifies_every_admin() {
        let (db, _temp_dir) = create_test_db().await;

        let mut notifier = MockNotifier::new();
        notifier.expect_send().returning(|_, _| Ok(()));
        let service = service_over(db.clone(), Arc::new(notifier));

        // Two provisioned admins
        for n in 1..=2 {
            let now = Utc::now();
            let admin = Account {
                id: EntityId::new().0,
                email: format!("admin{}@example.com", n),
                display_name: format!("Admin {}", n),
                role: Role::Admin,
                approval_status: ApprovalStatus::Approved,
                rejection_reason: None,
                approved_at: Some(now),
                approved_by: None,
                rejected_at: None,
                rejected_by: None,
                user_account_id: None,
                password_hash: Some("$argon2id$stub".to_string()),
                is_blacklisted: false,
                blacklist_reason: None,
                blacklisted_at: None,
                blacklist_expires_at: None,
                blacklisted_by: None,
                reapplication_requested_at: None,
                reapplication_reason: None,
                created_at: now,
                updated_at: now,
            };
            db.insert_account(&admin).await.unwrap();
        }

        let seller = service
            .register("seller@example.com", "Seller", Role::Seller)
            .await
            .unwrap();
        service.approve("admin-1", &seller.id).await.unwrap();
        service
            .blacklist("admin-1", &seller.id, "policy violation", None)
            .await
            .unwrap();

        let outcome = service
            .request_reapplication(&seller.id, "I have fixed my listings")
            .await
            .unwrap();
        assert_eq!(outcome.notified_admins, 2);

        let stored = db.get_account(&seller.id).await.unwrap().unwrap();
        assert!(stored.reapplication_requested_at.is_some());

        let error = service
            .request_reapplication(&seller.id, "")
            .await
            .unwrap_err();
        assert!(matches!(error, AppError::MissingReason));
    }

    #[tokio::test]
    async fn reapplication_while_not_blacklisted_conflicts() {
        let (db, _temp_dir) = create_test_db().await;
        let service = service_over(db.clone(), ok_notifier());

        let seller = service
            .register("seller@example.com", "Seller", Role::Seller)
            .await
            .unwrap();
        let error = service
            .request_reapplication(&seller.id, "please")
            .await
            .unwrap_err();
        assert!(matches!(error, AppError::StateConflict(_)));
    }

    #[tokio::test]
    async fn notification_failure_does_not_roll_back_the_decision() {
        let (db, _temp_dir) = create_test_db().await;

        let mut notifier = MockNotifier::new();
        notifier
            .expect_send()
            .returning(|_, _| Err(AppError::Internal(anyhow::anyhow!("relay down"))));
        let service = service_over(db.clone(), Arc::new(notifier));

        let account = service
            .register("seller@example.com", "Seller", Role::Seller)
            .await
            .unwrap();
        let outcome = service.approve("admin-1", &account.id).await.unwrap();
        assert!(!outcome.notified);
        assert_eq!(outcome.account.approval_status, ApprovalStatus::Approved);
    }
}
