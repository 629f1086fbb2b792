//! Tradepost - a marketplace moderation and asset-access backend
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      API Layer (Axum)                        │
//! │  - Auth + password reset                                    │
//! │  - Catalog and asset tickets                                │
//! │  - Admin moderation endpoints                               │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Service Layer                            │
//! │  - Moderation state machine + blacklist cascade             │
//! │  - Catalog invariants                                       │
//! │  - Asset tickets + entitlement policy                       │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Data Layer                              │
//! │  - SQLite (sqlx)                                            │
//! │  - R2 object storage (two realms)                           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `api`: HTTP handlers
//! - `service`: Business logic layer
//! - `data`: Models, repository traits, SQLite implementation
//! - `storage`: Cloudflare R2 presigned-URL storage
//! - `notify`: Outbound email notifications
//! - `auth`: Password hashing, sessions, extractors
//! - `config`: Configuration management
//! - `error`: Error types

pub mod api;
pub mod auth;
pub mod config;
pub mod data;
pub mod error;
pub mod metrics;
pub mod notify;
pub mod service;
pub mod storage;

use std::sync::Arc;
use std::time::Duration;

use crate::data::{Account, AccountsRepository, ApprovalStatus, EntityId, Role};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    /// Database connection pool
    pub db: Arc<data::Database>,

    /// Account moderation and blacklist
    pub moderation: Arc<service::ModerationService>,

    /// Product catalog
    pub catalog: Arc<service::CatalogService>,

    /// Asset tickets and lifecycle
    pub assets: Arc<service::AssetService>,

    /// One-time codes
    pub otp: Arc<service::OtpService>,
}

impl AppState {
    /// Initialize application state
    ///
    /// # Steps
    /// 1. Connect to SQLite database
    /// 2. Connect to R2 storage
    /// 3. Select the notification backend
    /// 4. Wire services
    /// 5. Provision the admin account
    ///
    /// # Errors
    /// Returns error if any initialization step fails
    pub async fn new(config: config::AppConfig) -> Result<Self, error::AppError> {
        tracing::info!("Initializing application state...");

        let db = Arc::new(data::Database::connect(&config.database.path).await?);
        tracing::info!("Database connected");

        let store: Arc<dyn storage::ObjectStore> =
            Arc::new(storage::R2Store::new(&config.storage, &config.cloudflare));
        tracing::info!("Object storage initialized");

        let notifier: Arc<dyn notify::Notifier> =
            match (&config.mail.smtp_url, &config.mail.from_address) {
                (Some(smtp_url), Some(from_address)) => {
                    Arc::new(notify::SmtpNotifier::new(smtp_url, from_address)?)
                }
                _ => {
                    tracing::warn!("mail not configured, notifications will only be logged");
                    Arc::new(notify::LogNotifier)
                }
            };

        let moderation = Arc::new(service::ModerationService::new(
            db.clone(),
            db.clone(),
            notifier.clone(),
            config.moderation.blacklist_default_days,
        ));
        let catalog = Arc::new(service::CatalogService::new(
            db.clone(),
            db.clone(),
            db.clone(),
        ));
        let assets = Arc::new(service::AssetService::new(
            db.clone(),
            db.clone(),
            db.clone(),
            store,
            Arc::new(service::AllowAllEntitlements),
            Duration::from_secs(config.storage.upload_ticket_ttl_seconds),
            Duration::from_secs(config.storage.download_ticket_ttl_seconds),
        ));
        let otp = Arc::new(service::OtpService::new(
            db.clone(),
            db.clone(),
            notifier,
            config.auth.otp_ttl_minutes,
        ));

        Self::ensure_admin(db.as_ref(), &config).await?;

        tracing::info!("Application state initialized successfully");

        Ok(Self {
            config: Arc::new(config),
            db,
            moderation,
            catalog,
            assets,
            otp,
        })
    }

    /// Ensure the configured admin account exists
    ///
    /// Admins are never registered through the API; the one account comes
    /// from configuration, already approved and with a hashed password.
    async fn ensure_admin(
        db: &data::Database,
        config: &config::AppConfig,
    ) -> Result<(), error::AppError> {
        if let Some(account) = db.get_account_by_email(&config.admin.email).await? {
            if account.role != Role::Admin {
                return Err(error::AppError::Config(format!(
                    "admin.email {} belongs to a non-admin account",
                    config.admin.email
                )));
            }
            tracing::info!(email = %account.email, "Admin account exists");
            return Ok(());
        }

        tracing::info!("Creating admin account...");

        let now = chrono::Utc::now();
        let account = Account {
            id: EntityId::new().0,
            email: config.admin.email.clone(),
            display_name: config.admin.display_name.clone(),
            role: Role::Admin,
            approval_status: ApprovalStatus::Approved,
            rejection_reason: None,
            approved_at: Some(now),
            approved_by: None,
            rejected_at: None,
            rejected_by: None,
            user_account_id: None,
            password_hash: Some(auth::password::hash_password(&config.admin.password)?),
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
        db.insert_account(&account).await?;

        tracing::info!(email = %account.email, "Admin account created");
        Ok(())
    }
}

/// Build the Axum router with all routes.
///
/// This is shared by the binary and integration tests to keep route
/// composition consistent across environments.
pub fn build_router(state: AppState) -> axum::Router {
    use axum::Router;
    use tower_http::{
        compression::CompressionLayer, limit::RequestBodyLimitLayer, trace::TraceLayer,
    };

    let cors_layer = build_cors_layer(&state.config.server);

    Router::new()
        .route("/health", axum::routing::get(health_check))
        .nest("/auth", api::auth_router())
        .nest("/api/catalog", api::catalog_router())
        .nest("/api/assets", api::assets_router())
        .nest(
            "/api/admin",
            api::admin_router().layer(axum::middleware::from_fn_with_state(
                state.clone(),
                auth::middleware::require_auth,
            )),
        )
        .nest("/api/blacklist", api::reapply_router())
        .layer(axum::middleware::from_fn(track_http_metrics))
        .layer(CompressionLayer::new())
        // Bodies are metadata only; file contents go straight to R2
        .layer(RequestBodyLimitLayer::new(1024 * 1024))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .with_state(state)
        .merge(api::metrics_router())
}

fn build_cors_layer(server: &config::ServerConfig) -> tower_http::cors::CorsLayer {
    use axum::http::HeaderValue;
    use tower_http::cors::{Any, CorsLayer};

    if !server.protocol.eq_ignore_ascii_case("https") {
        return CorsLayer::permissive();
    }

    let allowed_origin = server.base_url();
    match HeaderValue::from_str(&allowed_origin) {
        Ok(origin) => CorsLayer::new()
            .allow_origin([origin])
            .allow_methods(Any)
            .allow_headers(Any),
        Err(error) => {
            tracing::error!(
                %error,
                origin = %allowed_origin,
                "Failed to parse CORS origin from server base URL; denying cross-origin requests"
            );
            CorsLayer::new().allow_methods(Any).allow_headers(Any)
        }
    }
}

/// Count every request against its matched route template.
async fn track_http_metrics(
    request: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let method = request.method().to_string();
    let endpoint = request
        .extensions()
        .get::<axum::extract::MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(request).await;

    metrics::HTTP_REQUESTS_TOTAL
        .with_label_values(&[&method, &endpoint, response.status().as_str()])
        .inc();

    response
}

async fn health_check() -> &'static str {
    "OK"
}
