//! Common test utilities for E2E tests

use tempfile::TempDir;
use tokio::net::TcpListener;
use tradepost::{config, AppState};

pub const ADMIN_EMAIL: &str = "admin@test.example.com";
pub const ADMIN_PASSWORD: &str = "test-admin-password-1!";

/// Test server instance
pub struct TestServer {
    pub addr: String,
    pub state: AppState,
    pub _temp_dir: TempDir,
    pub client: reqwest::Client,
}

impl TestServer {
    /// Create a new test server instance
    pub async fn new() -> Self {
        tradepost::metrics::init_metrics();

        // Create temporary directory for test database
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        // Create test configuration
        let config = config::AppConfig {
            server: config::ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0, // Let OS assign port
                domain: "test.example.com".to_string(),
                protocol: "http".to_string(),
            },
            database: config::DatabaseConfig { path: db_path },
            storage: config::StorageConfig {
                public: config::PublicRealmConfig {
                    bucket: "test-public".to_string(),
                    public_url: "https://assets.test.example.com".to_string(),
                },
                private: config::PrivateRealmConfig {
                    bucket: "test-private".to_string(),
                },
                upload_ticket_ttl_seconds: 3600,
                download_ticket_ttl_seconds: 300,
            },
            cloudflare: config::CloudflareConfig {
                account_id: "test-account".to_string(),
                r2_access_key_id: "test-key".to_string(),
                r2_secret_access_key: "test-secret".to_string(),
            },
            auth: config::AuthConfig {
                session_secret: "test-secret-key-at-least-32-bytes!!".to_string(),
                session_max_age: 604800,
                otp_ttl_minutes: 10,
            },
            moderation: config::ModerationConfig {
                blacklist_default_days: 30,
            },
            // No SMTP relay in tests; notifications are logged
            mail: config::MailConfig {
                smtp_url: None,
                from_address: None,
            },
            admin: config::AdminConfig {
                email: ADMIN_EMAIL.to_string(),
                display_name: "Test Admin".to_string(),
                password: ADMIN_PASSWORD.to_string(),
            },
            logging: config::LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        };

        // Initialize app state
        let state = AppState::new(config).await.unwrap();

        // Create HTTP client
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap();

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let addr_str = format!("http://{}", addr);

        // Build router
        let app = tradepost::build_router(state.clone());

        // Spawn server in background
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Wait a bit for server to start
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        Self {
            addr: addr_str,
            state,
            _temp_dir: temp_dir,
            client,
        }
    }

    /// Get base URL for API requests
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }

    /// Sign in and return the bearer token
    pub async fn login(&self, identifier: &str, password: &str) -> String {
        let response = self
            .client
            .post(self.url("/auth/login"))
            .json(&serde_json::json!({
                "identifier": identifier,
                "password": password,
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200, "login failed for {}", identifier);

        let body: serde_json::Value = response.json().await.unwrap();
        body["token"].as_str().unwrap().to_string()
    }

    /// Token for the provisioned admin account
    pub async fn admin_token(&self) -> String {
        self.login(ADMIN_EMAIL, ADMIN_PASSWORD).await
    }

    /// Register an account and return its id
    pub async fn register_account(&self, email: &str, display_name: &str, role: &str) -> String {
        let response = self
            .client
            .post(self.url("/auth/register"))
            .json(&serde_json::json!({
                "email": email,
                "display_name": display_name,
                "role": role,
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 201, "registration failed for {}", email);

        let body: serde_json::Value = response.json().await.unwrap();
        body["id"].as_str().unwrap().to_string()
    }

    /// Approve an account as admin and return the approval response body
    pub async fn approve_account(
        &self,
        admin_token: &str,
        account_id: &str,
    ) -> serde_json::Value {
        let response = self
            .client
            .post(self.url(&format!("/api/admin/accounts/{}/approve", account_id)))
            .bearer_auth(admin_token)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200, "approval failed for {}", account_id);
        response.json().await.unwrap()
    }

    /// Provision an approved seller that can sign in with `password`.
    ///
    /// Sellers establish a password through the reset flow in production;
    /// tests plant the hash directly. Returns the seller's account id.
    pub async fn approved_seller(&self, email: &str, password: &str) -> String {
        use tradepost::data::AccountsRepository;

        let id = self.register_account(email, "Test Seller", "seller").await;
        let admin_token = self.admin_token().await;
        self.approve_account(&admin_token, &id).await;

        let hash = tradepost::auth::password::hash_password(password).unwrap();
        let updated = self
            .state
            .db
            .update_password_hash(email, &hash, chrono::Utc::now())
            .await
            .unwrap();
        assert!(updated);

        id
    }
}
