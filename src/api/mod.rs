//! API layer
//!
//! HTTP handlers for:
//! - Public auth and password-reset endpoints
//! - Catalog browsing and seller listing management
//! - Asset tickets (upload/download)
//! - Admin moderation API
//! - Metrics (Prometheus)

mod admin;
mod assets;
mod auth;
mod catalog;
mod dto;
pub mod metrics;

pub use dto::*;

pub use admin::{admin_router, reapply_router};
pub use assets::assets_router;
pub use auth::auth_router;
pub use catalog::catalog_router;
pub use metrics::metrics_router;
