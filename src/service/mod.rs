//! Business logic layer

pub mod assets;
pub mod catalog;
pub mod credentials;
pub mod moderation;
pub mod otp;

pub use assets::{AllowAllEntitlements, AssetService, EntitlementPolicy};
pub use catalog::CatalogService;
pub use moderation::ModerationService;
pub use otp::OtpService;
