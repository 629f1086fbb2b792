//! Data layer: models, repository traits, SQLite implementation

pub mod database;
pub mod models;
pub mod repo;

pub use database::Database;
pub use models::*;
pub use repo::{AccountsRepository, AssetsRepository, OneTimeCodesRepository, ProductsRepository};
