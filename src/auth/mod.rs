//! Authentication: password hashing, signed sessions, request extractors

pub mod middleware;
pub mod password;
pub mod session;

pub use middleware::{CurrentUser, RequireAdmin};
pub use session::{create_session_token, verify_session_token, Session};
