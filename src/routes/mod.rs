//! HTTP route handlers
//!
//! Public session API under /api/v1/sessions, tenant admin API under /admin.

pub mod admin;
pub mod health;
pub mod response;
pub mod sessions;

pub use admin::handle_admin_request;
pub use health::health_check;
pub use response::BoxBody;
pub use sessions::handle_session_request;
