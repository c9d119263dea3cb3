//! Trust boundary primitives for Checkpoint
//!
//! Provides:
//! - API key digests, generation and constant-time comparison
//! - JWT issuance and validation for the admin surface
//! - Roles and the operation whitelist
//! - The typed `Principal` threaded through admin operations
//! - Password hashing with Argon2

pub mod api_key;
pub mod jwt;
pub mod password;
pub mod permissions;
pub mod principal;

pub use api_key::{constant_time_eq, digest_api_key, extract_api_key, generate_api_key, ApiKeyStatus, GeneratedApiKey};
pub use jwt::{extract_token_from_header, Claims, JwtValidator, TokenInput};
pub use password::{hash_password, verify_password};
pub use permissions::{is_operation_allowed, required_role, Role};
pub use principal::Principal;
