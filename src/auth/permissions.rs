//! Roles and the admin operation whitelist

use serde::{Deserialize, Serialize};
use std::fmt;

/// Role of a tenant user, carried in signed tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[repr(u8)]
#[derive(Default)]
pub enum Role {
    /// Can review and decide sessions, read balances
    #[default]
    Member = 1,
    /// Can additionally rotate keys and move credits
    Admin = 2,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Member => write!(f, "MEMBER"),
            Role::Admin => write!(f, "ADMIN"),
        }
    }
}

/// Get the role required for an admin operation.
/// Returns None for unknown operations (which should be blocked).
pub fn required_role(operation: &str) -> Option<Role> {
    match operation {
        "api_key_status"
        | "view_credits"
        | "list_sessions"
        | "review_session"
        | "decide_session"
        | "list_flows" => Some(Role::Member),

        "rotate_api_key" | "add_credits" | "simulate_usage" | "save_flow" => Some(Role::Admin),

        _ => None,
    }
}

/// Check if an operation is allowed for the given role
pub fn is_operation_allowed(operation: &str, role: Role) -> bool {
    match required_role(operation) {
        Some(required) => role >= required,
        None => false,
    }
}
