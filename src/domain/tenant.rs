use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::Role;

/// Tenant-defined presentation settings, never interpreted by the core
pub type Branding = serde_json::Map<String, serde_json::Value>;

/// A customer organization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: String,
    pub name: String,
    /// SHA-256 hex digest of the current API key
    #[serde(skip_serializing, default)]
    pub api_key_digest: Option<String>,
    /// Last four characters of the current API key, for display
    pub api_key_last4: Option<String>,
    #[serde(default)]
    pub branding: Branding,
    /// Materialized ledger total, written only by the ledger
    pub credits_balance: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tenant {
    pub fn new(id: String, name: String, branding: Branding) -> Self {
        let now = Utc::now();
        Self {
            id,
            name,
            api_key_digest: None,
            api_key_last4: None,
            branding,
            credits_balance: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// An administrator or reviewer belonging to a tenant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantUser {
    pub id: String,
    pub tenant_id: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
