//! Tenant document schema
//!
//! Holds the API key digest, display suffix, branding and the materialized
//! credit balance. The balance is only ever changed with `$inc` inside a
//! ledger transaction.

use bson::{doc, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;
use crate::domain::{Branding, Tenant};

/// Collection name for tenants
pub const TENANT_COLLECTION: &str = "tenants";

/// Tenant document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct TenantDoc {
    /// Tenant ID (UUID string)
    pub _id: String,

    #[serde(default)]
    pub metadata: Metadata,

    pub name: String,

    /// SHA-256 hex digest of the current API key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_hash: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_last_4: Option<String>,

    #[serde(default)]
    pub branding_config: Branding,

    #[serde(default)]
    pub credits_balance: i64,

    /// Sequence of the last ledger row, bumped with the balance
    #[serde(default)]
    pub ledger_seq: i64,
}

impl IntoIndexes for TenantDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "api_key_hash": 1 },
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .partial_filter_expression(doc! { "api_key_hash": { "$exists": true } })
                    .name("api_key_hash_unique".to_string())
                    .build(),
            ),
        )]
    }
}

impl MutMetadata for TenantDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

impl From<&Tenant> for TenantDoc {
    fn from(tenant: &Tenant) -> Self {
        Self {
            _id: tenant.id.clone(),
            metadata: Metadata::from_chrono(tenant.created_at, tenant.updated_at),
            name: tenant.name.clone(),
            api_key_hash: tenant.api_key_digest.clone(),
            api_key_last_4: tenant.api_key_last4.clone(),
            branding_config: tenant.branding.clone(),
            credits_balance: tenant.credits_balance,
            ledger_seq: 0,
        }
    }
}

impl From<TenantDoc> for Tenant {
    fn from(doc: TenantDoc) -> Self {
        Self {
            created_at: doc.metadata.created(),
            updated_at: doc.metadata.updated(),
            id: doc._id,
            name: doc.name,
            api_key_digest: doc.api_key_hash,
            api_key_last4: doc.api_key_last_4,
            branding: doc.branding_config,
            credits_balance: doc.credits_balance,
        }
    }
}
