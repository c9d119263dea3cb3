//! Tenant user document schema

use bson::{doc, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::auth::Role;
use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;
use crate::domain::TenantUser;

/// Collection name for tenant users
pub const TENANT_USER_COLLECTION: &str = "tenant_users";

/// Tenant user document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct TenantUserDoc {
    pub _id: String,

    #[serde(default)]
    pub metadata: Metadata,

    pub tenant_id: String,

    /// Login email, unique across all tenants
    pub email: String,

    /// Argon2 password hash
    pub password_hash: String,

    #[serde(default)]
    pub role: Role,
}

impl IntoIndexes for TenantUserDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "email": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("email_unique".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "tenant_id": 1 },
                Some(
                    IndexOptions::builder()
                        .name("tenant_id_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for TenantUserDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

impl From<&TenantUser> for TenantUserDoc {
    fn from(user: &TenantUser) -> Self {
        Self {
            _id: user.id.clone(),
            metadata: Metadata::from_chrono(user.created_at, user.updated_at),
            tenant_id: user.tenant_id.clone(),
            email: user.email.clone(),
            password_hash: user.password_hash.clone(),
            role: user.role,
        }
    }
}

impl From<TenantUserDoc> for TenantUser {
    fn from(doc: TenantUserDoc) -> Self {
        Self {
            created_at: doc.metadata.created(),
            updated_at: doc.metadata.updated(),
            id: doc._id,
            tenant_id: doc.tenant_id,
            email: doc.email,
            password_hash: doc.password_hash,
            role: doc.role,
        }
    }
}
