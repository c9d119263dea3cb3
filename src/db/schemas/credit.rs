//! Credit transaction document schema
//!
//! Rows are append-only. The tenant's `credits_balance` equals the sum of
//! `amount` over that tenant's rows.

use bson::{doc, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;
use crate::domain::CreditTransaction;

/// Collection name for credit transactions
pub const CREDIT_TRANSACTION_COLLECTION: &str = "credit_transactions";

/// Credit transaction document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CreditTransactionDoc {
    pub _id: String,

    #[serde(default)]
    pub metadata: Metadata,

    pub tenant_id: String,

    /// Signed delta, positive for grants
    pub amount: i64,

    pub description: String,

    /// Ledger time, kept outside metadata so it is never restamped
    pub created_at: DateTime,

    /// Per-tenant position, strictly increasing in application order
    #[serde(default)]
    pub seq: i64,
}

impl CreditTransactionDoc {
    pub fn with_seq(mut self, seq: i64) -> Self {
        self.seq = seq;
        self
    }
}

impl IntoIndexes for CreditTransactionDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "tenant_id": 1, "seq": -1, "created_at": -1 },
            Some(
                IndexOptions::builder()
                    .name("tenant_seq_index".to_string())
                    .build(),
            ),
        )]
    }
}

impl MutMetadata for CreditTransactionDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

impl From<&CreditTransaction> for CreditTransactionDoc {
    fn from(tx: &CreditTransaction) -> Self {
        Self {
            _id: tx.id.clone(),
            metadata: Metadata::from_chrono(tx.created_at, tx.created_at),
            tenant_id: tx.tenant_id.clone(),
            amount: tx.amount,
            description: tx.description.clone(),
            created_at: DateTime::from_chrono(tx.created_at),
            seq: 0,
        }
    }
}

impl From<CreditTransactionDoc> for CreditTransaction {
    fn from(doc: CreditTransactionDoc) -> Self {
        Self {
            id: doc._id,
            tenant_id: doc.tenant_id,
            amount: doc.amount,
            description: doc.description,
            created_at: doc.created_at.to_chrono(),
        }
    }
}
