//! Common metadata for all documents
//!
//! Tracks creation and update timestamps.

use bson::DateTime;
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Common metadata for all documents
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Metadata {
    /// When the document was last updated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime>,

    /// When the document was created
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime>,
}

impl Metadata {
    /// Create new metadata with current timestamp
    pub fn new() -> Self {
        let now = DateTime::now();
        Self {
            updated_at: Some(now),
            created_at: Some(now),
        }
    }

    /// Metadata carrying timestamps from the domain layer
    pub fn from_chrono(created_at: chrono::DateTime<Utc>, updated_at: chrono::DateTime<Utc>) -> Self {
        Self {
            created_at: Some(DateTime::from_chrono(created_at)),
            updated_at: Some(DateTime::from_chrono(updated_at)),
        }
    }

    pub fn created(&self) -> chrono::DateTime<Utc> {
        self.created_at.map(|d| d.to_chrono()).unwrap_or_else(Utc::now)
    }

    pub fn updated(&self) -> chrono::DateTime<Utc> {
        self.updated_at
            .or(self.created_at)
            .map(|d| d.to_chrono())
            .unwrap_or_else(Utc::now)
    }
}
