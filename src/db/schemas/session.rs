//! Session document schema
//!
//! The session token is the document `_id`.

use bson::{doc, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;
use crate::domain::{CollectedData, Session, SessionStatus};

/// Collection name for sessions
pub const SESSION_COLLECTION: &str = "verification_sessions";

/// Session document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct SessionDoc {
    /// Session token
    pub _id: String,

    #[serde(default)]
    pub metadata: Metadata,

    pub flow_id: String,

    pub user_reference: String,

    pub current_step_index: i64,

    pub status: SessionStatus,

    #[serde(default)]
    pub collected_data: CollectedData,

    pub expires_at: DateTime,
}

impl IntoIndexes for SessionDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "flow_id": 1 },
                Some(
                    IndexOptions::builder()
                        .name("flow_id_index".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "status": 1, "metadata.created_at": -1 },
                Some(
                    IndexOptions::builder()
                        .name("status_created_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for SessionDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

impl From<&Session> for SessionDoc {
    fn from(session: &Session) -> Self {
        Self {
            _id: session.token.clone(),
            metadata: Metadata::from_chrono(session.created_at, session.updated_at),
            flow_id: session.flow_id.clone(),
            user_reference: session.user_reference.clone(),
            current_step_index: i64::from(session.current_step_index),
            status: session.status,
            collected_data: session.collected_data.clone(),
            expires_at: DateTime::from_chrono(session.expires_at),
        }
    }
}

impl From<SessionDoc> for Session {
    fn from(doc: SessionDoc) -> Self {
        Self {
            created_at: doc.metadata.created(),
            updated_at: doc.metadata.updated(),
            token: doc._id,
            flow_id: doc.flow_id,
            user_reference: doc.user_reference,
            current_step_index: u32::try_from(doc.current_step_index.max(0)).unwrap_or(u32::MAX),
            status: doc.status,
            collected_data: doc.collected_data,
            expires_at: doc.expires_at.to_chrono(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FieldValue;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_session_document_shape() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let mut session = Session::new("tok".into(), "flow-1".into(), "user-9".into(), now);
        session
            .collected_data
            .insert("selfie".into(), FieldValue::from("t/tok/selfie.jpg"));

        let doc = bson::to_document(&SessionDoc::from(&session)).unwrap();
        assert_eq!(doc.get_str("_id").unwrap(), "tok");
        assert_eq!(doc.get_str("status").unwrap(), "PENDING");
        assert_eq!(doc.get_i64("current_step_index").unwrap(), 0);
        assert_eq!(
            doc.get_document("collected_data")
                .unwrap()
                .get_str("selfie")
                .unwrap(),
            "t/tok/selfie.jpg"
        );

        let back: Session = bson::from_document::<SessionDoc>(doc).unwrap().into();
        assert_eq!(back, session);
    }
}
