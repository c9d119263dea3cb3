//! Flow document schema

use bson::{doc, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;
use crate::domain::{Flow, StepDescriptor};

/// Collection name for flows
pub const FLOW_COLLECTION: &str = "flows";

/// Flow document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct FlowDoc {
    pub _id: String,

    #[serde(default)]
    pub metadata: Metadata,

    pub tenant_id: String,

    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub steps_configuration: Vec<StepDescriptor>,
}

impl IntoIndexes for FlowDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "tenant_id": 1, "name": 1 },
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .name("tenant_flow_name_unique".to_string())
                    .build(),
            ),
        )]
    }
}

impl MutMetadata for FlowDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

impl From<&Flow> for FlowDoc {
    fn from(flow: &Flow) -> Self {
        Self {
            _id: flow.id.clone(),
            metadata: Metadata::from_chrono(flow.created_at, flow.updated_at),
            tenant_id: flow.tenant_id.clone(),
            name: flow.name.clone(),
            description: flow.description.clone(),
            steps_configuration: flow.steps.clone(),
        }
    }
}

impl From<FlowDoc> for Flow {
    fn from(doc: FlowDoc) -> Self {
        Self {
            created_at: doc.metadata.created(),
            updated_at: doc.metadata.updated(),
            id: doc._id,
            tenant_id: doc.tenant_id,
            name: doc.name,
            description: doc.description,
            steps: doc.steps_configuration,
        }
    }
}
