//! Flow management for tenant admins

use chrono::Utc;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::auth::Principal;
use crate::domain::{Flow, StepDescriptor};
use crate::logging::{AuditEvent, AuditEventType, AuditLogger};
use crate::store::Store;
use crate::types::{CheckpointError, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct SaveFlowRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub steps: Vec<StepDescriptor>,
}

impl SaveFlowRequest {
    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(CheckpointError::InvalidArgument("Flow name is required".into()));
        }
        let mut seen = HashSet::new();
        for step in &self.steps {
            if step.step_id.trim().is_empty() {
                return Err(CheckpointError::InvalidArgument(
                    "Every step needs a step_id".into(),
                ));
            }
            if !seen.insert(step.step_id.as_str()) {
                return Err(CheckpointError::InvalidArgument(format!(
                    "Duplicate step_id '{}'",
                    step.step_id
                )));
            }
        }
        Ok(())
    }
}

pub struct FlowCatalog {
    store: Arc<dyn Store>,
    audit: AuditLogger,
}

impl FlowCatalog {
    pub fn new(store: Arc<dyn Store>, audit: AuditLogger) -> Self {
        Self { store, audit }
    }

    pub async fn list(&self, principal: &Principal) -> Result<Vec<Flow>> {
        principal.authorize("list_flows")?;
        self.store.flows_for_tenant(&principal.tenant_id).await
    }

    /// Create the named flow, or replace the steps of the existing one.
    /// Step ids and order are frozen once a session uses the flow.
    pub async fn save(&self, principal: &Principal, req: SaveFlowRequest) -> Result<Flow> {
        principal.authorize("save_flow")?;
        req.validate()?;

        let now = Utc::now();
        let flow = self
            .store
            .save_flow(Flow {
                id: Uuid::new_v4().to_string(),
                tenant_id: principal.tenant_id.clone(),
                name: req.name.trim().to_string(),
                description: req.description,
                steps: req.steps,
                created_at: now,
                updated_at: now,
            })
            .await?;

        info!(tenant_id = %flow.tenant_id, flow = %flow.name, steps = flow.step_count(), "Flow saved");
        self.audit
            .log(
                AuditEvent::new(AuditEventType::FlowSaved)
                    .with_principal(principal)
                    .with_target(&flow.name)
                    .with_metadata(serde_json::json!({ "steps": flow.step_count() })),
            )
            .await;

        Ok(flow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::domain::Session;
    use crate::store::{FlowStore, MemoryStore, SessionStore};

    fn admin() -> Principal {
        Principal {
            tenant_id: "t1".into(),
            subject_id: "u1".into(),
            role: Role::Admin,
        }
    }

    fn request(name: &str, steps: &[&str]) -> SaveFlowRequest {
        SaveFlowRequest {
            name: name.into(),
            description: String::new(),
            steps: steps.iter().map(|id| StepDescriptor::new(id, "form")).collect(),
        }
    }

    #[tokio::test]
    async fn test_save_then_replace_keeps_id() {
        let catalog = FlowCatalog::new(Arc::new(MemoryStore::new()), AuditLogger::new());
        let first = catalog.save(&admin(), request("kyc", &["a"])).await.unwrap();
        let second = catalog
            .save(&admin(), request(" kyc ", &["a", "b"]))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.step_count(), 2);
        assert_eq!(catalog.list(&admin()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_step_order_frozen_once_sessions_exist() {
        let store = Arc::new(MemoryStore::new());
        let catalog = FlowCatalog::new(store.clone(), AuditLogger::new());
        let flow = catalog
            .save(&admin(), request("kyc", &["personal", "document"]))
            .await
            .unwrap();

        // Unused flows can still be reshaped freely
        catalog
            .save(&admin(), request("kyc", &["document", "personal"]))
            .await
            .unwrap();
        catalog
            .save(&admin(), request("kyc", &["personal", "document"]))
            .await
            .unwrap();

        let mut session = Session::new("s1".into(), flow.id.clone(), "u".into(), Utc::now());
        session.current_step_index = 1;
        store.create_session(&session).await.unwrap();

        let err = catalog
            .save(&admin(), request("kyc", &["document", "personal"]))
            .await
            .unwrap_err();
        assert!(matches!(err, CheckpointError::Conflict(_)));

        let current = store.flow_by_id(&flow.id).await.unwrap().unwrap();
        assert_eq!(
            current.step_at(session.current_step_index).map(|s| s.step_id.as_str()),
            Some("document")
        );

        let mut described = request("kyc", &["personal", "document"]);
        described.description = "Basic KYC".into();
        let saved = catalog.save(&admin(), described).await.unwrap();
        assert_eq!(saved.id, flow.id);
        assert_eq!(saved.description, "Basic KYC");
    }

    #[tokio::test]
    async fn test_validation() {
        let catalog = FlowCatalog::new(Arc::new(MemoryStore::new()), AuditLogger::new());
        for bad in [request("", &["a"]), request("x", &[""]), request("x", &["a", "a"])] {
            let err = catalog.save(&admin(), bad).await.unwrap_err();
            assert!(matches!(err, CheckpointError::InvalidArgument(_)));
        }
    }

    #[tokio::test]
    async fn test_member_lists_but_cannot_save() {
        let catalog = FlowCatalog::new(Arc::new(MemoryStore::new()), AuditLogger::new());
        let mut member = admin();
        member.role = Role::Member;
        assert!(catalog.list(&member).await.unwrap().is_empty());
        assert!(matches!(
            catalog.save(&member, request("kyc", &["a"])).await.unwrap_err(),
            CheckpointError::Unauthorized(_)
        ));
    }
}
