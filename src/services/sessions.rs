//! Session state machine driver
//!
//! Sessions are created with a tenant API key and then advanced by whoever
//! holds the session token. The flow is re-read on every request, so edits to
//! a flow apply to sessions already in flight.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::domain::{
    Branding, CollectedData, Flow, Session, SessionStatus, StepDescriptor, Tenant,
    SESSION_TTL_SECONDS,
};
use crate::services::artifacts::{ArtifactUrlIssuer, UploadTicket};
use crate::store::Store;
use crate::types::{CheckpointError, Result};

/// Random bytes behind every session token
const SESSION_TOKEN_BYTES: usize = 32;

#[derive(Debug, Clone, Deserialize)]
pub struct InitSessionRequest {
    /// Flow name within the calling tenant
    #[serde(alias = "flow_id")]
    pub flow_name: String,
    #[serde(default)]
    pub user_reference: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InitSessionResponse {
    pub redirect_url: String,
    pub expires_in: i64,
}

/// Presentation settings the end-user client renders with
#[derive(Debug, Clone, Serialize)]
pub struct TenantPresentation {
    pub name: String,
    pub branding: Branding,
}

impl From<Tenant> for TenantPresentation {
    fn from(tenant: Tenant) -> Self {
        Self {
            name: tenant.name,
            branding: tenant.branding,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub session: Session,
    /// Stored status, or `EXPIRED` for a pending session past its deadline
    pub effective_status: SessionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_step: Option<StepDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant: Option<TenantPresentation>,
}

/// 256 bits from the OS source, URL-safe without padding
pub fn generate_session_token() -> String {
    let mut bytes = [0u8; SESSION_TOKEN_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

pub struct SessionEngine {
    store: Arc<dyn Store>,
    artifacts: Arc<dyn ArtifactUrlIssuer>,
    frontend_url: String,
}

impl SessionEngine {
    pub fn new(
        store: Arc<dyn Store>,
        artifacts: Arc<dyn ArtifactUrlIssuer>,
        frontend_url: &str,
    ) -> Self {
        Self {
            store,
            artifacts,
            frontend_url: frontend_url.trim_end_matches('/').to_string(),
        }
    }

    async fn load_session(&self, token: &str) -> Result<Session> {
        if token.is_empty() {
            return Err(CheckpointError::InvalidArgument("Missing token".into()));
        }
        self.store
            .session_by_token(token)
            .await?
            .ok_or_else(|| CheckpointError::NotFound("Session not found".into()))
    }

    async fn load_flow(&self, session: &Session) -> Result<Flow> {
        self.store.flow_by_id(&session.flow_id).await?.ok_or_else(|| {
            CheckpointError::Internal(format!(
                "Flow {} of session is missing",
                session.flow_id
            ))
        })
    }

    /// Start a session for the tenant that owns the presented API key.
    /// Credit balance does not gate creation.
    pub async fn initialize(
        &self,
        tenant: &Tenant,
        req: InitSessionRequest,
    ) -> Result<InitSessionResponse> {
        let flow = self
            .store
            .flow_by_name(&tenant.id, req.flow_name.trim())
            .await?
            .ok_or_else(|| {
                CheckpointError::NotFound(format!("Flow '{}' not found", req.flow_name.trim()))
            })?;

        let session = Session::new(
            generate_session_token(),
            flow.id.clone(),
            req.user_reference,
            Utc::now(),
        );
        self.store.create_session(&session).await?;

        info!(tenant_id = %tenant.id, flow = %flow.name, "Session initialized");

        Ok(InitSessionResponse {
            redirect_url: format!("{}/start?token={}", self.frontend_url, session.token),
            expires_in: SESSION_TTL_SECONDS,
        })
    }

    /// Current state for the end-user client, with the owning tenant's branding
    pub async fn get(&self, token: &str) -> Result<SessionView> {
        let session = self.load_session(token).await?;
        let flow = self.load_flow(&session).await?;
        let tenant = self.store.tenant_by_id(&flow.tenant_id).await?;

        Ok(SessionView {
            effective_status: session.effective_status(Utc::now()),
            next_step: session.next_step(&flow).cloned(),
            tenant: tenant.map(TenantPresentation::from),
            session,
        })
    }

    /// Merge one step's fields and advance by exactly one step
    pub async fn submit_step(&self, token: &str, fields: CollectedData) -> Result<SessionView> {
        let mut session = self.load_session(token).await?;
        let flow = self.load_flow(&session).await?;

        let now = Utc::now();
        let before = session.status;
        session.apply_submission(fields, flow.step_count(), now);
        self.store.update_session(&session).await?;

        debug!(
            step = session.current_step_index,
            steps = flow.step_count(),
            "Step submitted"
        );
        if before != session.status {
            info!(flow = %flow.name, status = %session.status, "Session collected all steps");
        }

        Ok(SessionView {
            effective_status: session.effective_status(now),
            next_step: session.next_step(&flow).cloned(),
            tenant: None,
            session,
        })
    }

    /// Presigned write URL under the owning tenant's prefix
    pub async fn upload_url(&self, token: &str, filename: &str) -> Result<UploadTicket> {
        let session = self.load_session(token).await?;
        let flow = self.load_flow(&session).await?;
        self.artifacts
            .mint_upload_url(&flow.tenant_id, &session.token, filename)
            .await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::FieldValue;
    use crate::services::artifacts::{object_key, validate_filename};
    use crate::store::{FlowStore, MemoryStore, SessionStore};

    /// Issuer that returns predictable URLs and fails for keys containing "broken"
    pub(crate) struct FakeIssuer;

    #[async_trait::async_trait]
    impl ArtifactUrlIssuer for FakeIssuer {
        async fn mint_upload_url(
            &self,
            tenant_id: &str,
            session_token: &str,
            filename: &str,
        ) -> Result<UploadTicket> {
            validate_filename(filename)?;
            let key = object_key(tenant_id, session_token, filename);
            Ok(UploadTicket {
                url: format!("https://storage.test/put/{}", key),
                object_key: key,
            })
        }

        async fn mint_download_url(&self, object_key: &str) -> Result<String> {
            if object_key.contains("broken") {
                return Err(CheckpointError::Internal("signer offline".into()));
            }
            Ok(format!("https://storage.test/get/{}", object_key))
        }
    }

    pub(crate) async fn seeded_store() -> (Arc<MemoryStore>, Tenant) {
        let store = Arc::new(MemoryStore::new());
        let mut branding = Branding::new();
        branding.insert("primary_color".into(), "#000000".into());
        let tenant = Tenant::new("tenant-1".into(), "Acme".into(), branding);
        store.insert_tenant(tenant.clone()).await;

        let now = Utc::now();
        store
            .save_flow(Flow {
                id: "flow-1".into(),
                tenant_id: tenant.id.clone(),
                name: "kyc-basic".into(),
                description: String::new(),
                steps: vec![
                    StepDescriptor::new("personal", "form"),
                    StepDescriptor::new("document", "document_capture"),
                ],
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap();
        (store, tenant)
    }

    fn engine(store: Arc<MemoryStore>) -> SessionEngine {
        SessionEngine::new(store, Arc::new(FakeIssuer), "http://localhost:3000/")
    }

    fn token_of(init: &InitSessionResponse) -> String {
        init.redirect_url
            .split("token=")
            .nth(1)
            .unwrap_or_default()
            .to_string()
    }

    fn fields(pairs: &[(&str, &str)]) -> CollectedData {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), FieldValue::from(*v)))
            .collect()
    }

    #[test]
    fn test_session_token_entropy_and_alphabet() {
        let a = generate_session_token();
        let b = generate_session_token();
        assert_ne!(a, b);
        assert_eq!(a.len(), 43);
        assert!(a
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[tokio::test]
    async fn test_initialize_returns_redirect() {
        let (store, tenant) = seeded_store().await;
        let engine = engine(store.clone());

        let init = engine
            .initialize(
                &tenant,
                InitSessionRequest {
                    flow_name: "kyc-basic".into(),
                    user_reference: "customer-42".into(),
                },
            )
            .await
            .unwrap();

        assert_eq!(init.expires_in, 900);
        assert!(init.redirect_url.starts_with("http://localhost:3000/start?token="));
        let stored = store.session_by_token(&token_of(&init)).await.unwrap().unwrap();
        assert_eq!(stored.status, SessionStatus::Pending);
        assert_eq!(stored.current_step_index, 0);
        assert!(stored.collected_data.is_empty());
        assert_eq!(stored.user_reference, "customer-42");
    }

    #[tokio::test]
    async fn test_initialize_unknown_flow_or_foreign_tenant() {
        let (store, _) = seeded_store().await;
        let engine = engine(store);
        let stranger = Tenant::new("tenant-2".into(), "Other".into(), Branding::new());

        let err = engine
            .initialize(
                &stranger,
                InitSessionRequest {
                    flow_name: "kyc-basic".into(),
                    user_reference: String::new(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CheckpointError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_two_step_walkthrough() {
        let (store, tenant) = seeded_store().await;
        let engine = engine(store);
        let init = engine
            .initialize(
                &tenant,
                InitSessionRequest {
                    flow_name: "kyc-basic".into(),
                    user_reference: "u".into(),
                },
            )
            .await
            .unwrap();
        let token = token_of(&init);

        let view = engine.get(&token).await.unwrap();
        assert_eq!(view.session.current_step_index, 0);
        assert_eq!(view.effective_status, SessionStatus::Pending);
        assert_eq!(view.next_step.unwrap().step_id, "personal");
        assert_eq!(view.tenant.unwrap().name, "Acme");

        let view = engine
            .submit_step(&token, fields(&[("first_name", "Ada")]))
            .await
            .unwrap();
        assert_eq!(view.session.current_step_index, 1);
        assert_eq!(view.session.status, SessionStatus::Pending);
        assert_eq!(view.next_step.unwrap().step_id, "document");

        let view = engine
            .submit_step(&token, fields(&[("document_front", "k1")]))
            .await
            .unwrap();
        assert_eq!(view.session.current_step_index, 2);
        assert_eq!(view.session.status, SessionStatus::InProgress);
        assert!(view.next_step.is_none());

        let view = engine.submit_step(&token, CollectedData::new()).await.unwrap();
        assert_eq!(view.session.current_step_index, 3);
        assert_eq!(view.session.status, SessionStatus::InProgress);
        assert!(view.next_step.is_none());
        assert_eq!(view.session.collected_data.len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_and_missing_token() {
        let (store, _) = seeded_store().await;
        let engine = engine(store);
        assert!(matches!(
            engine.get("nope").await.unwrap_err(),
            CheckpointError::NotFound(_)
        ));
        assert!(matches!(
            engine.submit_step("nope", CollectedData::new()).await.unwrap_err(),
            CheckpointError::NotFound(_)
        ));
        assert!(matches!(
            engine.get("").await.unwrap_err(),
            CheckpointError::InvalidArgument(_)
        ));
    }

    #[tokio::test]
    async fn test_expired_pending_reads_as_expired() {
        let (store, _) = seeded_store().await;
        let past = Utc::now() - chrono::Duration::seconds(SESSION_TTL_SECONDS + 60);
        let session = Session::new("old".into(), "flow-1".into(), "u".into(), past);
        store.create_session(&session).await.unwrap();

        let view = engine(store).get("old").await.unwrap();
        assert_eq!(view.session.status, SessionStatus::Pending);
        assert_eq!(view.effective_status, SessionStatus::Expired);
    }

    #[tokio::test]
    async fn test_upload_url_uses_flow_tenant() {
        let (store, tenant) = seeded_store().await;
        let engine = engine(store);
        let init = engine
            .initialize(
                &tenant,
                InitSessionRequest {
                    flow_name: "kyc-basic".into(),
                    user_reference: "u".into(),
                },
            )
            .await
            .unwrap();
        let token = token_of(&init);

        let ticket = engine.upload_url(&token, "front.jpg").await.unwrap();
        assert_eq!(ticket.object_key, format!("tenant-1/{}/front.jpg", token));

        let err = engine.upload_url(&token, "../x.jpg").await.unwrap_err();
        assert!(matches!(err, CheckpointError::InvalidArgument(_)));
    }
}
