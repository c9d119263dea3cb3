//! Review and decision gate
//!
//! Tenant users list their sessions, inspect collected data with short-lived
//! artifact links, and record the terminal decision. Every call is scoped to
//! the principal's tenant through the session's flow.

use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::auth::Principal;
use crate::domain::{Session, SessionStatus};
use crate::logging::{AuditEvent, AuditEventType, AuditLogger};
use crate::services::artifacts::ArtifactUrlIssuer;
use crate::store::Store;
use crate::types::{CheckpointError, Result};

/// Maximum sessions returned by one listing
pub const LIST_LIMIT: usize = 50;

#[derive(Debug, Clone, Serialize)]
pub struct ReviewView {
    pub session: Session,
    /// Artifact field name to read URL
    pub images: BTreeMap<String, String>,
    pub tenant_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub token: String,
    pub status: SessionStatus,
}

/// Replace the stored status with what a reader sees right now
fn as_seen_now(mut session: Session) -> Session {
    session.status = session.effective_status(Utc::now());
    session
}

pub struct ReviewGate {
    store: Arc<dyn Store>,
    artifacts: Arc<dyn ArtifactUrlIssuer>,
    audit: AuditLogger,
}

impl ReviewGate {
    pub fn new(
        store: Arc<dyn Store>,
        artifacts: Arc<dyn ArtifactUrlIssuer>,
        audit: AuditLogger,
    ) -> Self {
        Self {
            store,
            artifacts,
            audit,
        }
    }

    /// Load a session that must belong to the principal's tenant
    async fn owned_session(&self, principal: &Principal, token: &str) -> Result<Session> {
        if token.is_empty() {
            return Err(CheckpointError::InvalidArgument("Missing token".into()));
        }
        let session = self
            .store
            .session_by_token(token)
            .await?
            .ok_or_else(|| CheckpointError::NotFound("Session not found".into()))?;

        let owner = self
            .store
            .flow_by_id(&session.flow_id)
            .await?
            .map(|flow| flow.tenant_id)
            .ok_or_else(|| CheckpointError::Internal("Session flow is missing".into()))?;
        principal.ensure_tenant(&owner)?;

        Ok(session)
    }

    /// Up to `LIST_LIMIT` sessions, awaiting review first
    pub async fn list(&self, principal: &Principal, search: Option<&str>) -> Result<Vec<Session>> {
        principal.authorize("list_sessions")?;
        let sessions = self
            .store
            .list_sessions(&principal.tenant_id, search, LIST_LIMIT)
            .await?;
        Ok(sessions.into_iter().map(as_seen_now).collect())
    }

    /// Session detail with read URLs for stored artifacts. A key that fails
    /// to sign is left out rather than failing the whole review.
    pub async fn review(&self, principal: &Principal, token: &str) -> Result<ReviewView> {
        principal.authorize("review_session")?;
        let session = self.owned_session(principal, token).await?;

        let mut images = BTreeMap::new();
        for (field, key) in session.artifact_keys() {
            match self.artifacts.mint_download_url(key).await {
                Ok(url) => {
                    images.insert(field.to_string(), url);
                }
                Err(e) => {
                    warn!(field, error = %e, "Failed to sign artifact URL");
                }
            }
        }

        Ok(ReviewView {
            session: as_seen_now(session),
            images,
            tenant_id: principal.tenant_id.clone(),
        })
    }

    /// Record a terminal decision. Only approved or rejected, in any case;
    /// anything else leaves the session untouched.
    pub async fn decide(
        &self,
        principal: &Principal,
        token: &str,
        requested: &str,
        reason: Option<&str>,
    ) -> Result<Decision> {
        principal.authorize("decide_session")?;
        let status = SessionStatus::parse_decision(requested)?;
        let session = self.owned_session(principal, token).await?;

        self.store
            .update_session_status(&session.token, status)
            .await?;

        info!(tenant_id = %principal.tenant_id, %status, "Session decided");
        self.audit
            .log(
                AuditEvent::new(AuditEventType::SessionDecided)
                    .with_principal(principal)
                    .with_target(&session.token)
                    .with_metadata(serde_json::json!({
                        "status": status,
                        "previous_status": session.status,
                        "reason": reason,
                    })),
            )
            .await;

        Ok(Decision {
            token: session.token,
            status,
        })
    }
}
