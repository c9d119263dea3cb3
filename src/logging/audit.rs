//! Audit trail for tenant-affecting actions
//!
//! Events are written as JSONL, one per line. Secrets never appear in an
//! event: key rotations record only the new display suffix.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::auth::{Principal, Role};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    TenantRegistered,
    LoginSucceeded,
    LoginFailed,
    ApiKeyRotated,
    CreditsApplied,
    SessionDecided,
    FlowSaved,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub event_type: AuditEventType,
    pub tenant_id: Option<String>,
    /// User that performed the action
    pub actor_id: Option<String>,
    pub role: Option<Role>,
    /// Session token, flow name, or other object acted on
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl AuditEvent {
    pub fn new(event_type: AuditEventType) -> Self {
        Self {
            timestamp: Utc::now(),
            event_type,
            tenant_id: None,
            actor_id: None,
            role: None,
            target: None,
            metadata: None,
        }
    }

    /// Attribute the event to a verified caller
    pub fn with_principal(mut self, principal: &Principal) -> Self {
        self.tenant_id = Some(principal.tenant_id.clone());
        self.actor_id = Some(principal.subject_id.clone());
        self.role = Some(principal.role);
        self
    }

    pub fn with_tenant(mut self, tenant_id: &str) -> Self {
        self.tenant_id = Some(tenant_id.to_string());
        self
    }

    pub fn with_target(mut self, target: &str) -> Self {
        self.target = Some(target.to_string());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn to_jsonl(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Appends audit events to a JSONL file. Without a file it only drops events,
/// which is the dev and test default.
#[derive(Clone, Default)]
pub struct AuditLogger {
    inner: Arc<Mutex<AuditLoggerInner>>,
}

#[derive(Default)]
struct AuditLoggerInner {
    writer: Option<BufWriter<File>>,
}

impl AuditLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Initialize file logging to the specified path
    pub async fn init_file(&self, path: PathBuf) -> std::io::Result<()> {
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        let mut inner = self.inner.lock().await;
        inner.writer = Some(BufWriter::new(file));

        info!("Audit logging initialized to {}", path.display());
        Ok(())
    }

    pub async fn log(&self, event: AuditEvent) {
        let jsonl = match event.to_jsonl() {
            Ok(line) => line,
            Err(e) => {
                error!("Failed to serialize audit event: {}", e);
                return;
            }
        };

        let mut inner = self.inner.lock().await;

        if let Some(ref mut writer) = inner.writer {
            if let Err(e) = writeln!(writer, "{}", jsonl) {
                error!("Failed to write audit event: {}", e);
            }
            if let Err(e) = writer.flush() {
                error!("Failed to flush audit log: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal() -> Principal {
        Principal {
            tenant_id: "tenant-1".into(),
            subject_id: "user-1".into(),
            role: Role::Admin,
        }
    }

    #[test]
    fn test_event_serialization() {
        let event = AuditEvent::new(AuditEventType::ApiKeyRotated)
            .with_principal(&principal())
            .with_metadata(serde_json::json!({ "last4": "beef" }));

        let jsonl = event.to_jsonl().unwrap();
        assert!(jsonl.contains("api_key_rotated"));
        assert!(jsonl.contains("tenant-1"));
        assert!(jsonl.contains("ADMIN"));
        assert!(jsonl.contains("beef"));
    }

    #[test]
    fn test_decision_event_target() {
        let event = AuditEvent::new(AuditEventType::SessionDecided)
            .with_tenant("tenant-1")
            .with_target("tok-123");

        let jsonl = event.to_jsonl().unwrap();
        assert!(jsonl.contains("session_decided"));
        assert!(jsonl.contains("tok-123"));
        assert!(!jsonl.contains("metadata"));
    }

    #[tokio::test]
    async fn test_file_logging_appends_lines() {
        let path = std::env::temp_dir().join(format!("checkpoint-audit-{}.jsonl", uuid::Uuid::new_v4()));
        let logger = AuditLogger::new();
        logger.init_file(path.clone()).await.unwrap();

        logger.log(AuditEvent::new(AuditEventType::LoginSucceeded)).await;
        logger.log(AuditEvent::new(AuditEventType::LoginFailed)).await;

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].contains("login_failed"));

        let _ = std::fs::remove_file(path);
    }
}
