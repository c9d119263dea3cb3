//! Trust boundary
//!
//! Two credential schemes meet here: tenant API keys for server-to-server
//! session creation, and signed tokens for tenant users on the admin surface.
//! Everything past this module works with a resolved `Tenant` or `Principal`.

use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::auth::{
    constant_time_eq, digest_api_key, extract_api_key, extract_token_from_header,
    generate_api_key, hash_password, verify_password, ApiKeyStatus, JwtValidator, Principal,
    Role, TokenInput,
};
use crate::domain::{Branding, Tenant, TenantUser};
use crate::logging::{AuditEvent, AuditEventType, AuditLogger};
use crate::store::Store;
use crate::types::{CheckpointError, Result};

/// Primary color given to new tenants
pub const DEFAULT_PRIMARY_COLOR: &str = "#4F46E5";

const INVALID_CREDENTIALS: &str = "Invalid credentials";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub company_name: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn default_branding() -> Branding {
    let mut branding = Branding::new();
    branding.insert(
        "primary_color".into(),
        serde_json::Value::String(DEFAULT_PRIMARY_COLOR.into()),
    );
    branding
}

pub struct TrustBoundary {
    store: Arc<dyn Store>,
    jwt: JwtValidator,
    audit: AuditLogger,
    welcome_credits: i64,
}

impl TrustBoundary {
    pub fn new(
        store: Arc<dyn Store>,
        jwt: JwtValidator,
        audit: AuditLogger,
        welcome_credits: i64,
    ) -> Self {
        Self {
            store,
            jwt,
            audit,
            welcome_credits,
        }
    }

    /// Resolve the tenant owning the presented API key.
    ///
    /// Every failure is the same `Unauthenticated` so callers cannot tell a
    /// missing header from an unknown key.
    pub async fn resolve_api_key(&self, auth_header: Option<&str>) -> Result<Tenant> {
        let rejected = || CheckpointError::Unauthenticated("Invalid API key".into());

        let key = extract_api_key(auth_header).ok_or_else(rejected)?;
        let digest = digest_api_key(key);

        let tenant = self
            .store
            .tenant_by_key_digest(&digest)
            .await?
            .ok_or_else(rejected)?;

        match tenant.api_key_digest.as_deref() {
            Some(stored) if constant_time_eq(stored, &digest) => Ok(tenant),
            _ => Err(rejected()),
        }
    }

    /// Verify a bearer token and produce the caller's principal
    pub fn verify(&self, auth_header: Option<&str>) -> Result<Principal> {
        let token = extract_token_from_header(auth_header)
            .ok_or_else(|| CheckpointError::Unauthenticated("Missing authorization token".into()))?;
        let claims = self.jwt.verify_token(token)?;
        Ok(Principal::from(claims))
    }

    fn issue_token(&self, user: &TenantUser) -> Result<String> {
        self.jwt.generate_token(TokenInput {
            subject_id: user.id.clone(),
            tenant_id: user.tenant_id.clone(),
            role: user.role,
        })
    }

    /// Exchange email and password for a signed token
    pub async fn login(&self, req: LoginRequest) -> Result<String> {
        let email = normalize_email(&req.email);

        let user = match self.store.user_by_email(&email).await? {
            Some(user) => user,
            None => {
                self.audit
                    .log(AuditEvent::new(AuditEventType::LoginFailed))
                    .await;
                return Err(CheckpointError::Unauthenticated(INVALID_CREDENTIALS.into()));
            }
        };

        if !verify_password(&req.password, &user.password_hash)? {
            self.audit
                .log(AuditEvent::new(AuditEventType::LoginFailed).with_tenant(&user.tenant_id))
                .await;
            return Err(CheckpointError::Unauthenticated(INVALID_CREDENTIALS.into()));
        }

        let token = self.issue_token(&user)?;

        info!(tenant_id = %user.tenant_id, user_id = %user.id, "Tenant user logged in");
        self.audit
            .log(
                AuditEvent::new(AuditEventType::LoginSucceeded)
                    .with_tenant(&user.tenant_id)
                    .with_target(&user.id),
            )
            .await;

        Ok(token)
    }

    /// Create a tenant with its first admin user and the welcome grant,
    /// then sign that user in
    pub async fn register(&self, req: RegisterRequest) -> Result<String> {
        let email = normalize_email(&req.email);
        if email.is_empty() || req.password.is_empty() {
            return Err(CheckpointError::InvalidArgument(
                "Email and password are required".into(),
            ));
        }

        let company = req.company_name.trim();
        let name = if company.is_empty() {
            format!("{} {}", req.first_name.trim(), req.last_name.trim())
                .trim()
                .to_string()
        } else {
            company.to_string()
        };

        let password_hash = hash_password(&req.password)?;
        let now = Utc::now();
        let tenant = Tenant::new(Uuid::new_v4().to_string(), name, default_branding());
        let user = TenantUser {
            id: Uuid::new_v4().to_string(),
            tenant_id: tenant.id.clone(),
            email,
            password_hash,
            role: Role::Admin,
            created_at: now,
            updated_at: now,
        };

        self.store
            .register_tenant(tenant.clone(), user.clone(), self.welcome_credits)
            .await?;

        info!(tenant_id = %tenant.id, tenant = %tenant.name, "Tenant registered");
        self.audit
            .log(
                AuditEvent::new(AuditEventType::TenantRegistered)
                    .with_tenant(&tenant.id)
                    .with_target(&user.id)
                    .with_metadata(serde_json::json!({ "welcome_credits": self.welcome_credits })),
            )
            .await;

        self.issue_token(&user)
    }

    /// Replace the tenant's API key. The plaintext is returned exactly once.
    pub async fn rotate_key(&self, principal: &Principal) -> Result<String> {
        principal.authorize("rotate_api_key")?;

        let key = generate_api_key();
        self.store
            .update_key_digest(&principal.tenant_id, &key.digest, &key.last4)
            .await?;

        info!(tenant_id = %principal.tenant_id, "API key rotated");
        debug!(last4 = %key.last4, "New API key suffix");
        self.audit
            .log(
                AuditEvent::new(AuditEventType::ApiKeyRotated)
                    .with_principal(principal)
                    .with_metadata(serde_json::json!({ "last4": key.last4 })),
            )
            .await;

        Ok(key.plaintext)
    }

    pub async fn key_status(&self, principal: &Principal) -> Result<ApiKeyStatus> {
        principal.authorize("api_key_status")?;

        let tenant = self
            .store
            .tenant_by_id(&principal.tenant_id)
            .await?
            .ok_or_else(|| CheckpointError::NotFound("Tenant not found".into()))?;

        Ok(ApiKeyStatus::from_last4(tenant.api_key_last4.as_deref()))
    }
}
