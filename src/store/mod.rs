//! Persistence seams
//!
//! Services talk to storage only through these traits. `MongoStore` backs
//! production; `MemoryStore` backs dev mode and the test suite. Both must
//! apply ledger entries and tenant registration all-or-nothing.

pub mod memory;
pub mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

use crate::domain::{CreditTransaction, Flow, Session, SessionStatus, Tenant, TenantUser};
use crate::types::Result;

/// Description written with the registration grant
pub const WELCOME_CREDITS_DESCRIPTION: &str = "Welcome Credits";

/// Flow definitions, read fresh on every request
#[async_trait::async_trait]
pub trait FlowStore: Send + Sync {
    /// Flow by its per-tenant name
    async fn flow_by_name(&self, tenant_id: &str, name: &str) -> Result<Option<Flow>>;
    async fn flow_by_id(&self, flow_id: &str) -> Result<Option<Flow>>;
    /// All flows of a tenant, newest first
    async fn flows_for_tenant(&self, tenant_id: &str) -> Result<Vec<Flow>>;
    /// Insert a flow, or replace the flow with the same `(tenant_id, name)`.
    /// Returns the stored flow, which keeps the id of a replaced one.
    /// `Conflict` when the replacement changes the step ids or their order
    /// while any session references the flow.
    async fn save_flow(&self, flow: Flow) -> Result<Flow>;
}

/// Tenants, their API key digests and their users
#[async_trait::async_trait]
pub trait CredentialStore: Send + Sync {
    async fn tenant_by_key_digest(&self, digest: &str) -> Result<Option<Tenant>>;
    async fn tenant_by_id(&self, tenant_id: &str) -> Result<Option<Tenant>>;
    /// Replace digest and display suffix in one write. `NotFound` for an unknown tenant.
    async fn update_key_digest(&self, tenant_id: &str, digest: &str, last4: &str) -> Result<()>;
    async fn user_by_email(&self, email: &str) -> Result<Option<TenantUser>>;
    /// Write tenant, first user and the welcome grant together.
    /// `Conflict` when the email is taken.
    async fn register_tenant(
        &self,
        tenant: Tenant,
        user: TenantUser,
        welcome_credits: i64,
    ) -> Result<()>;
}

/// Verification sessions
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    async fn create_session(&self, session: &Session) -> Result<()>;
    async fn session_by_token(&self, token: &str) -> Result<Option<Session>>;
    /// Overwrite the full record. Last writer wins.
    async fn update_session(&self, session: &Session) -> Result<()>;
    /// Set status only. `NotFound` for an unknown token.
    async fn update_session_status(&self, token: &str, status: SessionStatus) -> Result<()>;
    /// Sessions of a tenant's flows in review order, optionally filtered by a
    /// case-insensitive substring of the user reference
    async fn list_sessions(
        &self,
        tenant_id: &str,
        search: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Session>>;
}

/// Append-only credit ledger
#[async_trait::async_trait]
pub trait LedgerStore: Send + Sync {
    /// Add `amount` to the balance and append the row as one unit.
    /// Returns the new balance. `NotFound` for an unknown tenant.
    async fn apply_credit(&self, tx: &CreditTransaction) -> Result<i64>;
    /// Newest `limit` rows, newest first
    async fn recent_transactions(
        &self,
        tenant_id: &str,
        limit: usize,
    ) -> Result<Vec<CreditTransaction>>;
}

/// Everything a running service needs from storage
pub trait Store: FlowStore + CredentialStore + SessionStore + LedgerStore {}

impl<T> Store for T where T: FlowStore + CredentialStore + SessionStore + LedgerStore {}
