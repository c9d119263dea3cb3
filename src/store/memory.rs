//! In-memory store for dev mode and tests
//!
//! All state sits behind one mutex, so every trait method is atomic with
//! respect to every other. That gives the same all-or-nothing ledger and
//! registration semantics as the MongoDB transactions.

use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::Mutex;

use super::{
    CredentialStore, FlowStore, LedgerStore, SessionStore, WELCOME_CREDITS_DESCRIPTION,
};
use crate::domain::{
    next_balance, sort_for_review, step_order_locked, CreditTransaction, Flow, Session,
    SessionStatus, Tenant, TenantUser,
};
use crate::types::{CheckpointError, Result};

#[derive(Default)]
struct State {
    tenants: HashMap<String, Tenant>,
    /// Keyed by email
    users: HashMap<String, TenantUser>,
    flows: HashMap<String, Flow>,
    sessions: HashMap<String, Session>,
    /// Insertion order is ledger order
    transactions: Vec<CreditTransaction>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a tenant as-is, bypassing registration. Used for seeding.
    pub async fn insert_tenant(&self, tenant: Tenant) {
        let mut state = self.state.lock().await;
        state.tenants.insert(tenant.id.clone(), tenant);
    }
}

#[async_trait::async_trait]
impl FlowStore for MemoryStore {
    async fn flow_by_name(&self, tenant_id: &str, name: &str) -> Result<Option<Flow>> {
        let state = self.state.lock().await;
        Ok(state
            .flows
            .values()
            .find(|f| f.tenant_id == tenant_id && f.name == name)
            .cloned())
    }

    async fn flow_by_id(&self, flow_id: &str) -> Result<Option<Flow>> {
        let state = self.state.lock().await;
        Ok(state.flows.get(flow_id).cloned())
    }

    async fn flows_for_tenant(&self, tenant_id: &str) -> Result<Vec<Flow>> {
        let state = self.state.lock().await;
        let mut flows: Vec<Flow> = state
            .flows
            .values()
            .filter(|f| f.tenant_id == tenant_id)
            .cloned()
            .collect();
        flows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(flows)
    }

    async fn save_flow(&self, mut flow: Flow) -> Result<Flow> {
        let mut state = self.state.lock().await;
        let existing = state
            .flows
            .values()
            .find(|f| f.tenant_id == flow.tenant_id && f.name == flow.name)
            .cloned();

        if let Some(current) = existing {
            let referenced = state.sessions.values().any(|s| s.flow_id == current.id);
            if referenced && !current.same_step_order(&flow.steps) {
                return Err(step_order_locked(&flow.name));
            }
            flow.id = current.id;
            flow.created_at = current.created_at;
        }
        state.flows.insert(flow.id.clone(), flow.clone());
        Ok(flow)
    }
}

#[async_trait::async_trait]
impl CredentialStore for MemoryStore {
    async fn tenant_by_key_digest(&self, digest: &str) -> Result<Option<Tenant>> {
        let state = self.state.lock().await;
        Ok(state
            .tenants
            .values()
            .find(|t| t.api_key_digest.as_deref() == Some(digest))
            .cloned())
    }

    async fn tenant_by_id(&self, tenant_id: &str) -> Result<Option<Tenant>> {
        let state = self.state.lock().await;
        Ok(state.tenants.get(tenant_id).cloned())
    }

    async fn update_key_digest(&self, tenant_id: &str, digest: &str, last4: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        let tenant = state
            .tenants
            .get_mut(tenant_id)
            .ok_or_else(|| CheckpointError::NotFound("Tenant not found".into()))?;
        tenant.api_key_digest = Some(digest.to_string());
        tenant.api_key_last4 = Some(last4.to_string());
        tenant.updated_at = Utc::now();
        Ok(())
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<TenantUser>> {
        let state = self.state.lock().await;
        Ok(state.users.get(email).cloned())
    }

    async fn register_tenant(
        &self,
        mut tenant: Tenant,
        user: TenantUser,
        welcome_credits: i64,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.users.contains_key(&user.email) {
            return Err(CheckpointError::Conflict("User already exists".into()));
        }

        tenant.credits_balance = 0;
        if welcome_credits != 0 {
            let grant =
                CreditTransaction::new(&tenant.id, welcome_credits, WELCOME_CREDITS_DESCRIPTION);
            tenant.credits_balance = grant.amount;
            state.transactions.push(grant);
        }
        state.tenants.insert(tenant.id.clone(), tenant);
        state.users.insert(user.email.clone(), user);
        Ok(())
    }
}

#[async_trait::async_trait]
impl SessionStore for MemoryStore {
    async fn create_session(&self, session: &Session) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.sessions.contains_key(&session.token) {
            return Err(CheckpointError::Conflict("Session token already exists".into()));
        }
        state.sessions.insert(session.token.clone(), session.clone());
        Ok(())
    }

    async fn session_by_token(&self, token: &str) -> Result<Option<Session>> {
        let state = self.state.lock().await;
        Ok(state.sessions.get(token).cloned())
    }

    async fn update_session(&self, session: &Session) -> Result<()> {
        let mut state = self.state.lock().await;
        match state.sessions.get_mut(&session.token) {
            Some(stored) => {
                *stored = session.clone();
                Ok(())
            }
            None => Err(CheckpointError::NotFound("Session not found".into())),
        }
    }

    async fn update_session_status(&self, token: &str, status: SessionStatus) -> Result<()> {
        let mut state = self.state.lock().await;
        let session = state
            .sessions
            .get_mut(token)
            .ok_or_else(|| CheckpointError::NotFound("Session not found".into()))?;
        session.status = status;
        session.updated_at = Utc::now();
        Ok(())
    }

    async fn list_sessions(
        &self,
        tenant_id: &str,
        search: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Session>> {
        let state = self.state.lock().await;
        let needle = search
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase);

        let mut sessions: Vec<Session> = state
            .sessions
            .values()
            .filter(|s| {
                state
                    .flows
                    .get(&s.flow_id)
                    .is_some_and(|f| f.tenant_id == tenant_id)
            })
            .filter(|s| match &needle {
                Some(needle) => s.user_reference.to_lowercase().contains(needle),
                None => true,
            })
            .cloned()
            .collect();

        sort_for_review(&mut sessions);
        sessions.truncate(limit);
        Ok(sessions)
    }
}

#[async_trait::async_trait]
impl LedgerStore for MemoryStore {
    async fn apply_credit(&self, tx: &CreditTransaction) -> Result<i64> {
        let mut state = self.state.lock().await;
        let tenant = state
            .tenants
            .get_mut(&tx.tenant_id)
            .ok_or_else(|| CheckpointError::NotFound("Tenant not found".into()))?;
        let balance = next_balance(tenant.credits_balance, tx.amount)?;
        tenant.credits_balance = balance;
        tenant.updated_at = Utc::now();
        state.transactions.push(tx.clone());
        Ok(balance)
    }

    async fn recent_transactions(
        &self,
        tenant_id: &str,
        limit: usize,
    ) -> Result<Vec<CreditTransaction>> {
        let state = self.state.lock().await;
        Ok(state
            .transactions
            .iter()
            .rev()
            .filter(|tx| tx.tenant_id == tenant_id)
            .take(limit)
            .cloned()
            .collect())
    }
}
