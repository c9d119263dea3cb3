//! MongoDB-backed store
//!
//! Collection handles are built once at startup. Ledger applications and
//! registrations run inside multi-document transactions, which need a
//! replica set deployment.

use bson::{doc, Bson, Document};
use chrono::Utc;
use mongodb::ClientSession;
use tracing::{debug, warn};

use super::{
    CredentialStore, FlowStore, LedgerStore, SessionStore, WELCOME_CREDITS_DESCRIPTION,
};
use crate::db::schemas::{
    CreditTransactionDoc, FlowDoc, SessionDoc, TenantDoc, TenantUserDoc,
    CREDIT_TRANSACTION_COLLECTION, FLOW_COLLECTION, SESSION_COLLECTION, TENANT_COLLECTION,
    TENANT_USER_COLLECTION,
};
use crate::db::{MongoClient, MongoCollection};
use crate::domain::{
    next_balance, step_order_locked, CreditTransaction, Flow, Session, SessionStatus, Tenant,
    TenantUser,
};
use crate::types::{CheckpointError, Result};

pub struct MongoStore {
    client: MongoClient,
    tenants: MongoCollection<TenantDoc>,
    users: MongoCollection<TenantUserDoc>,
    flows: MongoCollection<FlowDoc>,
    sessions: MongoCollection<SessionDoc>,
    transactions: MongoCollection<CreditTransactionDoc>,
}

impl MongoStore {
    /// Open every collection and apply its indexes
    pub async fn new(client: MongoClient) -> Result<Self> {
        Ok(Self {
            tenants: client.collection(TENANT_COLLECTION).await?,
            users: client.collection(TENANT_USER_COLLECTION).await?,
            flows: client.collection(FLOW_COLLECTION).await?,
            sessions: client.collection(SESSION_COLLECTION).await?,
            transactions: client.collection(CREDIT_TRANSACTION_COLLECTION).await?,
            client,
        })
    }

    /// Commit when `outcome` is Ok, abort otherwise
    async fn finish_transaction<T>(
        session: &mut ClientSession,
        outcome: Result<T>,
    ) -> Result<T> {
        match outcome {
            Ok(value) => {
                session.commit_transaction().await?;
                Ok(value)
            }
            Err(e) => {
                if let Err(abort_err) = session.abort_transaction().await {
                    warn!(error = %abort_err, "Failed to abort transaction");
                }
                Err(e)
            }
        }
    }

    async fn apply_credit_in(
        &self,
        tx: &CreditTransaction,
        session: &mut ClientSession,
    ) -> Result<i64> {
        let tenant = self
            .tenants
            .inner()
            .find_one(doc! { "_id": &tx.tenant_id })
            .session(&mut *session)
            .await?
            .ok_or_else(|| CheckpointError::NotFound("Tenant not found".into()))?;
        let balance = next_balance(tenant.credits_balance, tx.amount)?;
        let seq = tenant.ledger_seq + 1;

        // A concurrent apply on the same tenant aborts this transaction with a
        // write conflict, so the values read above are the ones updated here.
        let result = self
            .tenants
            .update_one_in(
                doc! { "_id": &tx.tenant_id },
                doc! {
                    "$inc": { "credits_balance": tx.amount, "ledger_seq": 1_i64 },
                    "$set": { "metadata.updated_at": bson::DateTime::now() },
                },
                session,
            )
            .await?;

        if result.matched_count == 0 {
            return Err(CheckpointError::NotFound("Tenant not found".into()));
        }

        self.transactions
            .insert_one_in(CreditTransactionDoc::from(tx).with_seq(seq), session)
            .await?;

        Ok(balance)
    }

    async fn register_in(
        &self,
        tenant: Tenant,
        user: TenantUser,
        welcome_credits: i64,
        session: &mut ClientSession,
    ) -> Result<()> {
        let mut tenant_doc = TenantDoc::from(&tenant);
        tenant_doc.credits_balance = 0;

        self.tenants.insert_one_in(tenant_doc, session).await?;
        self.users
            .insert_one_in(TenantUserDoc::from(&user), session)
            .await?;

        if welcome_credits != 0 {
            let grant =
                CreditTransaction::new(&tenant.id, welcome_credits, WELCOME_CREDITS_DESCRIPTION);
            self.apply_credit_in(&grant, session).await?;
        }
        Ok(())
    }
}

/// Escape regex metacharacters so a search term matches literally
fn escape_regex(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if "\\^$.|?*+()[]{}".contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Ledger rows newest first. `seq` is assigned inside the ledger transaction
/// and is strictly increasing per tenant, so rows in the same millisecond
/// still have a defined order.
fn ledger_newest_first() -> Document {
    doc! { "seq": -1, "created_at": -1 }
}

/// Aggregation stages that order sessions for reviewers
fn review_order_stages(limit: usize) -> Vec<Document> {
    vec![
        doc! {
            "$addFields": {
                "review_tier": {
                    "$switch": {
                        "branches": [
                            { "case": { "$eq": ["$status", SessionStatus::InProgress.as_str()] }, "then": 0 },
                            { "case": { "$eq": ["$status", SessionStatus::Pending.as_str()] }, "then": 1 },
                        ],
                        "default": 2,
                    }
                }
            }
        },
        doc! { "$sort": { "review_tier": 1, "metadata.created_at": -1, "_id": 1 } },
        doc! { "$limit": i64::try_from(limit).unwrap_or(i64::MAX) },
        doc! { "$project": { "review_tier": 0 } },
    ]
}

#[async_trait::async_trait]
impl FlowStore for MongoStore {
    async fn flow_by_name(&self, tenant_id: &str, name: &str) -> Result<Option<Flow>> {
        let doc = self
            .flows
            .find_one(doc! { "tenant_id": tenant_id, "name": name })
            .await?;
        Ok(doc.map(Flow::from))
    }

    async fn flow_by_id(&self, flow_id: &str) -> Result<Option<Flow>> {
        let doc = self.flows.find_one(doc! { "_id": flow_id }).await?;
        Ok(doc.map(Flow::from))
    }

    async fn flows_for_tenant(&self, tenant_id: &str) -> Result<Vec<Flow>> {
        let docs = self
            .flows
            .find_many(
                doc! { "tenant_id": tenant_id },
                Some(doc! { "metadata.created_at": -1 }),
                None,
            )
            .await?;
        Ok(docs.into_iter().map(Flow::from).collect())
    }

    async fn save_flow(&self, flow: Flow) -> Result<Flow> {
        if let Some(current) = self.flow_by_name(&flow.tenant_id, &flow.name).await? {
            if !current.same_step_order(&flow.steps) {
                let referenced = self
                    .sessions
                    .inner()
                    .find_one(doc! { "flow_id": &current.id })
                    .await?
                    .is_some();
                if referenced {
                    return Err(step_order_locked(&flow.name));
                }
            }
        }

        let steps = bson::to_bson(&flow.steps)?;
        let result = self
            .flows
            .update_one(
                doc! { "tenant_id": &flow.tenant_id, "name": &flow.name },
                doc! {
                    "$set": {
                        "description": &flow.description,
                        "steps_configuration": steps,
                        "metadata.updated_at": bson::DateTime::from_chrono(flow.updated_at),
                    }
                },
            )
            .await?;

        if result.matched_count == 0 {
            match self.flows.insert_one(FlowDoc::from(&flow)).await {
                Ok(()) => {}
                // Another save of the same name inserted first; its row is returned
                Err(CheckpointError::Conflict(_)) => {
                    debug!(flow = %flow.name, "Concurrent flow insert");
                }
                Err(e) => return Err(e),
            }
        }

        self.flow_by_name(&flow.tenant_id, &flow.name)
            .await?
            .ok_or_else(|| CheckpointError::Internal("Saved flow not readable".into()))
    }
}

#[async_trait::async_trait]
impl CredentialStore for MongoStore {
    async fn tenant_by_key_digest(&self, digest: &str) -> Result<Option<Tenant>> {
        let doc = self
            .tenants
            .find_one(doc! { "api_key_hash": digest })
            .await?;
        Ok(doc.map(Tenant::from))
    }

    async fn tenant_by_id(&self, tenant_id: &str) -> Result<Option<Tenant>> {
        let doc = self.tenants.find_one(doc! { "_id": tenant_id }).await?;
        Ok(doc.map(Tenant::from))
    }

    async fn update_key_digest(&self, tenant_id: &str, digest: &str, last4: &str) -> Result<()> {
        let result = self
            .tenants
            .update_one(
                doc! { "_id": tenant_id },
                doc! {
                    "$set": {
                        "api_key_hash": digest,
                        "api_key_last_4": last4,
                        "metadata.updated_at": bson::DateTime::now(),
                    }
                },
            )
            .await?;

        if result.matched_count == 0 {
            return Err(CheckpointError::NotFound("Tenant not found".into()));
        }
        Ok(())
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<TenantUser>> {
        let doc = self.users.find_one(doc! { "email": email }).await?;
        Ok(doc.map(TenantUser::from))
    }

    async fn register_tenant(
        &self,
        tenant: Tenant,
        user: TenantUser,
        welcome_credits: i64,
    ) -> Result<()> {
        if self.user_by_email(&user.email).await?.is_some() {
            return Err(CheckpointError::Conflict("User already exists".into()));
        }

        let mut session = self.client.start_transaction().await?;
        let outcome = self
            .register_in(tenant, user, welcome_credits, &mut session)
            .await;
        Self::finish_transaction(&mut session, outcome)
            .await
            .map_err(|e| match e {
                // The unique email index catches a registration that raced the check above
                CheckpointError::Conflict(_) => {
                    CheckpointError::Conflict("User already exists".into())
                }
                other => other,
            })
    }
}

#[async_trait::async_trait]
impl SessionStore for MongoStore {
    async fn create_session(&self, session: &Session) -> Result<()> {
        self.sessions
            .insert_one(SessionDoc::from(session))
            .await
            .map_err(|e| match e {
                CheckpointError::Conflict(_) => {
                    CheckpointError::Conflict("Session token already exists".into())
                }
                other => other,
            })
    }

    async fn session_by_token(&self, token: &str) -> Result<Option<Session>> {
        let doc = self.sessions.find_one(doc! { "_id": token }).await?;
        Ok(doc.map(Session::from))
    }

    async fn update_session(&self, session: &Session) -> Result<()> {
        let doc = SessionDoc::from(session);
        let collected = bson::to_bson(&doc.collected_data)?;
        let status = bson::to_bson(&doc.status)?;
        let result = self
            .sessions
            .update_one(
                doc! { "_id": &doc._id },
                doc! {
                    "$set": {
                        "collected_data": collected,
                        "current_step_index": doc.current_step_index,
                        "status": status,
                        "metadata.updated_at": bson::DateTime::from_chrono(session.updated_at),
                    }
                },
            )
            .await?;

        if result.matched_count == 0 {
            return Err(CheckpointError::NotFound("Session not found".into()));
        }
        Ok(())
    }

    async fn update_session_status(&self, token: &str, status: SessionStatus) -> Result<()> {
        let result = self
            .sessions
            .update_one(
                doc! { "_id": token },
                doc! {
                    "$set": {
                        "status": status.as_str(),
                        "metadata.updated_at": bson::DateTime::from_chrono(Utc::now()),
                    }
                },
            )
            .await?;

        if result.matched_count == 0 {
            return Err(CheckpointError::NotFound("Session not found".into()));
        }
        Ok(())
    }

    async fn list_sessions(
        &self,
        tenant_id: &str,
        search: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Session>> {
        let flow_ids: Vec<Bson> = self
            .flows_for_tenant(tenant_id)
            .await?
            .into_iter()
            .map(|f| Bson::String(f.id))
            .collect();

        if flow_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut filter = doc! { "flow_id": { "$in": flow_ids } };
        if let Some(term) = search.map(str::trim).filter(|s| !s.is_empty()) {
            filter.insert(
                "user_reference",
                doc! { "$regex": escape_regex(term), "$options": "i" },
            );
        }

        let mut pipeline = vec![doc! { "$match": filter }];
        pipeline.extend(review_order_stages(limit));

        let docs = self.sessions.aggregate(pipeline).await?;
        Ok(docs.into_iter().map(Session::from).collect())
    }
}

#[async_trait::async_trait]
impl LedgerStore for MongoStore {
    async fn apply_credit(&self, tx: &CreditTransaction) -> Result<i64> {
        let mut session = self.client.start_transaction().await?;
        let outcome = self.apply_credit_in(tx, &mut session).await;
        Self::finish_transaction(&mut session, outcome).await
    }

    async fn recent_transactions(
        &self,
        tenant_id: &str,
        limit: usize,
    ) -> Result<Vec<CreditTransaction>> {
        let docs = self
            .transactions
            .find_many(
                doc! { "tenant_id": tenant_id },
                Some(ledger_newest_first()),
                Some(i64::try_from(limit).unwrap_or(i64::MAX)),
            )
            .await?;
        Ok(docs.into_iter().map(CreditTransaction::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_regex_literal_match() {
        assert_eq!(escape_regex("a.b"), "a\\.b");
        assert_eq!(escape_regex("user+1(x)"), "user\\+1\\(x\\)");
        assert_eq!(escape_regex("plain"), "plain");
    }

    #[test]
    fn test_ledger_sort_breaks_ties_by_sequence() {
        let sort = ledger_newest_first();
        let keys: Vec<&str> = sort.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["seq", "created_at"]);
        assert_eq!(sort.get_i32("seq").unwrap(), -1);
    }

    #[test]
    fn test_review_order_stages_limit_and_tiers() {
        let stages = review_order_stages(50);
        assert_eq!(stages.len(), 4);
        assert_eq!(stages[2].get_i64("$limit").unwrap(), 50);
        let sort = stages[1].get_document("$sort").unwrap();
        assert_eq!(sort.get_i32("review_tier").unwrap(), 1);
        assert_eq!(sort.get_i32("metadata.created_at").unwrap(), -1);
    }
}
