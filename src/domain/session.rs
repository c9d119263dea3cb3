//! Session state machine
//!
//! ```text
//! PENDING --(index reaches step count)--> IN_PROGRESS --(decide)--> APPROVED | REJECTED
//! ```
//!
//! `EXPIRED` is never stored. It is the view of a `PENDING` session whose
//! `expires_at` has passed, evaluated wherever the session is read.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::domain::{CollectedData, Flow, StepDescriptor};
use crate::types::CheckpointError;

/// Lifetime of a freshly initialized session
pub const SESSION_TTL_SECONDS: i64 = 15 * 60;

/// Conventional collected-data fields that hold object storage keys
pub const ARTIFACT_FIELDS: &[&str] = &["document_front", "document_back", "selfie"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Pending,
    /// All steps collected, awaiting a review decision
    InProgress,
    Approved,
    Rejected,
    Expired,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Pending => "PENDING",
            SessionStatus::InProgress => "IN_PROGRESS",
            SessionStatus::Approved => "APPROVED",
            SessionStatus::Rejected => "REJECTED",
            SessionStatus::Expired => "EXPIRED",
        }
    }

    /// Listing tier: sessions awaiting review, then pending, then the rest
    pub fn review_tier(&self) -> u8 {
        match self {
            SessionStatus::InProgress => 0,
            SessionStatus::Pending => 1,
            _ => 2,
        }
    }

    /// Parse a reviewer decision. Only approved/rejected, in any case.
    pub fn parse_decision(requested: &str) -> Result<Self, CheckpointError> {
        match requested.trim().to_uppercase().as_str() {
            "APPROVED" => Ok(SessionStatus::Approved),
            "REJECTED" => Ok(SessionStatus::Rejected),
            _ => Err(CheckpointError::InvalidArgument(format!(
                "Invalid status '{}': expected approved or rejected",
                requested
            ))),
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One verification attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Public bearer identifier
    pub token: String,
    pub flow_id: String,
    pub user_reference: String,
    pub current_step_index: u32,
    pub status: SessionStatus,
    #[serde(default)]
    pub collected_data: CollectedData,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(token: String, flow_id: String, user_reference: String, now: DateTime<Utc>) -> Self {
        Self {
            token,
            flow_id,
            user_reference,
            current_step_index: 0,
            status: SessionStatus::Pending,
            collected_data: CollectedData::new(),
            expires_at: now + Duration::seconds(SESSION_TTL_SECONDS),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Status as seen by a reader at `now`
    pub fn effective_status(&self, now: DateTime<Utc>) -> SessionStatus {
        if self.status == SessionStatus::Pending && self.is_expired_at(now) {
            SessionStatus::Expired
        } else {
            self.status
        }
    }

    /// Record one step submission.
    ///
    /// Fields are merged over earlier ones and the index advances by exactly
    /// one. A pending session whose index reaches `step_count` moves to
    /// `IN_PROGRESS`; no other status is touched.
    pub fn apply_submission(&mut self, fields: CollectedData, step_count: usize, now: DateTime<Utc>) {
        self.collected_data.extend(fields);
        self.current_step_index = self.current_step_index.saturating_add(1);

        if self.status == SessionStatus::Pending && self.current_step_index as usize >= step_count {
            self.status = SessionStatus::InProgress;
        }
        self.updated_at = now;
    }

    /// Descriptor of the step the client should render next
    pub fn next_step<'a>(&self, flow: &'a Flow) -> Option<&'a StepDescriptor> {
        flow.step_at(self.current_step_index)
    }

    /// Non-empty object keys stored under the conventional artifact fields
    pub fn artifact_keys(&self) -> Vec<(&'static str, &str)> {
        ARTIFACT_FIELDS
            .iter()
            .filter_map(|field| {
                self.collected_data
                    .get(*field)
                    .and_then(|value| value.as_text())
                    .filter(|key| !key.is_empty())
                    .map(|key| (*field, key))
            })
            .collect()
    }
}

fn review_order(a: &Session, b: &Session) -> Ordering {
    a.status
        .review_tier()
        .cmp(&b.status.review_tier())
        .then_with(|| b.created_at.cmp(&a.created_at))
}

/// Sort for reviewers: awaiting review, then pending, then everything else,
/// newest first inside each tier. The sort is stable, so ties keep their order.
pub fn sort_for_review(sessions: &mut [Session]) {
    sessions.sort_by(review_order);
}
