//! Domain model for verification sessions
//!
//! These are the values that flow between the trust boundary, the session
//! state machine and the ledger. Storage documents live in `crate::db::schemas`
//! and convert to and from these types.

mod credit;
mod field;
mod flow;
mod session;
mod tenant;

pub use credit::{next_balance, CreditTransaction};
pub use field::{CollectedData, FieldValue};
pub use flow::{step_order_locked, Flow, StepDescriptor};
pub use session::{
    sort_for_review, Session, SessionStatus, ARTIFACT_FIELDS, SESSION_TTL_SECONDS,
};
pub use tenant::{Branding, Tenant, TenantUser};
