//! MongoDB document schemas

pub mod credit;
pub mod flow;
pub mod metadata;
pub mod session;
pub mod tenant;
pub mod user;

pub use credit::{CreditTransactionDoc, CREDIT_TRANSACTION_COLLECTION};
pub use flow::{FlowDoc, FLOW_COLLECTION};
pub use metadata::Metadata;
pub use session::{SessionDoc, SESSION_COLLECTION};
pub use tenant::{TenantDoc, TENANT_COLLECTION};
pub use user::{TenantUserDoc, TENANT_USER_COLLECTION};
