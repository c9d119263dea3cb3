//! Logging infrastructure for Checkpoint
//!
//! Operational logs go through `tracing`. Security-relevant actions are
//! additionally appended to a JSONL audit trail.

pub mod audit;

pub use audit::{AuditEvent, AuditEventType, AuditLogger};
