//! Checkpoint - multi-tenant identity verification sessions
//!
//! Tenants create short-lived verification sessions with an API key, end
//! users walk them step by step, and tenant admins review and decide them.
//!
//! ## Services
//!
//! - **Trust**: API key resolution, admin tokens, registration and login
//! - **Sessions**: Session creation, step submission, artifact upload URLs
//! - **Review**: Review queue, signed artifact links, decisions
//! - **Ledger**: Atomic credit balance with transaction history
//! - **Flows**: Named step sequences per tenant

pub mod auth;
pub mod config;
pub mod db;
pub mod domain;
pub mod logging;
pub mod routes;
pub mod server;
pub mod services;
pub mod store;
pub mod types;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{CheckpointError, Result};
