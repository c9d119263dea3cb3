//! Core services
//!
//! Each service holds the store and the collaborators it needs and enforces
//! its own authorization from the `Principal` it is handed.

pub mod artifacts;
pub mod flows;
pub mod ledger;
pub mod review;
pub mod sessions;
pub mod trust;

pub use artifacts::{ArtifactUrlIssuer, S3Presigner, StorageConfig, UploadTicket};
pub use flows::{FlowCatalog, SaveFlowRequest};
pub use ledger::{CreditLedger, CreditsView};
pub use review::{Decision, ReviewGate, ReviewView};
pub use sessions::{InitSessionRequest, InitSessionResponse, SessionEngine, SessionView};
pub use trust::{LoginRequest, RegisterRequest, TrustBoundary};
