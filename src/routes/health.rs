//! Liveness check
//!
//! - /health, /healthz - 200 while the process is serving

use hyper::{Response, StatusCode};
use serde::Serialize;
use std::sync::Arc;

use crate::routes::response::{json_response, BoxBody};
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub version: &'static str,
    /// Uptime in seconds
    pub uptime: u64,
    /// "development" or "production"
    pub mode: &'static str,
    /// Backing store: "mongodb" or "memory"
    pub store: &'static str,
    pub timestamp: String,
}

pub fn health_check(state: Arc<AppState>) -> Response<BoxBody> {
    let body = HealthResponse {
        healthy: true,
        version: env!("CARGO_PKG_VERSION"),
        uptime: state.started_at.elapsed().as_secs(),
        mode: if state.args.dev_mode {
            "development"
        } else {
            "production"
        },
        store: state.store_kind,
        timestamp: chrono::Utc::now().to_rfc3339(),
    };
    json_response(StatusCode::OK, &body)
}
