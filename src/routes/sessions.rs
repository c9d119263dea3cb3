//! End-user session routes
//!
//! - POST /api/v1/sessions            - Create a session (tenant API key)
//! - GET  /api/v1/sessions?token=     - Current state and next step
//! - POST /api/v1/sessions/submit     - Submit one step's fields
//! - POST /api/v1/sessions/upload-url - Presigned artifact upload URL
//!
//! Everything but creation is authorized by the session token alone.

use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use serde::Deserialize;
use std::sync::Arc;

use crate::domain::CollectedData;
use crate::routes::response::{
    cors_preflight, get_auth_header, json_response, method_not_allowed, not_found_response,
    parse_json_body, respond, token_param, BoxBody,
};
use crate::server::AppState;
use crate::services::InitSessionRequest;
use crate::types::CheckpointError;

#[derive(Debug, Deserialize)]
pub struct SubmitStepRequest {
    #[serde(default)]
    pub data: CollectedData,
}

#[derive(Debug, Deserialize)]
pub struct UploadUrlRequest {
    pub filename: String,
    /// Accepted for client compatibility; the URL does not pin a content type
    #[serde(default)]
    #[allow(dead_code)]
    pub content_type: Option<String>,
}

async fn handle_create(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Result<Response<BoxBody>, CheckpointError> {
    let auth = get_auth_header(&req).map(str::to_owned);
    let tenant = state.trust.resolve_api_key(auth.as_deref()).await?;
    let body: InitSessionRequest = parse_json_body(req).await?;
    let created = state.sessions.initialize(&tenant, body).await?;
    Ok(json_response(StatusCode::OK, &created))
}

async fn handle_get(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Result<Response<BoxBody>, CheckpointError> {
    let token = token_param(&req)?;
    let view = state.sessions.get(&token).await?;
    Ok(json_response(StatusCode::OK, &view))
}

async fn handle_submit(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Result<Response<BoxBody>, CheckpointError> {
    let token = token_param(&req)?;
    let body: SubmitStepRequest = parse_json_body(req).await?;
    let view = state.sessions.submit_step(&token, body.data).await?;
    Ok(json_response(StatusCode::OK, &view))
}

async fn handle_upload_url(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Result<Response<BoxBody>, CheckpointError> {
    let token = token_param(&req)?;
    let body: UploadUrlRequest = parse_json_body(req).await?;
    let ticket = state.sessions.upload_url(&token, &body.filename).await?;
    Ok(json_response(StatusCode::OK, &ticket))
}

/// Route /api/v1/sessions* requests. Returns None for other paths.
pub async fn handle_session_request(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Option<Response<BoxBody>> {
    let path = req.uri().path().to_string();
    if !path.starts_with("/api/v1/sessions") {
        return None;
    }

    if req.method() == Method::OPTIONS {
        return Some(cors_preflight());
    }

    let response = match (req.method().clone(), path.as_str()) {
        (Method::POST, "/api/v1/sessions") => respond(handle_create(req, state).await),
        (Method::GET, "/api/v1/sessions") => respond(handle_get(req, state).await),
        (Method::POST, "/api/v1/sessions/submit") => respond(handle_submit(req, state).await),
        (Method::POST, "/api/v1/sessions/upload-url") => {
            respond(handle_upload_url(req, state).await)
        }
        (_, "/api/v1/sessions")
        | (_, "/api/v1/sessions/submit")
        | (_, "/api/v1/sessions/upload-url") => method_not_allowed(),
        _ => not_found_response(&path),
    };

    Some(response)
}
