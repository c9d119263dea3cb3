//! Tenant admin routes
//!
//! - POST /admin/auth/register       - Create tenant and first admin, returns token
//! - POST /admin/auth/login          - Exchange credentials for a token
//! - GET  /admin/api-key/status      - Masked key state
//! - POST /admin/api-key/rotate      - New key, shown once
//! - GET  /admin/credits             - Balance and last transactions
//! - POST /admin/credits/add         - Top-up
//! - POST /admin/credits/simulate    - Deduct one credit
//! - GET  /admin/sessions            - Review queue (`search` filters user reference)
//! - GET  /admin/sessions/detail     - Session with artifact links
//! - POST /admin/sessions/decision   - Approve or reject
//! - GET  /admin/flows               - Tenant flows
//! - POST /admin/flows               - Save a flow by name
//!
//! Every route except register and login needs a bearer token.

use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::auth::Principal;
use crate::routes::response::{
    cors_preflight, get_auth_header, json_response, json_response_no_store, method_not_allowed,
    not_found_response, parse_json_body, query_params, respond, token_param, BoxBody,
};
use crate::server::AppState;
use crate::services::{LoginRequest, RegisterRequest, SaveFlowRequest};
use crate::types::CheckpointError;

type RouteResult = Result<Response<BoxBody>, CheckpointError>;

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct RotateKeyResponse {
    pub new_api_key: String,
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub balance: i64,
}

#[derive(Debug, Deserialize)]
pub struct AddCreditsRequest {
    pub amount: i64,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct DecisionRequest {
    pub status: String,
    #[serde(default)]
    pub reason: Option<String>,
}

fn principal(req: &Request<Incoming>, state: &AppState) -> Result<Principal, CheckpointError> {
    state.trust.verify(get_auth_header(req))
}

async fn handle_register(req: Request<Incoming>, state: Arc<AppState>) -> RouteResult {
    let body: RegisterRequest = parse_json_body(req).await?;
    let token = state.trust.register(body).await?;
    Ok(json_response(StatusCode::CREATED, &TokenResponse { token }))
}

async fn handle_login(req: Request<Incoming>, state: Arc<AppState>) -> RouteResult {
    let body: LoginRequest = parse_json_body(req).await?;
    let token = state.trust.login(body).await?;
    Ok(json_response(StatusCode::OK, &TokenResponse { token }))
}

async fn handle_key_status(req: Request<Incoming>, state: Arc<AppState>) -> RouteResult {
    let principal = principal(&req, &state)?;
    let status = state.trust.key_status(&principal).await?;
    Ok(json_response(StatusCode::OK, &status))
}

async fn handle_rotate_key(req: Request<Incoming>, state: Arc<AppState>) -> RouteResult {
    let principal = principal(&req, &state)?;
    let new_api_key = state.trust.rotate_key(&principal).await?;
    Ok(json_response_no_store(
        StatusCode::OK,
        &RotateKeyResponse { new_api_key },
    ))
}

async fn handle_credits(req: Request<Incoming>, state: Arc<AppState>) -> RouteResult {
    let principal = principal(&req, &state)?;
    let view = state.ledger.credits_view(&principal).await?;
    Ok(json_response_no_store(StatusCode::OK, &view))
}

async fn handle_add_credits(req: Request<Incoming>, state: Arc<AppState>) -> RouteResult {
    let principal = principal(&req, &state)?;
    let body: AddCreditsRequest = parse_json_body(req).await?;
    let balance = state
        .ledger
        .add_credits(&principal, body.amount, &body.description)
        .await?;
    Ok(json_response_no_store(StatusCode::OK, &BalanceResponse { balance }))
}

async fn handle_simulate_usage(req: Request<Incoming>, state: Arc<AppState>) -> RouteResult {
    let principal = principal(&req, &state)?;
    let balance = state.ledger.simulate_usage(&principal).await?;
    Ok(json_response_no_store(StatusCode::OK, &BalanceResponse { balance }))
}

async fn handle_list_sessions(req: Request<Incoming>, state: Arc<AppState>) -> RouteResult {
    let principal = principal(&req, &state)?;
    let search = query_params(&req).remove("search");
    let sessions = state.review.list(&principal, search.as_deref()).await?;
    Ok(json_response(StatusCode::OK, &sessions))
}

async fn handle_review(req: Request<Incoming>, state: Arc<AppState>) -> RouteResult {
    let principal = principal(&req, &state)?;
    let token = token_param(&req)?;
    let view = state.review.review(&principal, &token).await?;
    Ok(json_response(StatusCode::OK, &view))
}

async fn handle_decision(req: Request<Incoming>, state: Arc<AppState>) -> RouteResult {
    let principal = principal(&req, &state)?;
    let token = token_param(&req)?;
    let body: DecisionRequest = parse_json_body(req).await?;
    let decision = state
        .review
        .decide(&principal, &token, &body.status, body.reason.as_deref())
        .await?;
    Ok(json_response(StatusCode::OK, &decision))
}

async fn handle_list_flows(req: Request<Incoming>, state: Arc<AppState>) -> RouteResult {
    let principal = principal(&req, &state)?;
    let flows = state.flows.list(&principal).await?;
    Ok(json_response(StatusCode::OK, &flows))
}

async fn handle_save_flow(req: Request<Incoming>, state: Arc<AppState>) -> RouteResult {
    let principal = principal(&req, &state)?;
    let body: SaveFlowRequest = parse_json_body(req).await?;
    let flow = state.flows.save(&principal, body).await?;
    Ok(json_response(StatusCode::OK, &flow))
}

/// Route /admin/* requests. Returns None for other paths.
pub async fn handle_admin_request(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Option<Response<BoxBody>> {
    let path = req.uri().path().to_string();
    if !path.starts_with("/admin/") {
        return None;
    }

    if req.method() == Method::OPTIONS {
        return Some(cors_preflight());
    }

    let response = match (req.method().clone(), path.as_str()) {
        (Method::POST, "/admin/auth/register") => respond(handle_register(req, state).await),
        (Method::POST, "/admin/auth/login") => respond(handle_login(req, state).await),
        (Method::GET, "/admin/api-key/status") => respond(handle_key_status(req, state).await),
        (Method::POST, "/admin/api-key/rotate") => respond(handle_rotate_key(req, state).await),
        (Method::GET, "/admin/credits") => respond(handle_credits(req, state).await),
        (Method::POST, "/admin/credits/add") => respond(handle_add_credits(req, state).await),
        (Method::POST, "/admin/credits/simulate") => {
            respond(handle_simulate_usage(req, state).await)
        }
        (Method::GET, "/admin/sessions") => respond(handle_list_sessions(req, state).await),
        (Method::GET, "/admin/sessions/detail") => respond(handle_review(req, state).await),
        (Method::POST, "/admin/sessions/decision") => respond(handle_decision(req, state).await),
        (Method::GET, "/admin/flows") => respond(handle_list_flows(req, state).await),
        (Method::POST, "/admin/flows") => respond(handle_save_flow(req, state).await),

        (_, "/admin/auth/register")
        | (_, "/admin/auth/login")
        | (_, "/admin/api-key/status")
        | (_, "/admin/api-key/rotate")
        | (_, "/admin/credits")
        | (_, "/admin/credits/add")
        | (_, "/admin/credits/simulate")
        | (_, "/admin/sessions")
        | (_, "/admin/sessions/detail")
        | (_, "/admin/sessions/decision")
        | (_, "/admin/flows") => method_not_allowed(),

        _ => not_found_response(&path),
    };

    Some(response)
}
