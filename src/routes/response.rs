//! Response and request helpers shared by all routes

use bytes::Bytes;
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use tracing::error;

use crate::types::CheckpointError;

pub type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

/// Largest accepted JSON body
pub const MAX_BODY_BYTES: usize = 64 * 1024;

const ALLOWED_METHODS: &str = "GET, POST, OPTIONS";
const ALLOWED_HEADERS: &str = "Content-Type, Authorization";

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
}

pub fn full_body(data: impl Into<Bytes>) -> BoxBody {
    Full::new(data.into())
        .map_err(|never| match never {})
        .boxed()
}

pub fn empty_body() -> BoxBody {
    Full::new(Bytes::new())
        .map_err(|never| match never {})
        .boxed()
}

fn fallback(status: StatusCode) -> Response<BoxBody> {
    let mut response = Response::new(empty_body());
    *response.status_mut() = status;
    response
}

pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<BoxBody> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());

    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Methods", ALLOWED_METHODS)
        .header("Access-Control-Allow-Headers", ALLOWED_HEADERS)
        .body(full_body(json))
        .unwrap_or_else(|_| fallback(StatusCode::INTERNAL_SERVER_ERROR))
}

/// JSON response that intermediaries and browsers must not cache
pub fn json_response_no_store<T: Serialize>(status: StatusCode, body: &T) -> Response<BoxBody> {
    let mut response = json_response(status, body);
    let headers = response.headers_mut();
    headers.insert(
        hyper::header::CACHE_CONTROL,
        hyper::header::HeaderValue::from_static("no-store, no-cache, must-revalidate, proxy-revalidate"),
    );
    headers.insert(
        hyper::header::PRAGMA,
        hyper::header::HeaderValue::from_static("no-cache"),
    );
    headers.insert(
        hyper::header::EXPIRES,
        hyper::header::HeaderValue::from_static("0"),
    );
    response
}

/// Map an error kind to its status. Internal details are logged, never sent.
pub fn error_response(err: CheckpointError) -> Response<BoxBody> {
    if err.is_internal() {
        error!(error = %err, "Request failed");
    }
    let status = err.status_code();
    let code = err.code();
    json_response(
        status,
        &ErrorResponse {
            error: err.public_message(),
            code,
        },
    )
}

/// Collapse a handler result into a response
pub fn respond(result: Result<Response<BoxBody>, CheckpointError>) -> Response<BoxBody> {
    result.unwrap_or_else(error_response)
}

pub fn cors_preflight() -> Response<BoxBody> {
    Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Methods", ALLOWED_METHODS)
        .header("Access-Control-Allow-Headers", ALLOWED_HEADERS)
        .header("Access-Control-Max-Age", "86400")
        .body(empty_body())
        .unwrap_or_else(|_| fallback(StatusCode::NO_CONTENT))
}

pub fn not_found_response(path: &str) -> Response<BoxBody> {
    json_response(
        StatusCode::NOT_FOUND,
        &ErrorResponse {
            error: format!("No route for {}", path),
            code: "NOT_FOUND",
        },
    )
}

pub fn method_not_allowed() -> Response<BoxBody> {
    json_response(
        StatusCode::METHOD_NOT_ALLOWED,
        &ErrorResponse {
            error: "Method not allowed".into(),
            code: "METHOD_NOT_ALLOWED",
        },
    )
}

/// Read and decode a JSON body, capped at `MAX_BODY_BYTES`
pub async fn parse_json_body<T: DeserializeOwned>(
    req: Request<Incoming>,
) -> Result<T, CheckpointError> {
    let body = Limited::new(req.into_body(), MAX_BODY_BYTES)
        .collect()
        .await
        .map_err(|e| CheckpointError::InvalidArgument(format!("Failed to read body: {}", e)))?;

    decode_json(&body.to_bytes())
}

/// Decode JSON bytes, treating an empty body as invalid
pub fn decode_json<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CheckpointError> {
    if bytes.is_empty() {
        return Err(CheckpointError::InvalidArgument("Request body is required".into()));
    }
    serde_json::from_slice(bytes)
        .map_err(|e| CheckpointError::InvalidArgument(format!("Invalid JSON: {}", e)))
}

pub fn get_auth_header<B>(req: &Request<B>) -> Option<&str> {
    req.headers()
        .get(hyper::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
}

/// Decoded query string parameters
pub fn query_params<B>(req: &Request<B>) -> HashMap<String, String> {
    req.uri()
        .query()
        .and_then(|q| serde_urlencoded::from_str::<HashMap<String, String>>(q).ok())
        .unwrap_or_default()
}

/// Required `token` query parameter
pub fn token_param<B>(req: &Request<B>) -> Result<String, CheckpointError> {
    query_params(req)
        .remove("token")
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| CheckpointError::InvalidArgument("Missing token".into()))
}
