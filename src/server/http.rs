//! HTTP server implementation
//!
//! hyper http1 over TokioIo, one task per connection.

use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::auth::JwtValidator;
use crate::config::Args;
use crate::logging::AuditLogger;
use crate::routes::{self, response, BoxBody};
use crate::services::{
    ArtifactUrlIssuer, CreditLedger, FlowCatalog, ReviewGate, SessionEngine, TrustBoundary,
};
use crate::store::Store;
use crate::types::CheckpointError;

/// Shared application state
pub struct AppState {
    pub args: Args,
    /// API key and token checks, registration, login
    pub trust: TrustBoundary,
    pub ledger: CreditLedger,
    /// End-user session lifecycle
    pub sessions: SessionEngine,
    /// Admin review queue and decisions
    pub review: ReviewGate,
    pub flows: FlowCatalog,
    /// "mongodb" or "memory"
    pub store_kind: &'static str,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        args: Args,
        store: Arc<dyn Store>,
        store_kind: &'static str,
        artifacts: Arc<dyn ArtifactUrlIssuer>,
        jwt: JwtValidator,
        audit: AuditLogger,
    ) -> Self {
        let trust = TrustBoundary::new(
            Arc::clone(&store),
            jwt,
            audit.clone(),
            args.welcome_credits,
        );
        let ledger = CreditLedger::new(Arc::clone(&store), audit.clone());
        let sessions = SessionEngine::new(
            Arc::clone(&store),
            Arc::clone(&artifacts),
            &args.frontend_url,
        );
        let review = ReviewGate::new(Arc::clone(&store), artifacts, audit.clone());
        let flows = FlowCatalog::new(store, audit);

        Self {
            args,
            trust,
            ledger,
            sessions,
            review,
            flows,
            store_kind,
            started_at: Instant::now(),
        }
    }
}

/// Bind the configured address and serve until the process exits
pub async fn run(state: Arc<AppState>) -> Result<(), CheckpointError> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!(
        "Checkpoint listening on {} (store: {})",
        state.args.listen, state.store_kind
    );

    if state.args.dev_mode {
        warn!("Development mode enabled - development secrets in use");
    }

    serve(listener, state).await
}

/// Accept loop over an already bound listener
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> Result<(), CheckpointError> {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new()
                        .preserve_header_case(true)
                        .title_case_headers(true)
                        .serve_connection(io, service)
                        .await
                    {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {:?}", e);
            }
        }
    }
}

async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> Result<Response<BoxBody>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    info!("[{}] {} {}", addr, method, path);

    if path.starts_with("/api/v1/sessions") {
        if let Some(response) = routes::handle_session_request(req, Arc::clone(&state)).await {
            return Ok(response);
        }
        return Ok(response::not_found_response(&path));
    }

    if path.starts_with("/admin/") {
        if let Some(response) = routes::handle_admin_request(req, Arc::clone(&state)).await {
            return Ok(response);
        }
        return Ok(response::not_found_response(&path));
    }

    let response = match (method, path.as_str()) {
        (Method::GET, "/health") | (Method::GET, "/healthz") => routes::health_check(state),
        (Method::OPTIONS, _) => response::cors_preflight(),
        _ => response::not_found_response(&path),
    };

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::sessions::tests::FakeIssuer;
    use crate::store::MemoryStore;
    use clap::Parser;
    use serde_json::Value;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    async fn spawn_server() -> SocketAddr {
        let args = Args::try_parse_from(["checkpoint", "--dev-mode"]).unwrap();
        let state = Arc::new(AppState::new(
            args,
            Arc::new(MemoryStore::new()),
            "memory",
            Arc::new(FakeIssuer),
            JwtValidator::new_dev(),
            AuditLogger::new(),
        ));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve(listener, state));
        addr
    }

    /// Send one request over a fresh connection and return (status, json body)
    async fn call(
        addr: SocketAddr,
        method: &str,
        path: &str,
        auth: Option<&str>,
        body: Option<Value>,
    ) -> (u16, Value) {
        let payload = body.map(|b| b.to_string()).unwrap_or_default();
        let mut request = format!(
            "{} {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\nContent-Type: application/json\r\nContent-Length: {}\r\n",
            method,
            path,
            payload.len()
        );
        if let Some(auth) = auth {
            request.push_str(&format!("Authorization: {}\r\n", auth));
        }
        request.push_str("\r\n");
        request.push_str(&payload);

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut raw = Vec::new();
        stream.read_to_end(&mut raw).await.unwrap();
        let raw = String::from_utf8(raw).unwrap();

        let status: u16 = raw
            .split_whitespace()
            .nth(1)
            .and_then(|s| s.parse().ok())
            .unwrap();
        let body = raw
            .split_once("\r\n\r\n")
            .map(|(_, b)| b)
            .unwrap_or_default();
        let json = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(body).unwrap()
        };
        (status, json)
    }

    fn bearer(token: &Value) -> String {
        format!("Bearer {}", token.as_str().unwrap())
    }

    #[tokio::test]
    async fn test_health_and_unknown_path() {
        let addr = spawn_server().await;

        let (status, body) = call(addr, "GET", "/health", None, None).await;
        assert_eq!(status, 200);
        assert_eq!(body["healthy"], true);
        assert_eq!(body["mode"], "development");
        assert_eq!(body["store"], "memory");

        let (status, body) = call(addr, "GET", "/nope", None, None).await;
        assert_eq!(status, 404);
        assert_eq!(body["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_wrong_method_is_405() {
        let addr = spawn_server().await;
        let (status, _) = call(addr, "DELETE", "/admin/credits", None, None).await;
        assert_eq!(status, 405);
    }

    #[tokio::test]
    async fn test_admin_routes_require_token() {
        let addr = spawn_server().await;
        let (status, body) = call(addr, "GET", "/admin/credits", None, None).await;
        assert_eq!(status, 401);
        assert_eq!(body["code"], "UNAUTHENTICATED");
    }

    #[tokio::test]
    async fn test_session_creation_rejects_bad_key() {
        let addr = spawn_server().await;
        let (status, body) = call(
            addr,
            "POST",
            "/api/v1/sessions",
            Some("Bearer nope"),
            Some(serde_json::json!({ "flow_name": "kyc", "user_reference": "u" })),
        )
        .await;
        assert_eq!(status, 401);
        assert_eq!(body["error"], "Invalid API key");
    }

    #[tokio::test]
    async fn test_register_to_submitted_session() {
        let addr = spawn_server().await;

        let (status, body) = call(
            addr,
            "POST",
            "/admin/auth/register",
            None,
            Some(serde_json::json!({
                "email": "Owner@Acme.test",
                "password": "hunter22",
                "company_name": "Acme"
            })),
        )
        .await;
        assert_eq!(status, 201);
        let admin = bearer(&body["token"]);

        let (status, body) = call(
            addr,
            "POST",
            "/admin/auth/login",
            None,
            Some(serde_json::json!({ "email": "owner@acme.test", "password": "hunter22" })),
        )
        .await;
        assert_eq!(status, 200);
        assert!(body["token"].is_string());

        let (status, body) = call(addr, "GET", "/admin/credits", Some(&admin), None).await;
        assert_eq!(status, 200);
        assert_eq!(body["balance"], 10);

        let (status, _) = call(
            addr,
            "POST",
            "/admin/flows",
            Some(&admin),
            Some(serde_json::json!({
                "name": "kyc",
                "steps": [
                    { "step_id": "personal", "type": "form" },
                    { "step_id": "document", "type": "document_capture" }
                ]
            })),
        )
        .await;
        assert_eq!(status, 200);

        let (status, body) = call(addr, "POST", "/admin/api-key/rotate", Some(&admin), None).await;
        assert_eq!(status, 200);
        let api_key = bearer(&body["new_api_key"]);

        let (status, body) = call(
            addr,
            "POST",
            "/api/v1/sessions",
            Some(&api_key),
            Some(serde_json::json!({ "flow_name": "kyc", "user_reference": "user-42" })),
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(body["expires_in"], 900);
        let redirect = body["redirect_url"].as_str().unwrap().to_string();
        let token = redirect.split("token=").nth(1).unwrap().to_string();

        let (status, body) = call(
            addr,
            "GET",
            &format!("/api/v1/sessions?token={}", token),
            None,
            None,
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(body["effective_status"], "PENDING");
        assert_eq!(body["next_step"]["step_id"], "personal");
        assert_eq!(body["tenant"]["name"], "Acme");

        let submit = format!("/api/v1/sessions/submit?token={}", token);
        for _ in 0..2 {
            let (status, _) = call(
                addr,
                "POST",
                &submit,
                None,
                Some(serde_json::json!({ "data": { "first_name": "Ada" } })),
            )
            .await;
            assert_eq!(status, 200);
        }

        let (status, body) = call(addr, "GET", "/admin/sessions", Some(&admin), None).await;
        assert_eq!(status, 200);
        assert_eq!(body[0]["status"], "IN_PROGRESS");
        assert_eq!(body[0]["user_reference"], "user-42");

        let (status, body) = call(
            addr,
            "POST",
            &format!("/admin/sessions/decision?token={}", token),
            Some(&admin),
            Some(serde_json::json!({ "status": "approved" })),
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(body["status"], "APPROVED");
    }
}
