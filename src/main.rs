//! Checkpoint - identity verification session service

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use checkpoint::{
    auth::JwtValidator,
    config::Args,
    db::MongoClient,
    logging::AuditLogger,
    server::{self, AppState},
    services::S3Presigner,
    store::{MemoryStore, MongoStore, Store},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let log_level = args.log_level.clone();
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("checkpoint={},info", log_level).into());
    if args.json_logs() {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  Checkpoint - Identity Verification");
    info!("======================================");
    info!("Listen: {}", args.listen);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!("MongoDB: {}", args.mongodb_target());
    info!("Storage: {}/{}", args.storage.storage_endpoint, args.storage.storage_bucket);
    info!("Frontend: {}", args.frontend_url);
    info!("======================================");

    let jwt = match args.jwt_secret()? {
        Some(secret) => JwtValidator::new(secret, args.jwt_expiry_seconds)?,
        None => {
            warn!("No JWT secret configured, using development secret");
            JwtValidator::new_dev()
        }
    };

    let audit = AuditLogger::new();
    if let Some(path) = &args.audit_log_path {
        match audit.init_file(path.clone()).await {
            Ok(()) => info!("Audit log: {}", path.display()),
            Err(e) => {
                error!("Failed to open audit log {}: {}", path.display(), e);
                std::process::exit(1);
            }
        }
    }

    let (store, store_kind): (Arc<dyn Store>, &'static str) = match MongoClient::connect_with_retry(
        &args.mongodb_uri,
        &args.mongodb_db,
        args.db_connect_retries,
        args.db_retry_backoff(),
    )
    .await
    {
        Ok(client) => {
            info!("MongoDB connected successfully");
            (Arc::new(MongoStore::new(client).await?), "mongodb")
        }
        Err(e) => {
            if args.dev_mode {
                warn!("MongoDB connection failed (dev mode, using in-memory store): {}", e);
                (Arc::new(MemoryStore::new()), "memory")
            } else {
                error!("MongoDB connection failed: {}", e);
                std::process::exit(1);
            }
        }
    };

    let artifacts = Arc::new(S3Presigner::new(args.storage_config()?)?);

    let state = Arc::new(AppState::new(
        args, store, store_kind, artifacts, jwt, audit,
    ));

    server::run(state).await?;
    Ok(())
}
