//! Object storage URL minting
//!
//! Collected data only ever holds object keys. Clients upload and reviewers
//! download through short-lived presigned URLs, so the service never proxies
//! artifact bytes.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::types::{CheckpointError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Validity of an upload URL
pub const UPLOAD_URL_TTL_SECONDS: u64 = 15 * 60;

/// Validity of a review download URL
pub const DOWNLOAD_URL_TTL_SECONDS: u64 = 60 * 60;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Write URL plus the key the client stores in collected data afterwards
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadTicket {
    #[serde(rename = "upload_url")]
    pub url: String,
    #[serde(rename = "file_key")]
    pub object_key: String,
}

#[async_trait::async_trait]
pub trait ArtifactUrlIssuer: Send + Sync {
    /// Write URL for `<tenant_id>/<session_token>/<filename>`
    async fn mint_upload_url(
        &self,
        tenant_id: &str,
        session_token: &str,
        filename: &str,
    ) -> Result<UploadTicket>;

    /// Read URL for an existing object key
    async fn mint_download_url(&self, object_key: &str) -> Result<String>;
}

/// Reject filenames that could escape the session's key prefix
pub fn validate_filename(filename: &str) -> Result<()> {
    let trimmed = filename.trim();
    if trimmed.is_empty() {
        return Err(CheckpointError::InvalidArgument("Filename is required".into()));
    }
    if trimmed.contains('/') || trimmed.contains('\\') || trimmed.contains("..") {
        return Err(CheckpointError::InvalidArgument(
            "Filename must not contain path separators".into(),
        ));
    }
    if trimmed.chars().any(char::is_control) {
        return Err(CheckpointError::InvalidArgument(
            "Filename contains control characters".into(),
        ));
    }
    Ok(())
}

/// Object key for an upload
pub fn object_key(tenant_id: &str, session_token: &str, filename: &str) -> String {
    format!("{}/{}/{}", tenant_id, session_token, filename)
}

/// S3-compatible connection settings
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Base URL such as `http://localhost:9000`
    pub endpoint: String,
    pub bucket: String,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
}

/// Presigns path-style S3 URLs with AWS Signature Version 4 query auth
pub struct S3Presigner {
    config: StorageConfig,
    host: String,
    base_url: String,
}

impl S3Presigner {
    pub fn new(config: StorageConfig) -> Result<Self> {
        let base_url = config.endpoint.trim_end_matches('/').to_string();
        let host = config
            .endpoint
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(&config.endpoint)
            .split('/')
            .next()
            .unwrap_or_default()
            .to_string();

        if host.is_empty() {
            return Err(CheckpointError::Config(format!(
                "Invalid storage endpoint '{}'",
                config.endpoint
            )));
        }
        if config.bucket.is_empty() {
            return Err(CheckpointError::Config("Storage bucket is required".into()));
        }

        Ok(Self {
            config,
            host,
            base_url,
        })
    }

    fn presign_at(
        &self,
        method: &str,
        key: &str,
        expires_seconds: u64,
        now: DateTime<Utc>,
    ) -> Result<String> {
        let canonical_uri = format!("/{}/{}", uri_encode(&self.config.bucket), encode_key(key));
        let query = presigned_query(&PresignRequest {
            method,
            host: &self.host,
            canonical_uri: &canonical_uri,
            region: &self.config.region,
            access_key: &self.config.access_key,
            secret_key: &self.config.secret_key,
            expires_seconds,
            now,
        })?;
        Ok(format!("{}{}?{}", self.base_url, canonical_uri, query))
    }
}

#[async_trait::async_trait]
impl ArtifactUrlIssuer for S3Presigner {
    async fn mint_upload_url(
        &self,
        tenant_id: &str,
        session_token: &str,
        filename: &str,
    ) -> Result<UploadTicket> {
        validate_filename(filename)?;
        let key = object_key(tenant_id, session_token, filename.trim());
        let url = self.presign_at("PUT", &key, UPLOAD_URL_TTL_SECONDS, Utc::now())?;
        Ok(UploadTicket {
            url,
            object_key: key,
        })
    }

    async fn mint_download_url(&self, object_key: &str) -> Result<String> {
        self.presign_at("GET", object_key, DOWNLOAD_URL_TTL_SECONDS, Utc::now())
    }
}

struct PresignRequest<'a> {
    method: &'a str,
    host: &'a str,
    canonical_uri: &'a str,
    region: &'a str,
    access_key: &'a str,
    secret_key: &'a str,
    expires_seconds: u64,
    now: DateTime<Utc>,
}

/// Signed query string, `X-Amz-Signature` last
fn presigned_query(req: &PresignRequest<'_>) -> Result<String> {
    let amz_date = req.now.format("%Y%m%dT%H%M%SZ").to_string();
    let date_stamp = req.now.format("%Y%m%d").to_string();
    let scope = format!("{}/{}/s3/aws4_request", date_stamp, req.region);
    let credential = format!("{}/{}", req.access_key, scope);

    // Already in byte order of the parameter names
    let query = format!(
        "X-Amz-Algorithm={}&X-Amz-Credential={}&X-Amz-Date={}&X-Amz-Expires={}&X-Amz-SignedHeaders=host",
        ALGORITHM,
        uri_encode(&credential),
        amz_date,
        req.expires_seconds,
    );

    let canonical_request = format!(
        "{}\n{}\n{}\nhost:{}\n\nhost\nUNSIGNED-PAYLOAD",
        req.method, req.canonical_uri, query, req.host
    );

    let string_to_sign = format!(
        "{}\n{}\n{}\n{}",
        ALGORITHM,
        amz_date,
        scope,
        hex::encode(Sha256::digest(canonical_request.as_bytes()))
    );

    let secret = format!("AWS4{}", req.secret_key);
    let k_date = hmac_sha256(secret.as_bytes(), date_stamp.as_bytes())?;
    let k_region = hmac_sha256(&k_date, req.region.as_bytes())?;
    let k_service = hmac_sha256(&k_region, b"s3")?;
    let k_signing = hmac_sha256(&k_service, b"aws4_request")?;
    let signature = hex::encode(hmac_sha256(&k_signing, string_to_sign.as_bytes())?);

    Ok(format!("{}&X-Amz-Signature={}", query, signature))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| CheckpointError::Internal(format!("Invalid signing key: {}", e)))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// RFC 3986 encoding, everything but unreserved characters
fn uri_encode(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

/// Encode each path segment, keeping the separators
fn encode_key(key: &str) -> String {
    key.split('/').map(uri_encode).collect::<Vec<_>>().join("/")
}
