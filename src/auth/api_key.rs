//! Tenant API keys
//!
//! Keys are shown to the tenant once, at rotation. Only the SHA-256 digest and
//! the last four characters are ever stored.

use rand::RngCore;
use serde::Serialize;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Prefix of every issued key
pub const API_KEY_PREFIX: &str = "ck_";

/// Number of mask characters shown before the last four
const MASK_WIDTH: usize = 16;

/// A freshly generated key. `plaintext` must leave the process exactly once.
#[derive(Debug, Clone)]
pub struct GeneratedApiKey {
    pub plaintext: String,
    pub digest: String,
    pub last4: String,
}

/// Displayable key state for a tenant
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiKeyStatus {
    pub status: String,
    pub mask: String,
}

impl ApiKeyStatus {
    pub fn from_last4(last4: Option<&str>) -> Self {
        match last4.filter(|l| !l.is_empty()) {
            Some(last4) => Self {
                status: "Active".into(),
                mask: format!("{}{}", "*".repeat(MASK_WIDTH), last4),
            },
            None => Self {
                status: "Inactive".into(),
                mask: "Not Generated".into(),
            },
        }
    }
}

/// Deterministic lowercase hex SHA-256 of the presented key
pub fn digest_api_key(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

/// Generate a new 256-bit key from the OS random source
pub fn generate_api_key() -> GeneratedApiKey {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);

    let plaintext = format!("{}{}", API_KEY_PREFIX, hex::encode(bytes));
    let digest = digest_api_key(&plaintext);
    let last4 = plaintext[plaintext.len() - 4..].to_string();

    GeneratedApiKey {
        plaintext,
        digest,
        last4,
    }
}

/// Constant-time string comparison
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Extract the key from an Authorization header, with or without `Bearer `.
/// A bare `Bearer` scheme carries no key.
pub fn extract_api_key(header: Option<&str>) -> Option<&str> {
    let header = header?.trim();
    let key = match header.strip_prefix("Bearer") {
        Some(rest) if rest.is_empty() || rest.starts_with(char::is_whitespace) => rest.trim(),
        _ => header,
    };
    if key.is_empty() {
        None
    } else {
        Some(key)
    }
}
