//! JWT tokens for the admin surface
//!
//! Security notes:
//! - Tokens are signed with HS256; verification accepts only the HMAC family
//! - Any other `alg` header is rejected before the signature is checked
//! - Default expiry is 24 hours
//! - In production, JWT_SECRET must be a strong random value from environment

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::auth::Role;
use crate::types::CheckpointError;

/// Payload stored in JWT token
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    /// Tenant user ID
    pub sub: String,
    pub tenant_id: String,
    pub role: Role,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// Input for creating a new token
#[derive(Debug, Clone)]
pub struct TokenInput {
    pub subject_id: String,
    pub tenant_id: String,
    pub role: Role,
}

/// JWT validator and generator
#[derive(Clone)]
pub struct JwtValidator {
    secret: String,
    expiry_seconds: u64,
}

impl JwtValidator {
    /// Create a new JWT validator
    ///
    /// Returns an error if the secret is empty or too short
    pub fn new(secret: String, expiry_seconds: u64) -> Result<Self, CheckpointError> {
        if secret.is_empty() {
            return Err(CheckpointError::Config(
                "JWT_SECRET is required in production mode".into(),
            ));
        }

        if secret.len() < 32 {
            return Err(CheckpointError::Config(
                "JWT_SECRET must be at least 32 characters".into(),
            ));
        }

        Ok(Self {
            secret,
            expiry_seconds,
        })
    }

    /// Create a validator for dev mode
    pub fn new_dev() -> Self {
        Self {
            secret: "dev-mode-secret-not-for-production-use-123456".into(),
            expiry_seconds: 24 * 60 * 60,
        }
    }

    /// Generate a signed token for a tenant user
    pub fn generate_token(&self, input: TokenInput) -> Result<String, CheckpointError> {
        let now = unix_now()?;

        let claims = Claims {
            sub: input.subject_id,
            tenant_id: input.tenant_id,
            role: input.role,
            iat: now,
            exp: now + self.expiry_seconds,
        };

        self.sign(&claims)
    }

    fn sign(&self, claims: &Claims) -> Result<String, CheckpointError> {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| CheckpointError::Internal(format!("Failed to generate token: {}", e)))
    }

    /// Verify a token and return its claims.
    ///
    /// Every failure is `Unauthenticated`; the message names the reason for logs.
    pub fn verify_token(&self, token: &str) -> Result<Claims, CheckpointError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.algorithms = vec![Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )
        .map(|data| data.claims)
        .map_err(|err| {
            use jsonwebtoken::errors::ErrorKind;
            let reason = match err.kind() {
                ErrorKind::ExpiredSignature => "Token expired",
                ErrorKind::InvalidSignature => "Invalid signature",
                ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
                    "Unexpected signing method"
                }
                ErrorKind::InvalidToken => "Invalid token",
                _ => "Token validation failed",
            };
            CheckpointError::Unauthenticated(reason.into())
        })
    }
}

fn unix_now() -> Result<u64, CheckpointError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|e| CheckpointError::Internal(format!("System time error: {}", e)))
}

/// Extract token from Authorization header.
/// Supports "Bearer <token>" format and raw tokens.
pub fn extract_token_from_header(auth_header: Option<&str>) -> Option<&str> {
    let header = auth_header?;

    if let Some(token) = header.strip_prefix("Bearer ") {
        let token = token.trim();
        if !token.is_empty() {
            return Some(token);
        }
    }

    if !header.contains(' ') {
        let token = header.trim();
        if !token.is_empty() {
            return Some(token);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;

    fn test_validator() -> JwtValidator {
        JwtValidator::new("test-secret-that-is-at-least-32-characters-long".into(), 3600).unwrap()
    }

    fn admin_input() -> TokenInput {
        TokenInput {
            subject_id: "user-1".into(),
            tenant_id: "tenant-1".into(),
            role: Role::Admin,
        }
    }

    #[test]
    fn test_generate_and_verify_token() {
        let validator = test_validator();
        let token = validator.generate_token(admin_input()).unwrap();

        let claims = validator.verify_token(&token).unwrap();
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.tenant_id, "tenant-1");
        assert_eq!(claims.role, Role::Admin);
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn test_invalid_token() {
        let result = test_validator().verify_token("invalid-token");
        assert!(matches!(result, Err(CheckpointError::Unauthenticated(_))));
    }

    #[test]
    fn test_wrong_secret() {
        let other =
            JwtValidator::new("different-secret-that-is-at-least-32-characters".into(), 3600)
                .unwrap();
        let token = other.generate_token(admin_input()).unwrap();

        assert!(test_validator().verify_token(&token).is_err());
    }

    #[test]
    fn test_expired_token() {
        let validator = test_validator();
        let now = unix_now().unwrap();
        let token = validator
            .sign(&Claims {
                sub: "user-1".into(),
                tenant_id: "tenant-1".into(),
                role: Role::Member,
                iat: now - 7200,
                exp: now - 3600,
            })
            .unwrap();

        match validator.verify_token(&token) {
            Err(CheckpointError::Unauthenticated(msg)) => assert_eq!(msg, "Token expired"),
            other => panic!("expected expiry rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_hs512_is_accepted() {
        let validator = test_validator();
        let now = unix_now().unwrap();
        let claims = Claims {
            sub: "user-1".into(),
            tenant_id: "tenant-1".into(),
            role: Role::Member,
            iat: now,
            exp: now + 60,
        };
        let token = encode(
            &Header::new(Algorithm::HS512),
            &claims,
            &EncodingKey::from_secret(validator.secret.as_bytes()),
        )
        .unwrap();

        assert_eq!(validator.verify_token(&token).unwrap(), claims);
    }

    #[test]
    fn test_rejects_foreign_algorithm_header() {
        let validator = test_validator();
        let token = validator.generate_token(admin_input()).unwrap();
        let rs256 = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
        let none = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
        let mut parts: Vec<&str> = token.split('.').collect();

        parts[0] = &rs256;
        assert!(validator.verify_token(&parts.join(".")).is_err());

        parts[0] = &none;
        parts[2] = "";
        assert!(validator.verify_token(&parts.join(".")).is_err());
    }

    #[test]
    fn test_extract_token_from_header() {
        assert_eq!(extract_token_from_header(Some("Bearer abc123")), Some("abc123"));
        assert_eq!(extract_token_from_header(Some("abc123")), Some("abc123"));
        assert_eq!(extract_token_from_header(None), None);
        assert_eq!(extract_token_from_header(Some("")), None);
        assert_eq!(extract_token_from_header(Some("Bearer ")), None);
        assert_eq!(extract_token_from_header(Some("Basic abc123")), None);
    }

    #[test]
    fn test_secret_validation() {
        assert!(JwtValidator::new("short".into(), 3600).is_err());
        assert!(JwtValidator::new("".into(), 3600).is_err());
        assert!(JwtValidator::new("this-secret-is-at-least-32-chars-long".into(), 3600).is_ok());
    }

    #[test]
    fn test_dev_mode_validator() {
        let validator = JwtValidator::new_dev();
        let token = validator.generate_token(admin_input()).unwrap();
        assert!(validator.verify_token(&token).is_ok());
    }
}
