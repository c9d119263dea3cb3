//! Verified caller identity for the admin surface

use crate::auth::{is_operation_allowed, Claims, Role};
use crate::types::CheckpointError;

/// Identity extracted from a verified token. Passed explicitly to every
/// operation that acts on behalf of a tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub tenant_id: String,
    pub subject_id: String,
    pub role: Role,
}

impl Principal {
    /// Fail with `Unauthorized` unless the role permits `operation`
    pub fn authorize(&self, operation: &str) -> Result<(), CheckpointError> {
        if is_operation_allowed(operation, self.role) {
            Ok(())
        } else {
            Err(CheckpointError::Unauthorized(format!(
                "Role {} may not perform {}",
                self.role, operation
            )))
        }
    }

    /// Fail with `Unauthorized` when a resource belongs to another tenant
    pub fn ensure_tenant(&self, owner_tenant_id: &str) -> Result<(), CheckpointError> {
        if self.tenant_id == owner_tenant_id {
            Ok(())
        } else {
            Err(CheckpointError::Unauthorized(
                "Resource belongs to another tenant".into(),
            ))
        }
    }
}

impl From<Claims> for Principal {
    fn from(claims: Claims) -> Self {
        Self {
            tenant_id: claims.tenant_id,
            subject_id: claims.sub,
            role: claims.role,
        }
    }
}
