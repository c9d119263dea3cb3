use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::CheckpointError;

/// Append-only ledger entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditTransaction {
    pub id: String,
    pub tenant_id: String,
    /// Positive for top-ups, negative for consumption
    pub amount: i64,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl CreditTransaction {
    pub fn new(tenant_id: &str, amount: i64, description: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            tenant_id: tenant_id.to_string(),
            amount,
            description: description.to_string(),
            created_at: Utc::now(),
        }
    }
}

/// Balance after applying `amount`. A result outside `i64` is refused.
pub fn next_balance(balance: i64, amount: i64) -> Result<i64, CheckpointError> {
    balance.checked_add(amount).ok_or_else(|| {
        CheckpointError::InvalidArgument("Credit amount would overflow the balance".into())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_balance_bounds() {
        assert_eq!(next_balance(10, -3).unwrap(), 7);
        assert_eq!(next_balance(0, -1).unwrap(), -1);
        assert_eq!(next_balance(i64::MAX - 1, 1).unwrap(), i64::MAX);
        assert!(matches!(
            next_balance(i64::MAX, 1).unwrap_err(),
            CheckpointError::InvalidArgument(_)
        ));
        assert!(matches!(
            next_balance(i64::MIN, -1).unwrap_err(),
            CheckpointError::InvalidArgument(_)
        ));
    }
}
