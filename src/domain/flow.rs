//! Flow definitions
//!
//! Flows are edited by tenant admins. The session engine only reads them,
//! fresh on every request, and tracks a position inside `steps`. Once a
//! session references a flow, its step ids and their order are frozen.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::CheckpointError;

/// One step of a flow. `step_type` and `config` are advisory to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDescriptor {
    pub step_id: String,
    #[serde(rename = "type")]
    pub step_type: String,
    #[serde(default)]
    pub config: serde_json::Map<String, serde_json::Value>,
}

impl StepDescriptor {
    pub fn new(step_id: &str, step_type: &str) -> Self {
        Self {
            step_id: step_id.to_string(),
            step_type: step_type.to_string(),
            config: serde_json::Map::new(),
        }
    }
}

/// Ordered, tenant-owned template of verification steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flow {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub steps: Vec<StepDescriptor>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Flow {
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Step at `index`, or `None` once the index has run past the last step
    pub fn step_at(&self, index: u32) -> Option<&StepDescriptor> {
        self.steps.get(index as usize)
    }

    /// Whether `steps` has exactly this flow's step ids in the same order.
    /// Type and config may differ.
    pub fn same_step_order(&self, steps: &[StepDescriptor]) -> bool {
        self.steps.len() == steps.len()
            && self
                .steps
                .iter()
                .zip(steps)
                .all(|(current, next)| current.step_id == next.step_id)
    }
}

/// Rejection for a step-order change on a flow that sessions already use
pub fn step_order_locked(flow_name: &str) -> CheckpointError {
    CheckpointError::Conflict(format!(
        "Flow '{}' is used by existing sessions; its step order cannot change",
        flow_name
    ))
}
