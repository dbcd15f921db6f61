use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    Requested,
    Running,
    PendingApproval,
    Completed,
    Failed,
    Denied,
}

impl ToolCallStatus {
    /// Only terminal states are final.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ToolCallStatus::Completed | ToolCallStatus::Failed | ToolCallStatus::Denied
        )
    }
}

/// A single invocation's lifecycle state, keyed by the task and call that
/// produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub task_id: String,
    pub call_id: String,
    pub status: ToolCallStatus,
    pub tool_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Denied,
}

/// A pending human decision gating a call whose policy decision was
/// `RequireApproval`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Approval {
    pub id: String,
    pub task_id: String,
    pub tool_path: String,
    pub input: Value,
    pub status: ApprovalStatus,
    pub created_at: DateTime<Utc>,
}
