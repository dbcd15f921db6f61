//! Lifecycle events the invocation pipeline emits through
//! `ToolRuntimeStore::create_task_event`. Events for a given `(task_id,
//! call_id)` are published in a total order: `tool.call.started` precedes
//! any approval events, and a terminal event fires exactly once per call.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::ApprovalMode;

pub const TOOL_CALL_STARTED: &str = "tool.call.started";
pub const APPROVAL_REQUESTED: &str = "approval.requested";
pub const TOOL_CALL_COMPLETED: &str = "tool.call.completed";
pub const TOOL_CALL_FAILED: &str = "tool.call.failed";
pub const TOOL_CALL_DENIED: &str = "tool.call.denied";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallStartedEvent {
    pub task_id: String,
    pub call_id: String,
    pub tool_path: String,
    pub approval: ApprovalMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequestedEvent {
    pub approval_id: String,
    pub task_id: String,
    pub call_id: String,
    pub tool_path: String,
    pub input: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallCompletedEvent {
    pub task_id: String,
    pub call_id: String,
    pub tool_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallFailedEvent {
    pub task_id: String,
    pub call_id: String,
    pub tool_path: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallDeniedEvent {
    pub task_id: String,
    pub call_id: String,
    pub tool_path: String,
    pub reason: String,
}

/// Truncate an executor error body to a caller-visible head, matching the
/// 500-char cap applied to HTTP error bodies.
pub fn truncate_error_body(body: &str, max: usize) -> String {
    if body.len() <= max {
        body.to_string()
    } else {
        let mut end = max;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &body[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_error_body_leaves_short_bodies_untouched() {
        assert_eq!(truncate_error_body("short", 500), "short");
    }

    #[test]
    fn truncate_error_body_caps_long_bodies() {
        let long = "a".repeat(600);
        let truncated = truncate_error_body(&long, 500);
        assert_eq!(truncated.chars().count(), 501);
        assert!(truncated.ends_with('…'));
    }
}
