use thiserror::Error;

/// Typed error hierarchy for toolmesh.
///
/// Used at module boundaries (source loading, resolution, policy, credential
/// resolution, executor dispatch). Leaf/internal functions may continue to
/// return `anyhow::Result`; the `Internal` variant lets `?` compose cleanly.
#[derive(Debug, Error)]
pub enum ToolmeshError {
    #[error("Unknown tool: {path}\nDid you mean: tools.{suggestion}\nTry: const found = await tools.discover({{ query: \"{query}\", compact: true, depth: 1, limit: 12 }});")]
    UnknownToolWithSuggestion {
        path: String,
        suggestion: String,
        query: String,
    },

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("registry is not ready")]
    RegistryNotReady,

    #[error("{path} (policy denied)")]
    PolicyDenied { path: String },

    #[error("{path} ({approval_id})")]
    ApprovalDenied { path: String, approval_id: String },

    #[error("{0}")]
    ApprovalPending(String),

    #[error("credential missing for tool '{path}': {reason}")]
    CredentialMissing { path: String, reason: String },

    #[error("source '{source}' failed to load: {message}")]
    SourceLoad { source: String, message: String },

    #[error("source config error: {0}")]
    Config(String),

    #[error("executor error: {0}")]
    Executor(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ToolmeshError {
    /// Whether the caller should retry the call as-is (vs surface the error).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RegistryNotReady)
    }

    /// The well-known prefix that marks a thrown message as an approval-pending
    /// sentinel rather than a genuine failure. The hosting runtime recognizes
    /// this prefix and suspends the task instead of marking it failed.
    pub const APPROVAL_PENDING_PREFIX: &'static str = "__TOOLMESH_APPROVAL_PENDING__:";

    pub fn approval_pending(approval_id: &str) -> Self {
        Self::ApprovalPending(format!("{}{}", Self::APPROVAL_PENDING_PREFIX, approval_id))
    }

    /// Extract the approval id from an error if it is an approval-pending sentinel.
    pub fn pending_approval_id(&self) -> Option<&str> {
        match self {
            Self::ApprovalPending(msg) => msg.strip_prefix(Self::APPROVAL_PENDING_PREFIX),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ToolmeshError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approval_pending_roundtrips_id() {
        let err = ToolmeshError::approval_pending("approval_abc123");
        assert_eq!(err.pending_approval_id(), Some("approval_abc123"));
    }

    #[test]
    fn only_registry_not_ready_is_retryable() {
        assert!(ToolmeshError::RegistryNotReady.is_retryable());
        assert!(!ToolmeshError::UnknownTool("x".into()).is_retryable());
    }
}
