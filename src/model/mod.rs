//! Core data model: compiled tools, sources, cache entries, calls, and policy
//! records.

mod call;
mod cache;
mod policy;
mod source;
mod tool;

pub use call::{Approval, ApprovalStatus, ToolCallRecord, ToolCallStatus};
pub use cache::{CacheEntry, SourceSignature, WorkspaceToolSnapshot};
pub use policy::{Decision, PolicyRecord, PolicyTarget};
pub use source::{ToolSource, ToolSourceType};
pub use tool::{
    ApprovalMode, BoxFuture, CompiledToolSourceArtifact, CredentialAuthType, CredentialBinding,
    CredentialMode, ExecutionArgs, McpTransport, PostmanBody, ResolvedCredential, RunFn, RunSpec,
    SerializedTool, ToolDefinition, ToolTyping, TypedRef,
};
