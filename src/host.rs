//! Trait boundaries for collaborators this crate consumes but does not own:
//! the hosting application's database, blob storage, and credential
//! provider. Modeled on the `SessionStore` pattern — pluggable storage
//! behind a narrow async trait, so a host can back these with Postgres,
//! S3, or anything else without this crate knowing.

use crate::model::{Approval, ApprovalStatus, PolicyRecord, ToolCallRecord, ToolCallStatus, ToolSource};
use crate::model::{CredentialAuthType, CredentialMode, ResolvedCredential};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

/// Database operations this crate needs from the host. Exact row shapes are
/// the host's concern; this trait only fixes the procedures.
#[async_trait]
pub trait ToolRuntimeStore: Send + Sync {
    async fn list_tool_sources(&self, workspace_id: &str) -> Result<Vec<ToolSource>>;

    async fn list_access_policies(&self, workspace_id: &str) -> Result<Vec<PolicyRecord>>;

    /// Idempotent upsert by `call_id`; returns the persisted record as it now
    /// stands (so the caller can check whether it was already resolved).
    async fn upsert_tool_call_requested(
        &self,
        task_id: &str,
        call_id: &str,
        tool_path: &str,
    ) -> Result<ToolCallRecord>;

    async fn set_tool_call_status(
        &self,
        task_id: &str,
        call_id: &str,
        status: ToolCallStatus,
        approval_id: Option<&str>,
    ) -> Result<()>;

    async fn create_approval(
        &self,
        id: &str,
        task_id: &str,
        tool_path: &str,
        input: &Value,
    ) -> Result<Approval>;

    async fn get_approval(&self, approval_id: &str) -> Result<Option<Approval>>;

    async fn set_approval_status(&self, approval_id: &str, status: ApprovalStatus) -> Result<()>;

    /// Resolve the raw secret for a non-static credential binding. Static
    /// credentials never call this — their secret is baked into the run-spec
    /// at compile time.
    async fn resolve_credential(
        &self,
        workspace_id: &str,
        actor_id: Option<&str>,
        source_key: &str,
        mode: CredentialMode,
        auth_type: CredentialAuthType,
    ) -> Result<ResolvedCredential>;

    async fn create_task_event(&self, task_id: &str, event_type: &str, payload: Value) -> Result<()>;
}

/// Content-addressed blob storage for snapshots and generated type bundles.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn store(&self, bytes: Vec<u8>) -> Result<String>;

    async fn get(&self, storage_id: &str) -> Result<Option<Vec<u8>>>;

    async fn delete(&self, storage_id: &str) -> Result<()>;

    /// A host-facing URL for the blob, if the host exposes one (e.g. for the
    /// Monaco-facing type bundle). Returns `None` when blobs are not
    /// independently addressable by URL.
    async fn get_url(&self, storage_id: &str) -> Result<Option<String>>;
}

#[async_trait]
pub trait WorkspaceToolCacheStore: Send + Sync {
    async fn get_cache_entry(&self, workspace_id: &str) -> Result<Option<crate::model::CacheEntry>>;

    async fn put_cache_entry(&self, entry: crate::model::CacheEntry) -> Result<()>;
}

/// Lightweight, read-only view of a tool for registry lookups — distinct
/// from `ToolDefinition` because registry consumers see display metadata
/// only, never the run closure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryToolDescriptor {
    pub path: String,
    pub preferred_path: String,
    pub namespace: String,
    pub description: String,
}

/// Whatever the host's registry currently has published for `build_id`.
/// `signature` is compared against the inventory the caller resolved
/// against; a mismatch means a newer build has superseded it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryBuildState {
    pub signature: String,
}

/// The host's standing, queryable view of compiled tool builds, keyed by
/// `buildId` (this crate uses the inventory's `SourceSignature` as the
/// build id). Distinct from `WorkspaceToolCacheStore`: the cache store
/// persists snapshot blobs for rebuild purposes, while the registry is the
/// host's in-memory/service-level index that `invokeTool`'s system-tool
/// shortcut and any external lookup surface consult directly.
#[async_trait]
pub trait ToolRegistry: Send + Sync {
    async fn get_state(&self, build_id: &str) -> Result<Option<RegistryBuildState>>;

    async fn get_tool_by_path(&self, build_id: &str, path: &str) -> Result<Option<RegistryToolDescriptor>>;

    async fn get_tools_by_normalized_path(
        &self,
        build_id: &str,
        normalized_path: &str,
    ) -> Result<Vec<RegistryToolDescriptor>>;

    async fn search_tools(&self, build_id: &str, query: &str, limit: usize) -> Result<Vec<RegistryToolDescriptor>>;

    async fn list_namespaces(&self, build_id: &str) -> Result<Vec<String>>;

    async fn list_tools_by_namespace(&self, build_id: &str, namespace: &str) -> Result<Vec<RegistryToolDescriptor>>;
}
