//! Invocation Pipeline: resolves a tool path against an already-assembled
//! inventory, evaluates policy, drives the approval state machine, resolves
//! credentials, dispatches the tool's run closure, and records the
//! call's terminal state.

use serde_json::Value;
use uuid::Uuid;

use crate::discovery::DiscoveryIndex;
use crate::error::{Result, ToolmeshError};
use crate::events::{self, ApprovalRequestedEvent, ToolCallCompletedEvent, ToolCallDeniedEvent, ToolCallFailedEvent, ToolCallStartedEvent};
use crate::host::{ToolRegistry, ToolRuntimeStore};
use crate::inventory::WorkspaceInventory;
use crate::model::{
    ApprovalStatus, CredentialMode, Decision, ExecutionArgs, RunSpec, ToolCallStatus, ToolDefinition,
};
use crate::policy;
use crate::util::path::preferred_path;

const MAX_SUGGESTIONS: usize = 3;
const SYSTEM_TOOL_PATHS: &[&str] = &["discover", "catalog.namespaces", "catalog.tools"];
const ERROR_MESSAGE_MAX: usize = 500;

pub struct InvocationRequest<'a> {
    pub task_id: &'a str,
    pub call_id: &'a str,
    pub tool_path: &'a str,
    pub input: Value,
    pub workspace_id: &'a str,
    pub actor_id: Option<&'a str>,
    pub client_id: Option<&'a str>,
}

pub async fn invoke_tool(
    store: &dyn ToolRuntimeStore,
    registry: &dyn ToolRegistry,
    inventory: &WorkspaceInventory,
    req: InvocationRequest<'_>,
) -> Result<Value> {
    let record = store.upsert_tool_call_requested(req.task_id, req.call_id, req.tool_path).await?;
    if record.status.is_terminal() {
        return Err(ToolmeshError::Internal(anyhow::anyhow!(
            "call '{}' already resolved with status {:?}",
            req.call_id,
            record.status
        )));
    }

    if SYSTEM_TOOL_PATHS.contains(&req.tool_path) {
        return dispatch_system_tool(registry, inventory, req.tool_path, req.input).await;
    }

    let tool = resolve_tool(req.tool_path, inventory)?;

    let policies = store.list_access_policies(req.workspace_id).await?;
    let (decision, effective_path) = compute_decision(tool, &req.input, &policies)?;

    if decision == Decision::Deny {
        store.set_tool_call_status(req.task_id, req.call_id, ToolCallStatus::Denied, None).await?;
        store
            .create_task_event(
                req.task_id,
                events::TOOL_CALL_DENIED,
                serde_json::to_value(ToolCallDeniedEvent {
                    task_id: req.task_id.to_string(),
                    call_id: req.call_id.to_string(),
                    tool_path: effective_path.clone(),
                    reason: "policy_deny".to_string(),
                })?,
            )
            .await?;
        return Err(ToolmeshError::PolicyDenied { path: effective_path });
    }

    let resolved_credential = resolve_credential(store, tool, req.workspace_id, req.actor_id).await?;

    if record.status == ToolCallStatus::Requested {
        store
            .create_task_event(
                req.task_id,
                events::TOOL_CALL_STARTED,
                serde_json::to_value(ToolCallStartedEvent {
                    task_id: req.task_id.to_string(),
                    call_id: req.call_id.to_string(),
                    tool_path: effective_path.clone(),
                    approval: tool.approval,
                })?,
            )
            .await?;
    }

    if let Some(approval_id) = &record.approval_id {
        let approval = store
            .get_approval(approval_id)
            .await?
            .ok_or_else(|| ToolmeshError::Internal(anyhow::anyhow!("approval '{approval_id}' referenced by call but not found")))?;
        match approval.status {
            ApprovalStatus::Pending => return Err(ToolmeshError::approval_pending(approval_id)),
            ApprovalStatus::Denied => {
                store.set_tool_call_status(req.task_id, req.call_id, ToolCallStatus::Denied, Some(approval_id.as_str())).await?;
                return Err(ToolmeshError::ApprovalDenied { path: effective_path, approval_id: approval_id.clone() });
            }
            ApprovalStatus::Approved => {}
        }
    } else if decision == Decision::RequireApproval {
        let approval_id = format!("approval_{}", Uuid::new_v4());
        let approval = store.create_approval(&approval_id, req.task_id, &effective_path, &req.input).await?;
        store
            .set_tool_call_status(req.task_id, req.call_id, ToolCallStatus::PendingApproval, Some(approval.id.as_str()))
            .await?;
        store
            .create_task_event(
                req.task_id,
                events::APPROVAL_REQUESTED,
                serde_json::to_value(ApprovalRequestedEvent {
                    approval_id: approval.id.clone(),
                    task_id: req.task_id.to_string(),
                    call_id: req.call_id.to_string(),
                    tool_path: effective_path,
                    input: req.input.clone(),
                    created_at: approval.created_at,
                })?,
            )
            .await?;
        return Err(ToolmeshError::approval_pending(&approval.id));
    }

    store.set_tool_call_status(req.task_id, req.call_id, ToolCallStatus::Running, record.approval_id.as_deref()).await?;

    let args = ExecutionArgs {
        task_id: req.task_id.to_string(),
        workspace_id: req.workspace_id.to_string(),
        actor_id: req.actor_id.map(str::to_string),
        client_id: req.client_id.map(str::to_string),
        credential: resolved_credential,
    };

    match (tool.run)(args, req.input).await {
        Ok(value) => {
            store
                .set_tool_call_status(req.task_id, req.call_id, ToolCallStatus::Completed, record.approval_id.as_deref())
                .await?;
            store
                .create_task_event(
                    req.task_id,
                    events::TOOL_CALL_COMPLETED,
                    serde_json::to_value(ToolCallCompletedEvent {
                        task_id: req.task_id.to_string(),
                        call_id: req.call_id.to_string(),
                        tool_path: tool.path.clone(),
                    })?,
                )
                .await?;
            Ok(value)
        }
        Err(err) => {
            let message = events::truncate_error_body(&err.to_string(), ERROR_MESSAGE_MAX);
            store
                .set_tool_call_status(req.task_id, req.call_id, ToolCallStatus::Failed, record.approval_id.as_deref())
                .await?;
            store
                .create_task_event(
                    req.task_id,
                    events::TOOL_CALL_FAILED,
                    serde_json::to_value(ToolCallFailedEvent {
                        task_id: req.task_id.to_string(),
                        call_id: req.call_id.to_string(),
                        tool_path: tool.path.clone(),
                        message: message.clone(),
                    })?,
                )
                .await?;
            Err(ToolmeshError::Executor(message))
        }
    }
}

/// Serves `discover`/`catalog.*` straight from the inventory's discovery
/// index, bypassing tool resolution/policy/approval entirely — but only once
/// the host's registry confirms it has published a build matching this
/// inventory's signature. A missing or stale build raises the retryable
/// `RegistryNotReady`, matching a caller that invoked before the registry
/// caught up with a rebuild.
async fn dispatch_system_tool(
    registry: &dyn ToolRegistry,
    inventory: &WorkspaceInventory,
    path: &str,
    input: Value,
) -> Result<Value> {
    let build_id = inventory.signature.as_str();
    let state = registry.get_state(build_id).await.map_err(ToolmeshError::Internal)?;
    match state {
        Some(state) if state.signature == build_id => {}
        _ => return Err(ToolmeshError::RegistryNotReady),
    }

    let index: &DiscoveryIndex = &inventory.discovery;
    let result = match path {
        "discover" => crate::discovery::run_discover(index, input),
        "catalog.namespaces" => crate::discovery::run_catalog_namespaces(index),
        "catalog.tools" => crate::discovery::run_catalog_tools(index, input),
        _ => unreachable!("dispatch_system_tool called with a non-system path"),
    };
    result.map_err(ToolmeshError::Internal)
}

fn resolve_tool<'a>(path: &str, inventory: &'a WorkspaceInventory) -> Result<&'a ToolDefinition> {
    if let Some(tool) = inventory.tools.get(path) {
        return Ok(tool);
    }

    let normalized = preferred_path(path);
    let mut candidates: Vec<&ToolDefinition> = inventory
        .tools
        .values()
        .filter(|t| preferred_path(&t.path) == normalized)
        .collect();

    if !candidates.is_empty() {
        candidates.sort_by_key(|t| t.path.len());
        return Ok(candidates[0]);
    }

    let suggestions = inventory.discovery.suggest(&path.replace(['.', '_'], " "), MAX_SUGGESTIONS);
    let Some(best) = suggestions.first() else {
        return Err(ToolmeshError::UnknownTool(path.to_string()));
    };

    Err(ToolmeshError::UnknownToolWithSuggestion {
        path: path.to_string(),
        suggestion: best.clone(),
        query: path.replace(['.', '_'], " "),
    })
}

fn compute_decision(tool: &ToolDefinition, input: &Value, policies: &[crate::model::PolicyRecord]) -> Result<(Decision, String)> {
    let is_graphql_raw = matches!(tool.run_spec, RunSpec::GraphqlRaw { .. });
    if is_graphql_raw {
        if let Some(query) = input.get("query").and_then(Value::as_str) {
            let source = tool.path.split('.').next().unwrap_or(&tool.path);
            let raw_decision = policy::decision_for_tool(tool, policies);
            let (decision, effective_paths) = policy::graphql_decision(source, query, raw_decision, policies)?;
            let display_path = if effective_paths.is_empty() {
                tool.path.clone()
            } else {
                effective_paths.join(", ")
            };
            return Ok((decision, display_path));
        }
    }
    Ok((policy::decision_for_tool(tool, policies), tool.path.clone()))
}

async fn resolve_credential(
    store: &dyn ToolRuntimeStore,
    tool: &ToolDefinition,
    workspace_id: &str,
    actor_id: Option<&str>,
) -> Result<Option<crate::model::ResolvedCredential>> {
    let Some(binding) = &tool.credential else {
        return Ok(None);
    };
    if binding.mode == CredentialMode::Static {
        return Ok(None);
    }

    store
        .resolve_credential(workspace_id, actor_id, &binding.source_key, binding.mode, binding.auth_type)
        .await
        .map(Some)
        .map_err(|err| ToolmeshError::CredentialMissing {
            path: tool.path.clone(),
            reason: err.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ApprovalMode, PolicyRecord, PolicyTarget, ToolTyping};
    use std::sync::Arc;

    fn tool(path: &str, run_spec: RunSpec) -> ToolDefinition {
        ToolDefinition {
            path: path.to_string(),
            source: "test".into(),
            approval: ApprovalMode::Auto,
            description: String::new(),
            typing: ToolTyping::default(),
            credential: None,
            run_spec,
            run: Arc::new(|_, _| Box::pin(async { Ok(Value::Null) })),
        }
    }

    #[test]
    fn resolve_tool_finds_exact_path() {
        let tools = vec![tool("github.repos.get", RunSpec::Builtin { handler: "noop".into() })];
        let discovery = Arc::new(DiscoveryIndex::build(&tools));
        let inventory = WorkspaceInventory {
            tools: tools.into_iter().map(|t| (t.path.clone(), t)).collect(),
            warnings: vec![],
            types_storage_id: None,
            discovery,
            signature: crate::model::SourceSignature::compute("ws", &[]),
            debug: crate::inventory::InventoryDebug {
                mode: crate::inventory::InventoryMode::Rebuild,
                source_count: 0,
                enabled_source_count: 0,
                cache_hit: false,
                cache_fresh: false,
                timed_out_sources: vec![],
                step_timings_ms: Default::default(),
            },
            source_quality: vec![],
            source_auth_profiles: vec![],
        };
        assert!(resolve_tool("github.repos.get", &inventory).is_ok());
    }

    #[test]
    fn resolve_tool_raises_unknown_with_suggestion() {
        let tools = vec![tool("github.actions.list_workflow_runs", RunSpec::Builtin { handler: "noop".into() })];
        let discovery = Arc::new(DiscoveryIndex::build(&tools));
        let inventory = WorkspaceInventory {
            tools: tools.into_iter().map(|t| (t.path.clone(), t)).collect(),
            warnings: vec![],
            types_storage_id: None,
            discovery,
            signature: crate::model::SourceSignature::compute("ws", &[]),
            debug: crate::inventory::InventoryDebug {
                mode: crate::inventory::InventoryMode::Rebuild,
                source_count: 0,
                enabled_source_count: 0,
                cache_hit: false,
                cache_fresh: false,
                timed_out_sources: vec![],
                step_timings_ms: Default::default(),
            },
            source_quality: vec![],
            source_auth_profiles: vec![],
        };
        let err = resolve_tool("github.actionz.list_workflows", &inventory).unwrap_err();
        match err {
            ToolmeshError::UnknownToolWithSuggestion { suggestion, .. } => {
                assert_eq!(suggestion, "github.actions.list_workflow_runs");
            }
            other => panic!("expected UnknownToolWithSuggestion, got {other:?}"),
        }
    }

    #[test]
    fn compute_decision_allows_by_default() {
        let t = tool("a.b", RunSpec::Builtin { handler: "noop".into() });
        let (decision, path) = compute_decision(&t, &Value::Null, &[]).unwrap();
        assert_eq!(decision, Decision::Allow);
        assert_eq!(path, "a.b");
    }

    #[test]
    fn compute_decision_denies_via_policy() {
        let t = tool("admin.delete_data", RunSpec::Builtin { handler: "noop".into() });
        let policies = vec![PolicyRecord {
            match_pattern: PolicyTarget::PathPattern("admin.delete_data".into()),
            context: "workspace".into(),
            decision: Decision::Deny,
        }];
        let (decision, _) = compute_decision(&t, &Value::Null, &policies).unwrap();
        assert_eq!(decision, Decision::Deny);
    }
}
