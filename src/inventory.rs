//! Workspace Inventory Assembler: normalizes enabled sources, consults the
//! signature-keyed cache, loads sources in parallel with a per-source
//! timeout on a miss, and merges the result into one path-keyed tool map
//! with the `discover`/`catalog.*` system tools regenerated on top.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::warn;

use crate::config::{McpAuthMode, McpSourceConfig};
use crate::discovery::DiscoveryIndex;
use crate::executors::builtin::BuiltinHandler;
use crate::host::{BlobStore, ToolRuntimeStore, WorkspaceToolCacheStore};
use crate::model::{
    ApprovalMode, CredentialAuthType, CredentialMode, ExecutionArgs, RunSpec, SourceSignature, ToolDefinition,
    ToolSource, ToolSourceType, ToolTyping, WorkspaceToolSnapshot,
};
use crate::serialize::{rehydrate_artifact, serialize_artifact};
use crate::sources::{load_source, LoadContext};

const STALE_WARNING: &str = "Tool sources changed; showing previous results while refreshing.";
const DEFAULT_SOURCE_TIMEOUT_MS: u64 = 20_000;
const MAX_TOOL_LIST_SIZE: usize = 8_000;

#[derive(Debug, Clone, Default)]
pub struct InventoryOptions {
    pub source_timeout_ms: Option<u64>,
    pub allow_stale_on_mismatch: bool,
    pub skip_cache_read: bool,
    pub actor_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum InventoryMode {
    CacheFresh,
    CacheStale,
    Rebuild,
}

#[derive(Debug, Clone, Serialize)]
pub struct InventoryDebug {
    pub mode: InventoryMode,
    pub source_count: usize,
    pub enabled_source_count: usize,
    pub cache_hit: bool,
    pub cache_fresh: bool,
    pub timed_out_sources: Vec<String>,
    pub step_timings_ms: HashMap<String, u64>,
}

/// Per-source summary surfaced alongside `listToolsWithWarningsForContext`:
/// coarse health so a hosting UI can flag a source before anyone calls a
/// tool from it.
#[derive(Debug, Clone, Serialize)]
pub struct SourceQuality {
    pub source_key: String,
    pub tool_count: usize,
    pub has_warnings: bool,
    pub last_loaded_at: chrono::DateTime<chrono::Utc>,
}

/// Per-source credential shape, derived from the first tool contributed by
/// that source that declares a binding. Lets a hosting UI prompt for a
/// missing credential without invoking a tool first.
#[derive(Debug, Clone, Serialize)]
pub struct SourceAuthProfile {
    pub source_key: String,
    pub mode: CredentialMode,
    pub auth_type: CredentialAuthType,
}

pub struct WorkspaceInventory {
    pub tools: IndexMap<String, ToolDefinition>,
    pub warnings: Vec<String>,
    pub types_storage_id: Option<String>,
    pub discovery: Arc<DiscoveryIndex>,
    pub signature: SourceSignature,
    pub debug: InventoryDebug,
    pub source_quality: Vec<SourceQuality>,
    pub source_auth_profiles: Vec<SourceAuthProfile>,
}

pub struct InventoryHost<'a> {
    pub store: &'a dyn ToolRuntimeStore,
    pub cache: &'a dyn WorkspaceToolCacheStore,
    pub blobs: &'a dyn BlobStore,
    pub http: &'a reqwest::Client,
}

pub async fn get_workspace_tools(
    host: &InventoryHost<'_>,
    workspace_id: &str,
    options: &InventoryOptions,
    builtins: &HashMap<String, BuiltinHandler>,
) -> anyhow::Result<WorkspaceInventory> {
    let mut timings = HashMap::new();
    let started = Instant::now();

    let sources = host.store.list_tool_sources(workspace_id).await?;
    let signature = SourceSignature::compute(workspace_id, &sources);
    timings.insert("list_sources_ms".to_string(), started.elapsed().as_millis() as u64);

    let enabled: Vec<&ToolSource> = sources.iter().filter(|s| s.enabled).collect();
    let forced_no_cache = enabled
        .iter()
        .filter(|s| s.source_type == ToolSourceType::Mcp)
        .any(|s| {
            serde_json::from_value::<McpSourceConfig>(s.config.clone())
                .map(|c| c.is_actor_scoped())
                .unwrap_or(false)
        });
    let actor_mode_forced = forced_no_cache
        && enabled.iter().any(|s| {
            s.source_type == ToolSourceType::Mcp
                && serde_json::from_value::<McpSourceConfig>(s.config.clone())
                    .map(|c| c.auth_mode == Some(McpAuthMode::Actor))
                    .unwrap_or(false)
        });
    let skip_cache_read = options.skip_cache_read || actor_mode_forced;
    let skip_cache_write = actor_mode_forced;

    if !skip_cache_read {
        let cache_started = Instant::now();
        let entry = host.cache.get_cache_entry(workspace_id).await?;
        timings.insert("cache_lookup_ms".to_string(), cache_started.elapsed().as_millis() as u64);

        if let Some(entry) = entry {
            let is_fresh = entry.signature == signature.as_str();
            if is_fresh {
                if let Some(snapshot) = load_snapshot(host.blobs, &entry.storage_id).await? {
                    let mut tools = hydrate_from_snapshot(&snapshot, builtins);
                    let mut warnings = snapshot.warnings.clone();
                    append_system_tools(&mut tools, &mut warnings);
                    let discovery = Arc::new(DiscoveryIndex::build(&tools.values().cloned().collect::<Vec<_>>()));
                    let (source_quality, source_auth_profiles) = summarize_sources(&enabled, &tools, &warnings);
                    return Ok(WorkspaceInventory {
                        types_storage_id: entry.types_storage_id.clone(),
                        debug: InventoryDebug {
                            mode: InventoryMode::CacheFresh,
                            source_count: sources.len(),
                            enabled_source_count: enabled.len(),
                            cache_hit: true,
                            cache_fresh: true,
                            timed_out_sources: vec![],
                            step_timings_ms: timings,
                        },
                        tools,
                        warnings,
                        discovery,
                        signature,
                        source_quality,
                        source_auth_profiles,
                    });
                }
            } else if options.allow_stale_on_mismatch {
                if let Some(snapshot) = load_snapshot(host.blobs, &entry.storage_id).await? {
                    let mut tools = hydrate_from_snapshot(&snapshot, builtins);
                    let mut warnings = snapshot.warnings.clone();
                    warnings.push(STALE_WARNING.to_string());
                    append_system_tools(&mut tools, &mut warnings);
                    let discovery = Arc::new(DiscoveryIndex::build(&tools.values().cloned().collect::<Vec<_>>()));
                    let (source_quality, source_auth_profiles) = summarize_sources(&enabled, &tools, &warnings);
                    return Ok(WorkspaceInventory {
                        types_storage_id: entry.types_storage_id.clone(),
                        debug: InventoryDebug {
                            mode: InventoryMode::CacheStale,
                            source_count: sources.len(),
                            enabled_source_count: enabled.len(),
                            cache_hit: true,
                            cache_fresh: false,
                            timed_out_sources: vec![],
                            step_timings_ms: timings,
                        },
                        tools,
                        warnings,
                        discovery,
                        signature,
                        source_quality,
                        source_auth_profiles,
                    });
                }
            }
        }
    }

    rebuild(host, workspace_id, &sources, &enabled, options, builtins, signature, timings, skip_cache_write).await
}

#[allow(clippy::too_many_arguments)]
async fn rebuild(
    host: &InventoryHost<'_>,
    workspace_id: &str,
    sources: &[ToolSource],
    enabled: &[&ToolSource],
    options: &InventoryOptions,
    builtins: &HashMap<String, BuiltinHandler>,
    signature: SourceSignature,
    mut timings: HashMap<String, u64>,
    skip_cache_write: bool,
) -> anyhow::Result<WorkspaceInventory> {
    let load_started = Instant::now();
    let timeout = Duration::from_millis(options.source_timeout_ms.unwrap_or(DEFAULT_SOURCE_TIMEOUT_MS));

    let ctx_actor_id = options.actor_id.clone();
    let load_ctx = LoadContext {
        http: host.http,
        store: host.store,
        workspace_id,
        actor_id: ctx_actor_id.as_deref(),
    };

    let mut futures = Vec::with_capacity(enabled.len());
    for source in enabled {
        let load_ctx = &load_ctx;
        futures.push(async move {
            let result = tokio::time::timeout(timeout, load_source(source, load_ctx)).await;
            (*source, result)
        });
    }
    let outcomes = futures_util::future::join_all(futures).await;
    timings.insert("load_sources_ms".to_string(), load_started.elapsed().as_millis() as u64);

    let mut warnings = Vec::new();
    let mut timed_out_sources = Vec::new();
    let mut artifacts = Vec::new();
    let mut merged: IndexMap<String, ToolDefinition> = builtins
        .iter()
        .map(|(path, handler)| (path.clone(), builtin_tool_definition(path.clone(), handler.clone())))
        .collect();

    for (source, outcome) in outcomes {
        match outcome {
            Err(_elapsed) => {
                timed_out_sources.push(source.name.clone());
                warnings.push(format!("'{}' is still loading; showing partial results", source.name));
            }
            Ok(result) => {
                warnings.extend(result.warnings);
                for tool in &result.tools {
                    merged.insert(tool.path.clone(), tool.clone());
                }
                artifacts.push(serialize_artifact(
                    source.source_type.as_str(),
                    &source.name,
                    Some(source.id.clone()),
                    result.ref_hint_table,
                    &result.tools,
                ));
            }
        }
    }

    if merged.len() > MAX_TOOL_LIST_SIZE {
        warnings.push(format!(
            "workspace tool list exceeds {MAX_TOOL_LIST_SIZE} entries; truncating",
        ));
        merged = merged.into_iter().take(MAX_TOOL_LIST_SIZE).collect();
    }

    let types_started = Instant::now();
    let types_storage_id = build_type_bundle(host.blobs, &merged).await?;
    timings.insert("build_types_ms".to_string(), types_started.elapsed().as_millis() as u64);

    append_system_tools(&mut merged, &mut warnings);
    let discovery = Arc::new(DiscoveryIndex::build(&merged.values().cloned().collect::<Vec<_>>()));
    let (source_quality, source_auth_profiles) = summarize_sources(enabled, &merged, &warnings);

    if timed_out_sources.is_empty() && !skip_cache_write {
        let write_started = Instant::now();
        if let Err(err) = write_snapshot(host, workspace_id, &signature, &artifacts, &warnings, types_storage_id.clone()).await {
            warn!(error = %err, "cache write failed; returning inventory without persisting snapshot");
        }
        timings.insert("write_snapshot_ms".to_string(), write_started.elapsed().as_millis() as u64);
    }

    Ok(WorkspaceInventory {
        debug: InventoryDebug {
            mode: InventoryMode::Rebuild,
            source_count: sources.len(),
            enabled_source_count: enabled.len(),
            cache_hit: false,
            cache_fresh: false,
            timed_out_sources,
            step_timings_ms: timings,
        },
        tools: merged,
        warnings,
        types_storage_id,
        discovery,
        signature,
        source_quality,
        source_auth_profiles,
    })
}

/// Groups compiled tools back by their `source` label (`"<type>:<name>"`,
/// see the source loaders) to derive a coarse per-source health summary and
/// credential shape. `lastLoadedAt` approximates "last loaded" with the
/// source record's `updatedAt`, since no separate per-fetch timestamp is
/// tracked; `hasWarnings` is a best-effort match against the source's name
/// appearing in a warning string, since warnings aren't tagged by source id.
fn summarize_sources(
    enabled: &[&ToolSource],
    tools: &IndexMap<String, ToolDefinition>,
    warnings: &[String],
) -> (Vec<SourceQuality>, Vec<SourceAuthProfile>) {
    let mut quality = Vec::with_capacity(enabled.len());
    let mut auth_profiles = Vec::new();

    for source in enabled {
        let label = format!("{}:{}", source.source_type.as_str(), source.name);
        let source_tools: Vec<&ToolDefinition> = tools.values().filter(|t| t.source == label).collect();
        let has_warnings = warnings.iter().any(|w| w.contains(&source.name));

        quality.push(SourceQuality {
            source_key: label.clone(),
            tool_count: source_tools.len(),
            has_warnings,
            last_loaded_at: source.updated_at,
        });

        if let Some(binding) = source_tools.iter().find_map(|t| t.credential.as_ref()) {
            auth_profiles.push(SourceAuthProfile {
                source_key: label,
                mode: binding.mode,
                auth_type: binding.auth_type,
            });
        }
    }

    (quality, auth_profiles)
}

async fn load_snapshot(blobs: &dyn BlobStore, storage_id: &str) -> anyhow::Result<Option<WorkspaceToolSnapshot>> {
    let Some(bytes) = blobs.get(storage_id).await? else {
        return Ok(None);
    };
    Ok(Some(serde_json::from_slice(&bytes)?))
}

fn hydrate_from_snapshot(
    snapshot: &WorkspaceToolSnapshot,
    builtins: &HashMap<String, BuiltinHandler>,
) -> IndexMap<String, ToolDefinition> {
    let mut tools = IndexMap::new();
    for artifact in &snapshot.external_artifacts {
        for tool in rehydrate_artifact(artifact, builtins) {
            tools.insert(tool.path.clone(), tool);
        }
    }
    tools
}

async fn write_snapshot(
    host: &InventoryHost<'_>,
    workspace_id: &str,
    signature: &SourceSignature,
    artifacts: &[crate::model::CompiledToolSourceArtifact],
    warnings: &[String],
    types_storage_id: Option<String>,
) -> anyhow::Result<()> {
    let snapshot = WorkspaceToolSnapshot::new(artifacts.to_vec(), warnings.to_vec());
    let bytes = serde_json::to_vec(&snapshot)?;
    let tool_count: usize = artifacts.iter().map(|a| a.tools.len()).sum();
    let size_bytes = bytes.len() as u64;

    let previous = host.cache.get_cache_entry(workspace_id).await?;
    let storage_id = host.blobs.store(bytes).await?;

    host.cache
        .put_cache_entry(crate::model::CacheEntry {
            workspace_id: workspace_id.to_string(),
            signature: signature.as_str().to_string(),
            storage_id: storage_id.clone(),
            types_storage_id,
            tool_count,
            size_bytes,
            is_fresh: true,
        })
        .await?;

    if let Some(previous) = previous {
        if previous.storage_id != storage_id {
            let _ = host.blobs.delete(&previous.storage_id).await;
        }
    }
    Ok(())
}

/// Builds the Monaco-facing type bundle from tool typings. Each tool's
/// `inputSchema`/`outputSchema` contributes a named entry; DTS blobs from
/// OpenAPI sources are opaque strings referenced by operation id and are not
/// inlined here (the host's formatter resolves those separately).
async fn build_type_bundle(blobs: &dyn BlobStore, tools: &IndexMap<String, ToolDefinition>) -> anyhow::Result<Option<String>> {
    if tools.is_empty() {
        return Ok(None);
    }
    let bundle: Value = json!(tools
        .values()
        .map(|t| json!({
            "path": t.path,
            "inputSchema": t.typing.input_schema,
            "outputSchema": t.typing.output_schema,
        }))
        .collect::<Vec<_>>());
    let bytes = serde_json::to_vec(&bundle)?;
    let storage_id = blobs.store(bytes).await?;
    Ok(Some(storage_id))
}

/// Wraps a host-registered builtin handler as a full `ToolDefinition` so it
/// participates in the built-ins tier of the merge (step 5: built-ins, then
/// externals — later wins on path collision — then catalog/discover tools).
/// Host-supplied builtins carry no declarative metadata of their own, so the
/// wrapper uses generic defaults; a hosting application that wants richer
/// descriptions or schemas should contribute a source loader instead.
fn builtin_tool_definition(path: String, handler: BuiltinHandler) -> ToolDefinition {
    ToolDefinition {
        source: "builtin".to_string(),
        approval: ApprovalMode::Auto,
        description: format!("built-in tool '{path}'"),
        typing: ToolTyping::default(),
        credential: None,
        run_spec: RunSpec::Builtin { handler: path.clone() },
        run: handler,
        path,
    }
}

/// Regenerates `discover`, `catalog.namespaces`, and `catalog.tools` against
/// the just-merged tool map and inserts them last, overwriting any
/// same-path external tool (there should never be one).
fn append_system_tools(tools: &mut IndexMap<String, ToolDefinition>, warnings: &mut Vec<String>) {
    let snapshot: Vec<ToolDefinition> = tools.values().cloned().collect();
    let index = Arc::new(DiscoveryIndex::build(&snapshot));

    for (path, description, handler) in crate::discovery::system_tool_specs() {
        let index = index.clone();
        let run: crate::model::RunFn = match handler {
            "discover" => Arc::new(move |_args: ExecutionArgs, input: Value| {
                let index = index.clone();
                Box::pin(async move { crate::discovery::run_discover(&index, input) })
            }),
            "catalog.namespaces" => Arc::new(move |_args: ExecutionArgs, _input: Value| {
                let index = index.clone();
                Box::pin(async move { crate::discovery::run_catalog_namespaces(&index) })
            }),
            "catalog.tools" => Arc::new(move |_args: ExecutionArgs, input: Value| {
                let index = index.clone();
                Box::pin(async move { crate::discovery::run_catalog_tools(&index, input) })
            }),
            _ => unreachable!("unknown system tool handler"),
        };

        tools.insert(
            path.to_string(),
            ToolDefinition {
                path: path.to_string(),
                source: "system".to_string(),
                approval: ApprovalMode::Auto,
                description: description.to_string(),
                typing: ToolTyping::default(),
                credential: None,
                run_spec: RunSpec::Builtin { handler: handler.to_string() },
                run,
            },
        );
    }

    if tools.len() > MAX_TOOL_LIST_SIZE {
        warnings.push(format!("workspace tool list exceeds {MAX_TOOL_LIST_SIZE} entries; truncating"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inventory_mode_serializes_kebab_case() {
        assert_eq!(serde_json::to_string(&InventoryMode::CacheFresh).unwrap(), "\"cache-fresh\"");
        assert_eq!(serde_json::to_string(&InventoryMode::CacheStale).unwrap(), "\"cache-stale\"");
    }
}
