//! MCP source loader: resolves discovery headers per the configured auth
//! mode, connects (streamable-http first, falling back to SSE), and emits
//! one tool per entry from `tools/list`.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::config::{McpAuthMode, McpSourceConfig};
use crate::model::{
    ApprovalMode, CredentialAuthType, CredentialBinding, CredentialMode, ExecutionArgs, McpTransport, RunSpec,
    ToolDefinition, ToolSource, ToolTyping,
};
use crate::util::PathBuilder;

use super::{LoadContext, SourceLoadResult};
use crate::executors::mcp::connect_with_fallback;

pub async fn load(source: &ToolSource, ctx: &LoadContext<'_>) -> anyhow::Result<SourceLoadResult> {
    let config: McpSourceConfig = serde_json::from_value(source.config.clone())
        .map_err(|e| anyhow::anyhow!("invalid mcp source config: {e}"))?;

    let mut discovery_headers = config.static_headers.clone();
    let auth_mode = config.auth_mode.unwrap_or(McpAuthMode::Static);
    let credential_mode = mcp_auth_mode_to_credential_mode(auth_mode);

    let mut baked_auth_headers = HashMap::new();
    let mut credential_template = None;

    match credential_mode {
        None => {
            if !config.api_key.is_empty() {
                baked_auth_headers.insert("Authorization".to_string(), format!("Bearer {}", config.api_key));
                discovery_headers.insert("Authorization".to_string(), format!("Bearer {}", config.api_key));
            }
        }
        Some(mode) => {
            let resolved = ctx
                .store
                .resolve_credential(ctx.workspace_id, ctx.actor_id, &source.id, mode, CredentialAuthType::Bearer)
                .await?;
            discovery_headers.insert("Authorization".to_string(), format!("Bearer {}", resolved.value));
            credential_template = Some(CredentialBinding {
                source_key: source.id.clone(),
                mode,
                auth_type: CredentialAuthType::Bearer,
                header_name: None,
            });
        }
    }

    let (transport, connection) = connect_with_fallback(&config.url, &discovery_headers).await?;
    let mcp_tools = connection.peer.list_all_tools().await.map_err(|e| anyhow::anyhow!("tools/list failed: {e}"))?;

    let mut builder = PathBuilder::new();
    let tools = mcp_tools
        .into_iter()
        .map(|mcp_tool| {
            compile_tool(
                source,
                &config.url,
                transport,
                &mcp_tool,
                &baked_auth_headers,
                credential_template.clone(),
                &mut builder,
            )
        })
        .collect();

    Ok(SourceLoadResult { tools, warnings: Vec::new(), ref_hint_table: None })
}

fn mcp_auth_mode_to_credential_mode(mode: McpAuthMode) -> Option<CredentialMode> {
    match mode {
        McpAuthMode::Static => None,
        McpAuthMode::Workspace => Some(CredentialMode::Workspace),
        McpAuthMode::Actor => Some(CredentialMode::Actor),
        McpAuthMode::Account => Some(CredentialMode::Account),
    }
}

fn compile_tool(
    source: &ToolSource,
    url: &str,
    transport: McpTransport,
    mcp_tool: &rmcp::model::Tool,
    baked_auth_headers: &HashMap<String, String>,
    credential: Option<CredentialBinding>,
    builder: &mut PathBuilder,
) -> ToolDefinition {
    let tool_name = mcp_tool.name.to_string();
    let path = builder.build_flat(&source.name, &tool_name);
    let input_schema = Value::Object((*mcp_tool.input_schema).clone());
    let description = mcp_tool.description.as_deref().unwrap_or("").to_string();

    let run_spec = RunSpec::Mcp {
        url: url.to_string(),
        transport,
        query_params: HashMap::new(),
        tool_name: tool_name.clone(),
        auth_headers: baked_auth_headers.clone(),
    };
    let run = build_run_closure(run_spec.clone());

    ToolDefinition {
        path,
        source: format!("mcp:{}", source.name),
        approval: ApprovalMode::Auto,
        description,
        typing: ToolTyping {
            input_schema,
            ..ToolTyping::default()
        },
        credential,
        run_spec,
        run,
    }
}

// MCP tools default to `auto`, same as the rest of the method-class
// defaults; callers relying on tighter gating configure a policy record.

fn build_run_closure(run_spec: RunSpec) -> crate::model::RunFn {
    Arc::new(move |args: ExecutionArgs, input: Value| {
        let run_spec = run_spec.clone();
        Box::pin(async move { crate::executors::mcp::execute(&run_spec, args, input).await })
    })
}
