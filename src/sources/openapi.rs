//! OpenAPI source loader: compiles a prepared spec's operations into tools
//! whose run-spec the OpenAPI executor can dispatch directly.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::model::{
    ApprovalMode, CredentialAuthType, CredentialBinding, CredentialMode, ExecutionArgs, RunSpec,
    ToolDefinition, ToolSource, ToolTyping, TypedRef,
};
use crate::openapi::preparer::ParameterMeta;
use crate::openapi::{self, DtsStatus, InferredAuth, OpenApiSpecInput, PreparedOperation};
use crate::util::PathBuilder;

use super::{LoadContext, SourceLoadResult};

const MAX_PREVIEW_KEYS: usize = 6;

pub async fn load(source: &ToolSource, ctx: &LoadContext<'_>) -> anyhow::Result<SourceLoadResult> {
    let config: crate::config::OpenApiSourceConfig = serde_json::from_value(source.config.clone())
        .map_err(|e| anyhow::anyhow!("invalid openapi source config: {e}"))?;

    let input = match (&config.inline_spec, &config.spec_url) {
        (Some(doc), _) => OpenApiSpecInput::Inline(doc.clone()),
        (None, Some(url)) => OpenApiSpecInput::Url(url.clone()),
        (None, None) => anyhow::bail!("openapi source has neither inlineSpec nor specUrl"),
    };

    let prepared = openapi::prepare(input, ctx.http, None).await?;
    let mut warnings = prepared.warnings.clone();
    if prepared.dts_status == DtsStatus::Failed {
        warnings.push(format!("'{}' type generation failed; using schema-first hints", source.name));
    }

    let base_url = config
        .base_url_override
        .clone()
        .or_else(|| prepared.servers.first().cloned())
        .unwrap_or_default();
    if base_url.is_empty() {
        warnings.push(format!("'{}' declares no server URL; operations may fail to resolve a base URL", source.name));
    }

    let mut builder = PathBuilder::new();
    let mut tools = Vec::with_capacity(prepared.operations.len());
    for op in &prepared.operations {
        tools.push(compile_operation(source, &config, &base_url, op, prepared.inferred_auth.as_ref(), &mut builder));
    }

    let ref_hint_table = (!prepared.ref_hint_table.is_empty()).then(|| prepared.ref_hint_table.clone());
    Ok(SourceLoadResult { tools, warnings, ref_hint_table })
}

fn compile_operation(
    source: &ToolSource,
    config: &crate::config::OpenApiSourceConfig,
    base_url: &str,
    op: &PreparedOperation,
    inferred_auth: Option<&InferredAuth>,
    builder: &mut PathBuilder,
) -> ToolDefinition {
    let path = builder.build(&source.name, &op.tag, &op.operation_id);
    let approval = if ParameterMeta::is_read_method_default(&op.method) {
        ApprovalMode::Auto
    } else {
        ApprovalMode::Required
    };

    let (auth_headers, credential) = resolve_credential_shape(source, config, inferred_auth);

    let preview_input_keys = op
        .input_schema
        .get("properties")
        .and_then(Value::as_object)
        .map(|props| props.keys().take(MAX_PREVIEW_KEYS).cloned().collect())
        .filter(|v: &Vec<String>| !v.is_empty());

    let typing = ToolTyping {
        input_schema: op.input_schema.clone(),
        output_schema: op.output_schema.clone(),
        required_input_keys: (!op.required_input_keys.is_empty()).then(|| op.required_input_keys.clone()),
        preview_input_keys,
        input_hint: Some(op.input_hint.clone()),
        output_hint: Some(op.output_hint.clone()),
        typed_ref: Some(TypedRef {
            source_key: source.id.clone(),
            operation_id: op.operation_id.clone(),
        }),
    };

    let run_spec = RunSpec::OpenApi {
        base_url: base_url.to_string(),
        method: op.method.clone(),
        path_template: op.path_template.clone(),
        parameters: serde_json::json!({
            "params": op.parameters_meta,
            "hasBody": op.has_body,
        }),
        auth_headers,
        credential_spec: credential.clone(),
    };

    let run = build_run_closure(run_spec.clone());

    ToolDefinition {
        path,
        source: format!("openapi:{}", source.name),
        approval,
        description: op.description.clone(),
        typing,
        credential,
        run_spec,
        run,
    }
}

fn resolve_credential_shape(
    source: &ToolSource,
    config: &crate::config::OpenApiSourceConfig,
    inferred_auth: Option<&InferredAuth>,
) -> (HashMap<String, String>, Option<CredentialBinding>) {
    let auth_type = inferred_auth.map(|a| a.auth_type).unwrap_or(CredentialAuthType::ApiKey);
    let header_name = inferred_auth.and_then(|a| a.header_name.clone());

    match config.credential_mode {
        None | Some(CredentialMode::Static) => {
            if config.api_key.is_empty() {
                return (HashMap::new(), None);
            }
            let (name, value) = match auth_type {
                CredentialAuthType::Bearer => ("Authorization".to_string(), format!("Bearer {}", config.api_key)),
                CredentialAuthType::Basic => ("Authorization".to_string(), format!("Basic {}", config.api_key)),
                CredentialAuthType::ApiKey => (header_name.unwrap_or_else(|| "X-API-Key".to_string()), config.api_key.clone()),
            };
            (HashMap::from([(name, value)]), None)
        }
        Some(mode) => (
            HashMap::new(),
            Some(CredentialBinding {
                source_key: source.id.clone(),
                mode,
                auth_type,
                header_name,
            }),
        ),
    }
}

fn build_run_closure(run_spec: RunSpec) -> crate::model::RunFn {
    Arc::new(move |args: ExecutionArgs, input: Value| {
        let run_spec = run_spec.clone();
        Box::pin(async move { crate::executors::openapi::execute(&run_spec, args, input).await })
    })
}
