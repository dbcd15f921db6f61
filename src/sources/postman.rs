//! Postman collection loader: fetches a collection through a configured
//! proxy, flattens its folder tree into tool paths, and carries enough of
//! each request (URL, headers, query, body, variables) for the executor to
//! interpolate `{{var}}` templates at call time.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::model::{ApprovalMode, ExecutionArgs, PostmanBody, RunSpec, ToolDefinition, ToolSource, ToolTyping};
use crate::util::PathBuilder;

use super::{LoadContext, SourceLoadResult};

const DEFAULT_PROXY: &str = "https://pm-proxy.postman.com/resolve";

pub async fn load(source: &ToolSource, ctx: &LoadContext<'_>) -> anyhow::Result<SourceLoadResult> {
    let config: crate::config::PostmanSourceConfig = serde_json::from_value(source.config.clone())
        .map_err(|e| anyhow::anyhow!("invalid postman source config: {e}"))?;

    let proxy = config.proxy_url.clone().unwrap_or_else(|| DEFAULT_PROXY.to_string());
    let response = ctx
        .http
        .get(&proxy)
        .query(&[("url", config.collection_url.as_str())])
        .send()
        .await?
        .error_for_status()?;
    let collection: Value = response.json().await?;

    let collection_variables = extract_variables(collection.get("variable"));
    let mut variables = config.environment.clone();
    variables.extend(collection_variables);

    let auth_headers = if config.api_key.is_empty() {
        HashMap::new()
    } else {
        HashMap::from([("Authorization".to_string(), format!("Bearer {}", config.api_key))])
    };

    let mut builder = PathBuilder::new();
    let mut tools = Vec::new();
    let mut warnings = Vec::new();

    let Some(items) = collection.get("item").and_then(Value::as_array) else {
        warnings.push(format!("'{}' collection has no items", source.name));
        return Ok(SourceLoadResult { tools, warnings, ref_hint_table: None });
    };

    walk_items(items, &[], source, &variables, &auth_headers, &mut builder, &mut tools, &mut warnings);

    Ok(SourceLoadResult { tools, warnings, ref_hint_table: None })
}

fn extract_variables(value: Option<&Value>) -> HashMap<String, String> {
    let Some(arr) = value.and_then(Value::as_array) else { return HashMap::new() };
    arr.iter()
        .filter_map(|entry| {
            let key = entry.get("key")?.as_str()?;
            let value = entry.get("value").and_then(Value::as_str).unwrap_or("");
            Some((key.to_string(), value.to_string()))
        })
        .collect()
}

fn walk_items(
    items: &[Value],
    folder_path: &[String],
    source: &ToolSource,
    variables: &HashMap<String, String>,
    auth_headers: &HashMap<String, String>,
    builder: &mut PathBuilder,
    tools: &mut Vec<ToolDefinition>,
    warnings: &mut Vec<String>,
) {
    for item in items {
        let name = item.get("name").and_then(Value::as_str).unwrap_or("unnamed").to_string();
        if let Some(children) = item.get("item").and_then(Value::as_array) {
            let mut nested = folder_path.to_vec();
            nested.push(name);
            walk_items(children, &nested, source, variables, auth_headers, builder, tools, warnings);
            continue;
        }

        let Some(request) = item.get("request") else { continue };
        match compile_request(request, &name, folder_path, source, variables, auth_headers, builder) {
            Some(tool) => tools.push(tool),
            None => warnings.push(format!("'{}' request '{}' has no resolvable URL", source.name, name)),
        }
    }
}

fn compile_request(
    request: &Value,
    name: &str,
    folder_path: &[String],
    source: &ToolSource,
    variables: &HashMap<String, String>,
    auth_headers: &HashMap<String, String>,
    builder: &mut PathBuilder,
) -> Option<ToolDefinition> {
    let method = request.get("method").and_then(Value::as_str).unwrap_or("GET").to_uppercase();
    let url_raw = match request.get("url") {
        Some(Value::String(s)) => s.clone(),
        Some(obj) => obj.get("raw").and_then(Value::as_str)?.to_string(),
        None => return None,
    };

    let query = request
        .get("url")
        .and_then(|u| u.get("query"))
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|e| {
                    let key = e.get("key")?.as_str()?.to_string();
                    let value = e.get("value").and_then(Value::as_str).unwrap_or("").to_string();
                    Some((key, value))
                })
                .collect()
        })
        .unwrap_or_default();

    let headers = request
        .get("header")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|e| {
                    let key = e.get("key")?.as_str()?.to_string();
                    let value = e.get("value").and_then(Value::as_str).unwrap_or("").to_string();
                    Some((key, value))
                })
                .collect()
        })
        .unwrap_or_default();

    let body = compile_body(request.get("body"));

    let tag = folder_path.join("_");
    let path = builder.build(&source.name, &tag, name);
    let approval = if matches!(method.as_str(), "GET" | "HEAD" | "OPTIONS") {
        ApprovalMode::Auto
    } else {
        ApprovalMode::Required
    };

    let run_spec = RunSpec::Postman {
        method,
        url: url_raw,
        headers,
        query,
        body,
        variables: variables.clone(),
        auth_headers: auth_headers.clone(),
    };
    let run = build_run_closure(run_spec.clone());

    Some(ToolDefinition {
        path,
        source: format!("postman:{}", source.name),
        approval,
        description: request.get("description").and_then(Value::as_str).unwrap_or(name).to_string(),
        typing: ToolTyping::default(),
        credential: None,
        run_spec,
        run,
    })
}

fn compile_body(body: Option<&Value>) -> PostmanBody {
    let Some(body) = body else { return PostmanBody::None };
    match body.get("mode").and_then(Value::as_str) {
        Some("urlencoded") => {
            let entries = body
                .get("urlencoded")
                .and_then(Value::as_array)
                .map(|arr| {
                    arr.iter()
                        .filter_map(|e| {
                            let key = e.get("key")?.as_str()?.to_string();
                            let value = e.get("value").and_then(Value::as_str).unwrap_or("").to_string();
                            Some((key, value))
                        })
                        .collect()
                })
                .unwrap_or_default();
            PostmanBody::Urlencoded { entries }
        }
        Some("raw") => {
            let content = body.get("raw").and_then(Value::as_str).unwrap_or("").to_string();
            let content_type = body
                .get("options")
                .and_then(|o| o.get("raw"))
                .and_then(|r| r.get("language"))
                .and_then(Value::as_str)
                .map(|lang| match lang {
                    "json" => "application/json".to_string(),
                    other => format!("text/{other}"),
                });
            PostmanBody::Raw { content, content_type }
        }
        _ => PostmanBody::None,
    }
}

fn build_run_closure(run_spec: RunSpec) -> crate::model::RunFn {
    Arc::new(move |args: ExecutionArgs, input: Value| {
        let run_spec = run_spec.clone();
        Box::pin(async move { crate::executors::postman::execute(&run_spec, args, input).await })
    })
}
