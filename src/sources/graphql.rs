//! GraphQL source loader: runs an extended introspection query, then emits
//! one raw-query tool plus one generated pseudo-tool per root `Query`/
//! `Mutation` field.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Mutex};

use serde_json::Value;

use crate::model::{ApprovalMode, ExecutionArgs, RunSpec, ToolDefinition, ToolSource, ToolTyping};
use crate::util::PathBuilder;

use super::{LoadContext, SourceLoadResult};

const MAX_SELECTION_DEPTH: usize = 3;
const PREFERRED_LEAVES: &[&str] = &["id", "identifier", "key", "name", "title", "number", "url", "success"];
const NESTED_CONTAINERS: &[&str] = &["nodes", "edges", "items"];

/// Parsed `__schema.types` lookup tables, cached per source so an unchanged
/// source skips re-deriving the by-name map on every rebuild. Introspection
/// is still fetched over HTTP on every `load()` call — only the in-process
/// parse of that response into `type_map` is cached.
static TYPE_MAP_CACHE: LazyLock<Mutex<HashMap<String, Arc<HashMap<String, Value>>>>> = LazyLock::new(|| Mutex::new(HashMap::new()));

fn type_map_cache_key(source: &ToolSource) -> String {
    format!("{}:{}", source.id, source.updated_at)
}

const INTROSPECTION_QUERY: &str = r#"
query IntrospectionQuery {
  __schema {
    queryType { name }
    mutationType { name }
    types {
      kind
      name
      fields(includeDeprecated: true) {
        name
        args(includeDeprecated: true) { name type { ...TypeRef } }
        type { ...TypeRef }
      }
      inputFields(includeDeprecated: true) { name type { ...TypeRef } }
    }
  }
}
fragment TypeRef on __Type {
  kind
  name
  ofType {
    kind
    name
    ofType {
      kind
      name
      ofType { kind name ofType { kind name ofType { kind name } } }
    }
  }
}
"#;

pub async fn load(source: &ToolSource, ctx: &LoadContext<'_>) -> anyhow::Result<SourceLoadResult> {
    let config: crate::config::GraphqlSourceConfig = serde_json::from_value(source.config.clone())
        .map_err(|e| anyhow::anyhow!("invalid graphql source config: {e}"))?;

    let auth_headers = if config.api_key.is_empty() {
        HashMap::new()
    } else {
        HashMap::from([("Authorization".to_string(), format!("Bearer {}", config.api_key))])
    };

    let mut request = ctx.http.post(&config.endpoint).json(&serde_json::json!({
        "query": INTROSPECTION_QUERY,
        "variables": {},
    }));
    for (key, value) in config.headers.iter().chain(auth_headers.iter()) {
        request = request.header(key, value);
    }
    let response: Value = request.send().await?.error_for_status()?.json().await?;

    if let Some(errors) = response.get("errors").and_then(Value::as_array) {
        let rendered = errors
            .iter()
            .filter_map(|e| e.get("message").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("; ");
        if rendered.to_lowercase().contains("unknown argument") && rendered.contains("includeDeprecated") {
            anyhow::bail!("introspection failed: server does not support includeDeprecated ({rendered})");
        }
        anyhow::bail!("introspection failed: {rendered}");
    }

    let schema = response
        .get("data")
        .and_then(|d| d.get("__schema"))
        .ok_or_else(|| anyhow::anyhow!("introspection response missing __schema"))?;

    let cache_key = type_map_cache_key(source);
    let cached = TYPE_MAP_CACHE.lock().unwrap().get(&cache_key).cloned();
    let type_map = match cached {
        Some(map) => map,
        None => {
            let types = schema.get("types").and_then(Value::as_array).cloned().unwrap_or_default();
            let parsed: HashMap<String, Value> = types
                .into_iter()
                .filter_map(|t| t.get("name").and_then(Value::as_str).map(|n| (n.to_string(), t.clone())))
                .collect();
            let parsed = Arc::new(parsed);
            TYPE_MAP_CACHE.lock().unwrap().insert(cache_key, parsed.clone());
            parsed
        }
    };

    let mut builder = PathBuilder::new();
    let mut tools = Vec::new();

    tools.push(build_raw_tool(source, &config.endpoint, &auth_headers, &mut builder));

    for (kind, type_name_key) in [("query", "queryType"), ("mutation", "mutationType")] {
        let Some(root_name) = schema.get(type_name_key).and_then(|t| t.get("name")).and_then(Value::as_str) else { continue };
        let Some(root_type) = type_map.get(root_name) else { continue };
        let Some(fields) = root_type.get("fields").and_then(Value::as_array) else { continue };
        for field in fields {
            tools.push(build_field_tool(source, &config.endpoint, &auth_headers, kind, field, &type_map, &mut builder));
        }
    }

    Ok(SourceLoadResult { tools, warnings: Vec::new(), ref_hint_table: None })
}

fn innermost_named(type_ref: &Value) -> Option<(String, String)> {
    let mut cur = type_ref;
    loop {
        let kind = cur.get("kind")?.as_str()?;
        if kind == "NON_NULL" || kind == "LIST" {
            cur = cur.get("ofType")?;
            continue;
        }
        return Some((cur.get("name")?.as_str()?.to_string(), kind.to_string()));
    }
}

fn type_ref_to_graphql_string(type_ref: &Value) -> String {
    match type_ref.get("kind").and_then(Value::as_str) {
        Some("NON_NULL") => format!("{}!", type_ref_to_graphql_string(type_ref.get("ofType").unwrap_or(&Value::Null))),
        Some("LIST") => format!("[{}]", type_ref_to_graphql_string(type_ref.get("ofType").unwrap_or(&Value::Null))),
        _ => type_ref.get("name").and_then(Value::as_str).unwrap_or("String").to_string(),
    }
}

fn build_selection(type_name: &str, type_map: &HashMap<String, Value>, depth: usize) -> Option<String> {
    if depth == 0 {
        return None;
    }
    let ty = type_map.get(type_name)?;
    let fields = ty.get("fields").and_then(Value::as_array)?;

    for leaf in PREFERRED_LEAVES {
        let Some(field) = fields.iter().find(|f| f.get("name").and_then(Value::as_str) == Some(*leaf)) else { continue };
        let Some((_, kind)) = field.get("type").and_then(innermost_named) else { continue };
        if matches!(kind.as_str(), "SCALAR" | "ENUM") {
            return Some(format!("{{ {leaf} }}"));
        }
    }

    for container in NESTED_CONTAINERS {
        let Some(field) = fields.iter().find(|f| f.get("name").and_then(Value::as_str) == Some(*container)) else { continue };
        let Some((inner_name, inner_kind)) = field.get("type").and_then(innermost_named) else { continue };
        if matches!(inner_kind.as_str(), "OBJECT" | "INTERFACE") {
            if let Some(inner_selection) = build_selection(&inner_name, type_map, depth - 1) {
                return Some(format!("{{ {container} {inner_selection} }}"));
            }
        }
    }
    None
}

fn build_raw_tool(source: &ToolSource, endpoint: &str, auth_headers: &HashMap<String, String>, builder: &mut PathBuilder) -> ToolDefinition {
    let path = builder.build_flat(&source.name, "graphql_raw");
    let run_spec = RunSpec::GraphqlRaw {
        endpoint: endpoint.to_string(),
        auth_headers: auth_headers.clone(),
    };
    let run = build_raw_run_closure(run_spec.clone());
    ToolDefinition {
        path,
        source: format!("graphql:{}", source.name),
        approval: ApprovalMode::Auto,
        description: format!("Run a raw GraphQL query or mutation against {}.", source.name),
        typing: ToolTyping {
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {"query": {"type": "string"}, "variables": {"type": "object"}},
                "required": ["query"],
            }),
            ..ToolTyping::default()
        },
        credential: None,
        run_spec,
        run,
    }
}

fn build_field_tool(
    source: &ToolSource,
    endpoint: &str,
    auth_headers: &HashMap<String, String>,
    kind: &str,
    field: &Value,
    type_map: &HashMap<String, Value>,
    builder: &mut PathBuilder,
) -> ToolDefinition {
    let field_name = field.get("name").and_then(Value::as_str).unwrap_or("field").to_string();
    let path = builder.build(&source.name, kind, &field_name);

    let args = field.get("args").and_then(Value::as_array).cloned().unwrap_or_default();
    let variables: Vec<(String, String)> = args
        .iter()
        .filter_map(|a| {
            let name = a.get("name")?.as_str()?.to_string();
            let type_str = type_ref_to_graphql_string(a.get("type")?);
            Some((name, type_str))
        })
        .collect();

    let mut properties = serde_json::Map::new();
    let mut required = Vec::new();
    for (name, type_str) in &variables {
        properties.insert(name.clone(), serde_json::json!({"type": "string", "description": type_str}));
        if type_str.ends_with('!') {
            required.push(name.clone());
        }
    }

    let selection = field
        .get("type")
        .and_then(innermost_named)
        .filter(|(_, kind)| matches!(kind.as_str(), "OBJECT" | "INTERFACE"))
        .and_then(|(name, _)| build_selection(&name, type_map, MAX_SELECTION_DEPTH))
        .unwrap_or_else(|| "{ __typename }".to_string());

    let run_spec = RunSpec::GraphqlField {
        endpoint: endpoint.to_string(),
        operation_type: kind.to_string(),
        field_name: field_name.clone(),
        selection,
        variables,
        auth_headers: auth_headers.clone(),
    };
    let run = build_field_run_closure(run_spec.clone());

    let approval = if kind == "mutation" { ApprovalMode::Required } else { ApprovalMode::Auto };

    ToolDefinition {
        path,
        source: format!("graphql:{}", source.name),
        approval,
        description: format!("{kind} {field_name} on {}.", source.name),
        typing: ToolTyping {
            input_schema: serde_json::json!({"type": "object", "properties": properties, "required": required}),
            required_input_keys: (!required.is_empty()).then_some(required),
            ..ToolTyping::default()
        },
        credential: None,
        run_spec,
        run,
    }
}

fn build_raw_run_closure(run_spec: RunSpec) -> crate::model::RunFn {
    Arc::new(move |args: ExecutionArgs, input: Value| {
        let run_spec = run_spec.clone();
        Box::pin(async move { crate::executors::graphql::execute_raw(&run_spec, args, input).await })
    })
}

fn build_field_run_closure(run_spec: RunSpec) -> crate::model::RunFn {
    Arc::new(move |args: ExecutionArgs, input: Value| {
        let run_spec = run_spec.clone();
        Box::pin(async move { crate::executors::graphql::execute_field(&run_spec, args, input).await })
    })
}
