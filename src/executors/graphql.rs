//! POSTs `{query, variables}`, treating `errors` as fatal only when `data`
//! carries nothing useful (the "partial success" pattern where field-level
//! errors can accompany a usable response).

use std::collections::{HashMap, HashSet};

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;

use crate::model::{ExecutionArgs, ResolvedCredential, RunSpec};

use super::{apply_credential, http_client};

pub async fn execute_raw(run_spec: &RunSpec, args: ExecutionArgs, input: Value) -> anyhow::Result<Value> {
    let RunSpec::GraphqlRaw { endpoint, auth_headers } = run_spec else {
        anyhow::bail!("graphql executor invoked with a non-graphql_raw run-spec");
    };

    let query = input
        .get("query")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow::anyhow!("graphql_raw requires a 'query' string input"))?;
    let variables = input.get("variables").cloned().unwrap_or(Value::Object(Default::default()));

    post_graphql(endpoint, auth_headers, &args.credential, query, variables).await
}

pub async fn execute_field(run_spec: &RunSpec, args: ExecutionArgs, input: Value) -> anyhow::Result<Value> {
    let RunSpec::GraphqlField {
        endpoint,
        operation_type,
        field_name,
        selection,
        variables,
        auth_headers,
    } = run_spec
    else {
        anyhow::bail!("graphql executor invoked with a non-graphql_field run-spec");
    };

    let var_decls = variables.iter().map(|(n, t)| format!("${n}: {t}")).collect::<Vec<_>>().join(", ");
    let arg_list = variables.iter().map(|(n, _)| format!("{n}: ${n}")).collect::<Vec<_>>().join(", ");
    let header = if var_decls.is_empty() { operation_type.clone() } else { format!("{operation_type}({var_decls})") };
    let call = if arg_list.is_empty() { field_name.clone() } else { format!("{field_name}({arg_list})") };
    let query = format!("{header} {{ {call} {selection} }}");

    let declared: HashSet<&str> = variables.iter().map(|(n, _)| n.as_str()).collect();
    let variable_values = if declared.len() == 1 && declared.contains("input") && input.get("input").is_none() {
        serde_json::json!({ "input": input })
    } else {
        let mut obj = serde_json::Map::new();
        if let Some(map) = input.as_object() {
            for (name, _) in variables {
                if let Some(value) = map.get(name) {
                    obj.insert(name.clone(), value.clone());
                }
            }
        }
        Value::Object(obj)
    };

    let data = post_graphql(endpoint, auth_headers, &args.credential, &query, variable_values).await?;
    Ok(data.get(field_name).cloned().unwrap_or(Value::Null))
}

async fn post_graphql(
    endpoint: &str,
    auth_headers: &HashMap<String, String>,
    credential: &Option<ResolvedCredential>,
    query: &str,
    variables: Value,
) -> anyhow::Result<Value> {
    let mut headers = HeaderMap::new();
    for (key, value) in auth_headers {
        if let (Ok(name), Ok(val)) = (HeaderName::try_from(key.as_str()), HeaderValue::from_str(value)) {
            headers.insert(name, val);
        }
    }
    apply_credential(&mut headers, credential);

    let response: Value = http_client()
        .post(endpoint)
        .headers(headers)
        .json(&serde_json::json!({ "query": query, "variables": variables }))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    let data = response.get("data").cloned().unwrap_or(Value::Null);
    if let Some(errors) = response.get("errors").and_then(Value::as_array) {
        if !errors.is_empty() && is_empty_data(&data) {
            let rendered = errors
                .iter()
                .filter_map(|e| e.get("message").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("; ");
            anyhow::bail!("graphql request failed: {rendered}");
        }
    }
    Ok(data)
}

fn is_empty_data(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(arr) => arr.is_empty(),
        _ => false,
    }
}
