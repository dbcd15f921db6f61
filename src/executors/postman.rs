//! Interpolates `{{var}}` templates against `collection ⊕ environment ⊕
//! caller.variables`, merges query/header overrides, and sends the body per
//! its declared mode.

use std::collections::HashMap;

use regex::Regex;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use std::sync::LazyLock;

use crate::events::truncate_error_body;
use crate::model::{ExecutionArgs, PostmanBody, RunSpec};

use super::{apply_credential, http_client};

const ERROR_BODY_PREVIEW: usize = 500;
static TEMPLATE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{\{([^{}]+)\}\}").unwrap());

pub async fn execute(run_spec: &RunSpec, args: ExecutionArgs, input: Value) -> anyhow::Result<Value> {
    let RunSpec::Postman {
        method,
        url,
        headers,
        query,
        body,
        variables,
        auth_headers,
    } = run_spec
    else {
        anyhow::bail!("postman executor invoked with a non-postman run-spec");
    };

    let mut vars = variables.clone();
    if let Some(overrides) = input.get("variables").and_then(Value::as_object) {
        for (k, v) in overrides {
            vars.insert(k.clone(), scalar_to_string(v));
        }
    }

    let interpolated_url = interpolate(url, &vars)?;

    let mut final_query: Vec<(String, String)> = Vec::with_capacity(query.len());
    for (k, v) in query {
        final_query.push((k.clone(), interpolate(v, &vars)?));
    }
    if let Some(overrides) = input.get("query").and_then(Value::as_object) {
        for (k, v) in overrides {
            final_query.push((k.clone(), scalar_to_string(v)));
        }
    }

    let mut header_map = HeaderMap::new();
    for (k, v) in headers.iter().chain(auth_headers.iter()) {
        let rendered = interpolate(v, &vars)?;
        if let (Ok(name), Ok(value)) = (HeaderName::try_from(k.as_str()), HeaderValue::from_str(&rendered)) {
            header_map.insert(name, value);
        }
    }
    if let Some(overrides) = input.get("headers").and_then(Value::as_object) {
        for (k, v) in overrides {
            let rendered = scalar_to_string(v);
            if let (Ok(name), Ok(value)) = (HeaderName::try_from(k.as_str()), HeaderValue::from_str(&rendered)) {
                header_map.insert(name, value);
            }
        }
    }
    apply_credential(&mut header_map, &args.credential);

    let method: reqwest::Method = method.parse().unwrap_or(reqwest::Method::GET);
    let mut request = http_client().request(method, &interpolated_url).headers(header_map).query(&final_query);

    request = match body {
        PostmanBody::None => request,
        PostmanBody::Urlencoded { entries } => {
            let mut rendered = Vec::with_capacity(entries.len());
            for (k, v) in entries {
                rendered.push((k.clone(), interpolate(v, &vars)?));
            }
            request.form(&rendered)
        }
        PostmanBody::Raw { content, content_type } => {
            let rendered = interpolate(content, &vars)?;
            let request = request.body(rendered);
            match content_type {
                Some(ct) => request.header(reqwest::header::CONTENT_TYPE, ct),
                None => request,
            }
        }
    };

    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        anyhow::bail!("HTTP {} {}: {}", status.as_u16(), status.canonical_reason().unwrap_or(""), truncate_error_body(&text, ERROR_BODY_PREVIEW));
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    if content_type.contains("application/json") {
        Ok(response.json().await.unwrap_or(Value::Null))
    } else {
        Ok(Value::String(response.text().await.unwrap_or_default()))
    }
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Replace every `{{key}}` with its resolved value; any template left
/// unresolved is a fatal error since it almost always means a required
/// path segment never got a value.
fn interpolate(template: &str, vars: &HashMap<String, String>) -> anyhow::Result<String> {
    let mut unresolved = Vec::new();
    let rendered = TEMPLATE.replace_all(template, |caps: &regex::Captures| {
        let key = caps[1].trim();
        vars.get(key).cloned().unwrap_or_else(|| {
            unresolved.push(key.to_string());
            String::new()
        })
    });
    if !unresolved.is_empty() {
        anyhow::bail!("unresolved template variable(s): {}", unresolved.join(", "));
    }
    Ok(rendered.into_owned())
}
