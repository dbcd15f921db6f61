//! Substitutes path/query/header parameters, merges static and resolved
//! auth, and sends the body (if any) as JSON for non-read methods.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;

use crate::events::truncate_error_body;
use crate::model::{ExecutionArgs, RunSpec};
use crate::openapi::preparer::ParameterMeta;

use super::{apply_credential, http_client};

const ERROR_BODY_PREVIEW: usize = 500;

pub async fn execute(run_spec: &RunSpec, args: ExecutionArgs, input: Value) -> anyhow::Result<Value> {
    let RunSpec::OpenApi {
        base_url,
        method,
        path_template,
        parameters,
        auth_headers,
        credential_spec: _,
    } = run_spec
    else {
        anyhow::bail!("openapi executor invoked with a non-openapi run-spec");
    };

    let params: Vec<ParameterMeta> = serde_json::from_value(parameters.get("params").cloned().unwrap_or(Value::Null)).unwrap_or_default();
    let has_body = parameters.get("hasBody").and_then(Value::as_bool).unwrap_or(false);

    let mut path = path_template.clone();
    let mut query: Vec<(String, String)> = Vec::new();
    let mut headers = HeaderMap::new();

    for param in &params {
        let Some(value) = input.get(&param.name) else { continue };
        let rendered = scalar_to_string(value);
        match param.location.as_str() {
            "path" => {
                path = path.replace(&format!("{{{}}}", param.name), &urlencoding::encode(&rendered));
            }
            "query" => query.push((param.name.clone(), rendered)),
            "header" => {
                if let (Ok(name), Ok(val)) = (HeaderName::try_from(param.name.as_str()), HeaderValue::from_str(&rendered)) {
                    headers.insert(name, val);
                }
            }
            _ => {}
        }
    }

    for (name, value) in auth_headers {
        if let (Ok(name), Ok(val)) = (HeaderName::try_from(name.as_str()), HeaderValue::from_str(value)) {
            headers.insert(name, val);
        }
    }
    apply_credential(&mut headers, &args.credential);

    let url = format!("{}{}", base_url.trim_end_matches('/'), path);
    let method: reqwest::Method = method.parse().unwrap_or(reqwest::Method::GET);
    let is_read = matches!(method, reqwest::Method::GET | reqwest::Method::HEAD | reqwest::Method::OPTIONS);

    let mut request = http_client().request(method, &url).headers(headers).query(&query);
    if has_body && !is_read {
        if let Some(body) = input.get("body") {
            if !is_empty_body(body) {
                request = request.json(body);
            }
        }
    }

    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        anyhow::bail!("HTTP {} {}: {}", status.as_u16(), status.canonical_reason().unwrap_or(""), truncate_error_body(&body, ERROR_BODY_PREVIEW));
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

fn is_empty_body(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(arr) => arr.is_empty(),
        _ => false,
    }
}
