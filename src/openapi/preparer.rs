use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::model::{CredentialAuthType, CredentialMode};
use crate::util::{compact_hint, RefHintTable};

const MAX_BUNDLE_DEPTH: usize = 40;
const MAX_HTTP_BODY_BYTES: usize = 16 * 1024 * 1024;

pub enum OpenApiSpecInput {
    Url(String),
    Inline(Value),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DtsStatus {
    Ready,
    Failed,
    Skipped,
}

#[derive(Debug, Clone)]
pub struct InferredAuth {
    pub auth_type: CredentialAuthType,
    pub header_name: Option<String>,
    pub mode: CredentialMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterMeta {
    pub name: String,
    pub location: String,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explode: Option<bool>,
    pub allow_reserved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PreparedOperation {
    pub method: String,
    pub path_template: String,
    pub operation_id: String,
    pub tag: String,
    pub description: String,
    pub input_schema: Value,
    pub output_schema: Option<Value>,
    pub input_hint: String,
    pub output_hint: String,
    pub required_input_keys: Vec<String>,
    pub parameters_meta: Vec<ParameterMeta>,
    pub has_body: bool,
}

pub struct PreparedSpec {
    pub servers: Vec<String>,
    pub operations: Vec<PreparedOperation>,
    pub dts: Option<String>,
    pub dts_status: DtsStatus,
    pub inferred_auth: Option<InferredAuth>,
    pub ref_hint_table: RefHintTable,
    pub warnings: Vec<String>,
}

/// External type-declaration generator (e.g. an OpenAPI-to-TypeScript
/// pipeline). This core never parses the generated output — it is treated
/// as an opaque blob referenced by operation id — and degrades to the
/// schema-first display hints when unconfigured or failing.
pub trait TypeDeclarationGenerator: Send + Sync {
    fn generate(&self, bundled_document: &Value) -> Result<String, String>;
}

pub async fn prepare(
    input: OpenApiSpecInput,
    http: &reqwest::Client,
    type_generator: Option<&dyn TypeDeclarationGenerator>,
) -> anyhow::Result<PreparedSpec> {
    let doc = fetch_and_parse(input, http).await?;

    let mut warnings = Vec::new();
    if serde_json::from_value::<openapiv3::OpenAPI>(doc.clone()).is_err() {
        warnings.push(
            "document did not validate as a well-formed OpenAPI document; proceeding with best-effort extraction".to_string(),
        );
    }

    let servers = doc
        .get("servers")
        .and_then(Value::as_array)
        .map(|a| {
            a.iter()
                .filter_map(|s| s.get("url").and_then(Value::as_str).map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    let ref_hint_table = build_ref_hint_table(&doc);
    let inferred_auth = infer_auth(&doc);
    let operations = extract_operations(&doc, &ref_hint_table, &mut warnings);

    let (dts, dts_status) = match type_generator {
        None => (None, DtsStatus::Skipped),
        Some(generator) => match generator.generate(&doc) {
            Ok(declarations) => (Some(declarations), DtsStatus::Ready),
            Err(reason) => {
                debug!(reason, "initial type generation failed, checking for broken discriminators");
                let (patched, dropped) = patch_broken_discriminators(&doc);
                if dropped.is_empty() {
                    warnings.push(format!("type generation failed: {reason}"));
                    (None, DtsStatus::Failed)
                } else {
                    match generator.generate(&patched) {
                        Ok(declarations) => {
                            warnings.push(format!(
                                "type generation succeeded after dropping discriminators with dangling mappings: {}",
                                dropped.join(", ")
                            ));
                            (Some(declarations), DtsStatus::Ready)
                        }
                        Err(retry_reason) => {
                            warnings.push(format!("type generation failed after discriminator patch retry: {retry_reason}"));
                            (None, DtsStatus::Failed)
                        }
                    }
                }
            }
        },
    };

    Ok(PreparedSpec {
        servers,
        operations,
        dts,
        dts_status,
        inferred_auth,
        ref_hint_table,
        warnings,
    })
}

async fn fetch_and_parse(input: OpenApiSpecInput, http: &reqwest::Client) -> anyhow::Result<Value> {
    let text = match input {
        OpenApiSpecInput::Inline(v) => return Ok(v),
        OpenApiSpecInput::Url(url) => {
            let resp = http.get(&url).send().await?.error_for_status()?;
            let bytes = resp.bytes().await?;
            if bytes.len() > MAX_HTTP_BODY_BYTES {
                anyhow::bail!("OpenAPI document at {url} exceeds the {MAX_HTTP_BODY_BYTES}-byte limit");
            }
            String::from_utf8(bytes.to_vec())?
        }
    };

    if let Ok(v) = serde_json::from_str::<Value>(&text) {
        return Ok(v);
    }
    serde_yaml::from_str::<Value>(&text).map_err(|e| anyhow::anyhow!("failed to parse OpenAPI document as JSON or YAML: {e}"))
}

/// Resolve a `#/a/b/c` JSON pointer against `doc`.
fn resolve_pointer<'a>(doc: &'a Value, pointer: &str) -> Option<&'a Value> {
    let path = pointer.strip_prefix("#/")?;
    let mut current = doc;
    for segment in path.split('/') {
        let segment = segment.replace("~1", "/").replace("~0", "~");
        current = match current {
            Value::Object(map) => map.get(&segment)?,
            Value::Array(arr) => arr.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn ref_component_name(reference: &str) -> &str {
    reference.rsplit('/').next().unwrap_or(reference)
}

/// Fully inline every `$ref` reachable from `value`, guarding against cycles
/// and runaway depth with a permissive `true` schema in their place.
fn bundle_value(value: &Value, doc: &Value, depth: usize, visited: &mut HashSet<String>) -> Value {
    if depth >= MAX_BUNDLE_DEPTH {
        return Value::Bool(true);
    }

    match value {
        Value::Object(map) => {
            if let Some(Value::String(reference)) = map.get("$ref") {
                if !reference.starts_with("#/") {
                    return value.clone();
                }
                let name = ref_component_name(reference).to_string();
                if !visited.insert(name.clone()) {
                    return Value::Bool(true);
                }
                let resolved = resolve_pointer(doc, reference)
                    .map(|v| bundle_value(v, doc, depth + 1, visited))
                    .unwrap_or(Value::Bool(true));
                visited.remove(&name);
                return resolved;
            }
            let mut out = Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), bundle_value(v, doc, depth + 1, visited));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|v| bundle_value(v, doc, depth + 1, visited))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// One compact hint per component schema, rendered without inlining nested
/// refs (nested refs fall back to their bare name), so `compact_hint` can
/// show a meaningful signature without expanding huge schemas.
fn build_ref_hint_table(doc: &Value) -> RefHintTable {
    let mut table = RefHintTable::new();
    let Some(schemas) = doc
        .get("components")
        .and_then(|c| c.get("schemas"))
        .and_then(Value::as_object)
    else {
        return table;
    };
    for (name, schema) in schemas {
        table.insert(name.clone(), compact_hint(schema, &RefHintTable::new()));
    }
    table
}

fn infer_auth(doc: &Value) -> Option<InferredAuth> {
    let schemes = doc
        .get("components")
        .and_then(|c| c.get("securitySchemes"))
        .and_then(Value::as_object)?;

    for scheme in schemes.values() {
        let ty = scheme.get("type").and_then(Value::as_str)?;
        let inferred = match ty {
            "http" => match scheme.get("scheme").and_then(Value::as_str) {
                Some("bearer") => Some((CredentialAuthType::Bearer, None)),
                Some("basic") => Some((CredentialAuthType::Basic, None)),
                _ => None,
            },
            "apiKey" if scheme.get("in").and_then(Value::as_str) == Some("header") => {
                let header = scheme.get("name").and_then(Value::as_str).map(str::to_string);
                Some((CredentialAuthType::ApiKey, header))
            }
            "oauth2" | "openIdConnect" => Some((CredentialAuthType::Bearer, None)),
            _ => None,
        };
        if let Some((auth_type, header_name)) = inferred {
            return Some(InferredAuth {
                auth_type,
                header_name,
                mode: CredentialMode::Workspace,
            });
        }
    }
    None
}

const METHODS: &[&str] = &["get", "put", "post", "delete", "options", "head", "patch", "trace"];
const READ_METHODS: &[&str] = &["get", "head", "options"];

fn extract_operations(doc: &Value, ref_hint_table: &RefHintTable, warnings: &mut Vec<String>) -> Vec<PreparedOperation> {
    let mut out = Vec::new();
    let Some(paths) = doc.get("paths").and_then(Value::as_object) else {
        return out;
    };

    for (path_template, path_item) in paths {
        let Some(path_item) = path_item.as_object() else { continue };
        let shared_params = path_item
            .get("parameters")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        for method in METHODS {
            let Some(operation) = path_item.get(*method) else { continue };
            let Some(operation) = operation.as_object() else { continue };

            let operation_id = operation
                .get("operationId")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("{method}_{}", path_template.trim_matches('/').replace('/', "_")));

            let tag = operation
                .get("tags")
                .and_then(Value::as_array)
                .and_then(|t| t.first())
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string();

            let description = operation
                .get("description")
                .or_else(|| operation.get("summary"))
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string();

            let mut own_params = operation
                .get("parameters")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            let mut merged_params = shared_params.clone();
            merged_params.append(&mut own_params);

            let (input_schema, parameters_meta, required_input_keys) =
                build_input_schema(doc, &merged_params, operation.get("requestBody"));

            let (output_schema, is_void) = build_output_schema(doc, operation.get("responses"));

            let input_hint = compact_hint(&input_schema, ref_hint_table);
            let output_hint = if is_void {
                crate::util::schema_hint::VOID_HINT.to_string()
            } else {
                output_schema
                    .as_ref()
                    .map(|s| compact_hint(s, ref_hint_table))
                    .unwrap_or_else(|| crate::util::schema_hint::VOID_HINT.to_string())
            };

            let has_body = operation.get("requestBody").is_some();

            out.push(PreparedOperation {
                method: method.to_uppercase(),
                path_template: path_template.clone(),
                operation_id,
                tag,
                description,
                input_schema,
                output_schema,
                input_hint,
                output_hint,
                required_input_keys,
                parameters_meta,
                has_body,
            });
        }
    }

    if out.is_empty() {
        warnings.push("no operations found in OpenAPI document".to_string());
    }
    out
}

fn build_input_schema(
    doc: &Value,
    parameters: &[Value],
    request_body: Option<&Value>,
) -> (Value, Vec<ParameterMeta>, Vec<String>) {
    let mut properties = Map::new();
    let mut required = Vec::new();
    let mut metas = Vec::new();
    let mut visited = HashSet::new();

    for param in parameters {
        let resolved = bundle_value(param, doc, 0, &mut visited);
        let Some(obj) = resolved.as_object() else { continue };
        let Some(name) = obj.get("name").and_then(Value::as_str) else { continue };
        let location = obj.get("in").and_then(Value::as_str).unwrap_or("query").to_string();
        let is_required = obj.get("required").and_then(Value::as_bool).unwrap_or(false) || location == "path";
        let schema = obj.get("schema").cloned().unwrap_or(serde_json::json!({"type": "string"}));

        properties.insert(name.to_string(), schema);
        if is_required {
            required.push(name.to_string());
        }
        metas.push(ParameterMeta {
            name: name.to_string(),
            location,
            required: is_required,
            style: obj.get("style").and_then(Value::as_str).map(str::to_string),
            explode: obj.get("explode").and_then(Value::as_bool),
            allow_reserved: obj.get("allowReserved").and_then(Value::as_bool).unwrap_or(false),
            description: obj.get("description").and_then(Value::as_str).map(str::to_string),
        });
    }

    if let Some(body) = request_body {
        let bundled_body = bundle_value(body, doc, 0, &mut HashSet::new());
        if let Some(schema) = preferred_content_schema(&bundled_body) {
            let body_required = bundled_body.get("required").and_then(Value::as_bool).unwrap_or(false);
            properties.insert("body".to_string(), schema);
            if body_required {
                required.push("body".to_string());
            }
        }
    }

    let schema = serde_json::json!({
        "type": "object",
        "properties": properties,
        "required": required,
    });
    (schema, metas, required)
}

fn preferred_content_schema(body: &Value) -> Option<Value> {
    let content = body.get("content")?.as_object()?;
    content
        .get("application/json")
        .or_else(|| content.values().next())
        .and_then(|media| media.get("schema"))
        .cloned()
}

/// Returns `(schema, is_void)`. `is_void` is set for a 204/205-only response
/// set, or when no 2xx response carries a body.
fn build_output_schema(doc: &Value, responses: Option<&Value>) -> (Option<Value>, bool) {
    let Some(responses) = responses.and_then(Value::as_object) else {
        return (None, true);
    };

    let mut saw_2xx_status = false;
    let mut saw_no_content_status = false;
    for (status, response) in responses {
        if status == "default" {
            continue;
        }
        let Ok(code) = status.parse::<u16>() else { continue };
        if !(200..300).contains(&code) {
            continue;
        }
        saw_2xx_status = true;
        if code == 204 || code == 205 {
            saw_no_content_status = true;
            continue;
        }
        let bundled = bundle_value(response, doc, 0, &mut HashSet::new());
        if let Some(schema) = preferred_content_schema(&bundled) {
            return (Some(schema), false);
        }
    }

    (None, !saw_2xx_status || saw_no_content_status)
}

/// Drop `discriminator.mapping` entries whose `$ref` target does not exist
/// under `components.schemas`, returning the patched document and the list
/// of schema names that were touched.
fn patch_broken_discriminators(doc: &Value) -> (Value, Vec<String>) {
    let mut patched = doc.clone();
    let mut dropped = Vec::new();

    let Some(schemas) = patched
        .get("components")
        .and_then(|c| c.get("schemas"))
        .and_then(Value::as_object)
        .cloned()
    else {
        return (patched, dropped);
    };

    let known_names: HashSet<&str> = schemas.keys().map(String::as_str).collect();

    if let Some(schemas_mut) = patched
        .get_mut("components")
        .and_then(|c| c.get_mut("schemas"))
        .and_then(Value::as_object_mut)
    {
        for (name, schema) in schemas_mut.iter_mut() {
            let Some(mapping) = schema
                .get_mut("discriminator")
                .and_then(|d| d.get_mut("mapping"))
                .and_then(Value::as_object_mut)
            else {
                continue;
            };
            let broken: Vec<String> = mapping
                .iter()
                .filter(|(_, target)| {
                    target
                        .as_str()
                        .map(|t| !known_names.contains(ref_component_name(t)))
                        .unwrap_or(false)
                })
                .map(|(k, _)| k.clone())
                .collect();
            if !broken.is_empty() {
                for key in &broken {
                    mapping.remove(key);
                }
                dropped.push(name.clone());
            }
        }
    }

    if !dropped.is_empty() {
        warn!(schemas = ?dropped, "dropped discriminator mappings pointing at non-existent schemas");
    }
    (patched, dropped)
}

impl ParameterMeta {
    pub fn is_read_method_default(method: &str) -> bool {
        READ_METHODS.contains(&method.to_lowercase().as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_doc() -> Value {
        json!({
            "openapi": "3.0.0",
            "info": {"title": "t", "version": "1"},
            "servers": [{"url": "https://api.example.com"}],
            "paths": {
                "/repos/{owner}/{repo}": {
                    "get": {
                        "operationId": "getRepo",
                        "tags": ["repos"],
                        "description": "Get a repo",
                        "parameters": [
                            {"name": "owner", "in": "path", "required": true, "schema": {"type": "string"}},
                            {"name": "repo", "in": "path", "required": true, "schema": {"type": "string"}},
                        ],
                        "responses": {
                            "200": {
                                "description": "ok",
                                "content": {"application/json": {"schema": {"$ref": "#/components/schemas/Repo"}}},
                            }
                        },
                    },
                    "delete": {
                        "operationId": "deleteRepo",
                        "tags": ["repos"],
                        "parameters": [
                            {"name": "owner", "in": "path", "required": true, "schema": {"type": "string"}},
                            {"name": "repo", "in": "path", "required": true, "schema": {"type": "string"}},
                        ],
                        "responses": {"204": {"description": "no content"}},
                    },
                }
            },
            "components": {
                "schemas": {
                    "Repo": {"type": "object", "properties": {"id": {"type": "integer"}, "name": {"type": "string"}}, "required": ["id"]},
                },
                "securitySchemes": {
                    "bearerAuth": {"type": "http", "scheme": "bearer"},
                },
            },
        })
    }

    #[test]
    fn extracts_operations_with_resolved_responses() {
        let doc = sample_doc();
        let table = build_ref_hint_table(&doc);
        let mut warnings = Vec::new();
        let ops = extract_operations(&doc, &table, &mut warnings);
        assert_eq!(ops.len(), 2);
        let get_op = ops.iter().find(|o| o.operation_id == "getRepo").unwrap();
        assert_eq!(get_op.method, "GET");
        assert!(get_op.output_hint.contains("id"));
        assert_eq!(get_op.required_input_keys, vec!["owner", "repo"]);
    }

    #[test]
    fn no_content_response_yields_void_output_hint() {
        let doc = sample_doc();
        let table = build_ref_hint_table(&doc);
        let mut warnings = Vec::new();
        let ops = extract_operations(&doc, &table, &mut warnings);
        let delete_op = ops.iter().find(|o| o.operation_id == "deleteRepo").unwrap();
        assert_eq!(delete_op.output_hint, "void");
        assert!(delete_op.output_schema.is_none());
    }

    #[test]
    fn infers_bearer_auth_from_http_scheme() {
        let doc = sample_doc();
        let auth = infer_auth(&doc).unwrap();
        assert_eq!(auth.auth_type, CredentialAuthType::Bearer);
        assert_eq!(auth.mode, CredentialMode::Workspace);
    }

    #[test]
    fn bundle_value_breaks_cycles_with_permissive_schema() {
        let doc = json!({
            "components": {
                "schemas": {
                    "Node": {"type": "object", "properties": {"next": {"$ref": "#/components/schemas/Node"}}},
                }
            }
        });
        let start = json!({"$ref": "#/components/schemas/Node"});
        let bundled = bundle_value(&start, &doc, 0, &mut HashSet::new());
        // Should terminate and produce a nested object whose innermost cycle
        // point degrades to a permissive `true` schema.
        let next = bundled["properties"]["next"].clone();
        assert!(next.is_object() || next.is_boolean());
    }

    #[test]
    fn discriminator_patch_drops_only_broken_mappings() {
        let doc = json!({
            "components": {
                "schemas": {
                    "Pet": {
                        "discriminator": {
                            "propertyName": "kind",
                            "mapping": {"dog": "#/components/schemas/Dog", "cat": "#/components/schemas/Missing"}
                        }
                    },
                    "Dog": {"type": "object"},
                }
            }
        });
        let (patched, dropped) = patch_broken_discriminators(&doc);
        assert_eq!(dropped, vec!["Pet".to_string()]);
        let mapping = &patched["components"]["schemas"]["Pet"]["discriminator"]["mapping"];
        assert!(mapping.get("dog").is_some());
        assert!(mapping.get("cat").is_none());
    }
}
