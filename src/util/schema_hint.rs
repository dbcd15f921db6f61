//! JSON-Schema -> compact display-hint rendering.
//!
//! Display hints must stay short and human-scannable — they are shown next
//! to a tool in discovery results and catalogs, not used for validation.

use serde_json::Value;
use std::collections::{HashMap, HashSet};

pub type RefHintTable = HashMap<String, String>;

const MAX_DEPTH: usize = 12;
const MAX_PROPERTIES: usize = 12;
const TRUNCATION_MARKER: &str = "[key: string]: any";
const MAX_MERGE_PARTS: usize = 8;
const MAX_MERGE_DEPTH: usize = 2;
const MAX_MERGE_LEN: usize = 400;

/// `outputHint` value for operations whose response has no body (204/205).
pub const VOID_HINT: &str = "void";
/// `inputHint` value for a schema with no required keys and no properties.
pub const EMPTY_HINT: &str = "{}";

/// Render a compact display hint for `schema`. `ref_table` supplies short
/// signature strings for component schemas referenced but not inlined.
pub fn compact_hint(schema: &Value, ref_table: &RefHintTable) -> String {
    let mut visited = HashSet::new();
    render(schema, ref_table, 0, &mut visited)
}

fn ref_name(reference: &str) -> String {
    reference
        .rsplit('/')
        .next()
        .unwrap_or(reference)
        .to_string()
}

fn render(schema: &Value, ref_table: &RefHintTable, depth: usize, visited: &mut HashSet<String>) -> String {
    if depth >= MAX_DEPTH {
        return "unknown".to_string();
    }

    let Some(obj) = schema.as_object() else {
        return "unknown".to_string();
    };

    if let Some(r) = obj.get("$ref").and_then(Value::as_str) {
        let name = ref_name(r);
        if !visited.insert(name.clone()) {
            // Cycle: replace the repeat with the ref name when we have a
            // hint for it, else fall back to `unknown`.
            return ref_table.get(&name).cloned().unwrap_or_else(|| "unknown".to_string());
        }
        let rendered = ref_table
            .get(&name)
            .cloned()
            .unwrap_or_else(|| name.clone());
        visited.remove(&name);
        return rendered;
    }

    if let Some(all_of) = obj.get("allOf").and_then(Value::as_array) {
        return render_intersection(all_of, ref_table, depth, visited);
    }

    if let Some(variants) = obj.get("anyOf").or_else(|| obj.get("oneOf")).and_then(Value::as_array) {
        let rendered: Vec<String> = variants
            .iter()
            .map(|v| render(v, ref_table, depth + 1, visited))
            .collect();
        return rendered.join(" | ");
    }

    if let Some(values) = obj.get("enum").and_then(Value::as_array) {
        let rendered: Vec<String> = values
            .iter()
            .map(|v| serde_json::to_string(v).unwrap_or_default())
            .collect();
        return rendered.join(" | ");
    }

    let ty = obj.get("type").and_then(Value::as_str);
    match ty {
        Some("object") | None if obj.contains_key("properties") || obj.contains_key("additionalProperties") => {
            render_object(obj, ref_table, depth, visited)
        }
        Some("object") => render_object(obj, ref_table, depth, visited),
        Some("array") => {
            let items = obj.get("items").cloned().unwrap_or(Value::Bool(true));
            let inner = render(&items, ref_table, depth + 1, visited);
            format!("{inner}[]")
        }
        Some("string") => "string".to_string(),
        Some("integer") | Some("number") => "number".to_string(),
        Some("boolean") => "boolean".to_string(),
        Some("null") => "null".to_string(),
        Some(other) => other.to_string(),
        None => "unknown".to_string(),
    }
}

fn render_object(
    obj: &serde_json::Map<String, Value>,
    ref_table: &RefHintTable,
    depth: usize,
    visited: &mut HashSet<String>,
) -> String {
    let Some(props) = obj.get("properties").and_then(Value::as_object) else {
        return if obj.get("additionalProperties") == Some(&Value::Bool(false)) {
            EMPTY_HINT.to_string()
        } else {
            format!("{{ {TRUNCATION_MARKER} }}")
        };
    };

    if props.is_empty() {
        return EMPTY_HINT.to_string();
    }

    let required: HashSet<&str> = obj
        .get("required")
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let mut keys: Vec<&String> = props.keys().collect();
    keys.sort();

    let truncated = keys.len() > MAX_PROPERTIES;
    let shown = &keys[..keys.len().min(MAX_PROPERTIES)];

    let mut fields: Vec<String> = shown
        .iter()
        .map(|k| {
            let value_schema = &props[*k];
            let rendered = render(value_schema, ref_table, depth + 1, visited);
            let optional = if required.contains(k.as_str()) { "" } else { "?" };
            format!("{k}{optional}: {rendered}")
        })
        .collect();

    if truncated {
        fields.push(TRUNCATION_MARKER.to_string());
    }

    format!("{{ {} }}", fields.join(", "))
}

/// Merge `allOf` parts into a single compact object hint when unambiguous;
/// otherwise fall back to the unmerged `(A & B & ...)` form. Never attempts
/// set-theoretic type reduction.
fn render_intersection(
    parts: &[Value],
    ref_table: &RefHintTable,
    depth: usize,
    visited: &mut HashSet<String>,
) -> String {
    let all_objects = parts.iter().all(|p| {
        p.get("type").and_then(Value::as_str) == Some("object") || p.get("properties").is_some()
    });

    if all_objects && depth <= MAX_MERGE_DEPTH && parts.len() <= MAX_MERGE_PARTS {
        let mut merged_props = serde_json::Map::new();
        let mut merged_required = Vec::new();
        for part in parts {
            if let Some(props) = part.get("properties").and_then(Value::as_object) {
                for (k, v) in props {
                    merged_props.insert(k.clone(), v.clone());
                }
            }
            if let Some(req) = part.get("required").and_then(Value::as_array) {
                merged_required.extend(req.iter().cloned());
            }
        }
        let merged = Value::Object(
            [
                (
                    "type".to_string(),
                    Value::String("object".to_string()),
                ),
                ("properties".to_string(), Value::Object(merged_props)),
                ("required".to_string(), Value::Array(merged_required)),
            ]
            .into_iter()
            .collect(),
        );
        let rendered = render(&merged, ref_table, depth, visited);
        if rendered.len() <= MAX_MERGE_LEN {
            return rendered;
        }
    }

    let rendered: Vec<String> = parts
        .iter()
        .map(|p| render(p, ref_table, depth + 1, visited))
        .collect();
    format!("({})", rendered.join(" & "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_object_renders_empty_hint() {
        let schema = json!({"type": "object", "properties": {}});
        assert_eq!(compact_hint(&schema, &RefHintTable::new()), EMPTY_HINT);
    }

    #[test]
    fn object_marks_optional_fields_and_truncates() {
        let mut props = serde_json::Map::new();
        for i in 0..15 {
            props.insert(format!("f{i}"), json!({"type": "string"}));
        }
        let schema = json!({
            "type": "object",
            "properties": Value::Object(props),
            "required": ["f0"],
        });
        let hint = compact_hint(&schema, &RefHintTable::new());
        assert!(hint.contains("f0: string"));
        assert!(hint.contains("f1?: string"));
        assert!(hint.contains(TRUNCATION_MARKER));
    }

    #[test]
    fn array_of_strings() {
        let schema = json!({"type": "array", "items": {"type": "string"}});
        assert_eq!(compact_hint(&schema, &RefHintTable::new()), "string[]");
    }

    #[test]
    fn ref_uses_hint_table_entry() {
        let mut table = RefHintTable::new();
        table.insert("Repo".to_string(), "{ id: number, name: string }".to_string());
        let schema = json!({"$ref": "#/components/schemas/Repo"});
        assert_eq!(
            compact_hint(&schema, &table),
            "{ id: number, name: string }"
        );
    }

    #[test]
    fn ref_without_hint_table_entry_falls_back_to_name() {
        let schema = json!({"$ref": "#/components/schemas/Widget"});
        assert_eq!(compact_hint(&schema, &RefHintTable::new()), "Widget");
    }

    #[test]
    fn self_referential_ref_does_not_infinite_loop() {
        // A ref that (conceptually) points back to itself should terminate
        // via the visited-set cycle guard rather than recursing forever.
        let schema = json!({"$ref": "#/components/schemas/Node"});
        let mut table = RefHintTable::new();
        table.insert("Node".to_string(), "Node".to_string());
        assert_eq!(compact_hint(&schema, &table), "Node");
    }

    #[test]
    fn small_all_of_merges_into_single_object() {
        let schema = json!({
            "allOf": [
                {"type": "object", "properties": {"id": {"type": "integer"}}, "required": ["id"]},
                {"type": "object", "properties": {"name": {"type": "string"}}},
            ]
        });
        let hint = compact_hint(&schema, &RefHintTable::new());
        assert_eq!(hint, "{ id: number, name?: string }");
    }

    #[test]
    fn large_all_of_falls_back_to_unmerged_intersection() {
        let parts: Vec<Value> = (0..10)
            .map(|i| json!({"type": "object", "properties": {format!("f{i}"): {"type": "string"}}}))
            .collect();
        let schema = json!({"allOf": parts});
        let hint = compact_hint(&schema, &RefHintTable::new());
        assert!(hint.starts_with('('));
        assert!(hint.contains('&'));
    }

    #[test]
    fn any_of_renders_union() {
        let schema = json!({"anyOf": [{"type": "string"}, {"type": "integer"}]});
        assert_eq!(compact_hint(&schema, &RefHintTable::new()), "string | number");
    }

    #[test]
    fn enum_renders_literal_union() {
        let schema = json!({"enum": ["a", "b"]});
        assert_eq!(compact_hint(&schema, &RefHintTable::new()), "\"a\" | \"b\"");
    }
}
