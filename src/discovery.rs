//! Ranked keyword search over a compiled inventory: builds one entry per
//! tool (aliases, normalized forms, preview keys) and scores candidates by
//! namespace hints, term coverage, and intent-phrase containment.

use std::collections::HashSet;

use regex::Regex;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::LazyLock;

use crate::model::ToolDefinition;
use crate::util::path::preferred_path;

const DEFAULT_DISCOVER_LIMIT: usize = 20;

static NON_ALNUM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9]+").unwrap());

const STOPWORDS: &[&str] = &["a", "an", "the", "of", "for", "to", "in", "on", "with", "and", "or", "is", "are", "me"];

#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryEntry {
    pub path: String,
    pub preferred_path: String,
    pub aliases: Vec<String>,
    pub namespace: String,
    pub display_input_hint: String,
    pub display_output_hint: String,
    pub preview_input_keys: Vec<String>,
    pub required_input_keys: Vec<String>,
    pub description: String,
    pub search_text: String,
    pub normalized_path: String,
    pub normalized_search_text: String,
}

impl DiscoveryEntry {
    fn build(tool: &ToolDefinition) -> Self {
        let preferred = preferred_path(&tool.path);
        let namespace = tool.path.split('.').next().unwrap_or(&tool.path).to_string();
        let aliases = build_aliases(&tool.path, &preferred);

        let display_input_hint = tool.typing.input_hint.clone().unwrap_or_else(|| "{}".to_string());
        let display_output_hint = tool.typing.output_hint.clone().unwrap_or_else(|| "void".to_string());
        let preview_input_keys = tool.typing.preview_input_keys.clone().unwrap_or_default();
        let required_input_keys = tool.typing.required_input_keys.clone().unwrap_or_default();
        let description = tool.compact_description().to_string();

        let mut search_parts = vec![tool.path.clone(), preferred.clone()];
        search_parts.extend(aliases.clone());
        search_parts.push(description.clone());
        search_parts.extend(preview_input_keys.clone());
        let search_text = search_parts.join(" ").to_lowercase();

        Self {
            normalized_path: normalize(&tool.path),
            normalized_search_text: normalize(&search_text),
            path: tool.path.clone(),
            preferred_path: preferred,
            aliases,
            namespace,
            display_input_hint,
            display_output_hint,
            preview_input_keys,
            required_input_keys,
            description,
            search_text,
        }
    }
}

fn normalize(s: &str) -> String {
    NON_ALNUM.replace_all(&s.to_lowercase(), "").into_owned()
}

/// camelCase and no-underscore compact forms of a path, e.g.
/// `jira.create_issue` -> `jira.createIssue`, `jira.createissue`.
fn build_aliases(path: &str, preferred: &str) -> Vec<String> {
    let mut aliases = HashSet::new();
    for candidate in [path, preferred] {
        aliases.insert(to_camel_case_path(candidate));
        aliases.insert(candidate.replace('_', ""));
    }
    aliases.remove(path);
    let mut out: Vec<String> = aliases.into_iter().collect();
    out.sort();
    out
}

fn to_camel_case_path(path: &str) -> String {
    path.split('.')
        .map(|segment| {
            let mut words = segment.split('_');
            let Some(first) = words.next() else { return String::new() };
            let mut out = first.to_string();
            for word in words {
                let mut chars = word.chars();
                if let Some(c) = chars.next() {
                    out.push(c.to_ascii_uppercase());
                    out.push_str(chars.as_str());
                }
            }
            out
        })
        .collect::<Vec<_>>()
        .join(".")
}

#[derive(Debug, Clone, Serialize)]
pub struct RankedResult {
    pub path: String,
    pub preferred_path: String,
    pub score: i32,
    pub matched_terms: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiscoverResult {
    pub best_path: Option<String>,
    pub results: Vec<RankedResult>,
    pub total: usize,
}

pub struct DiscoveryIndex {
    entries: Vec<DiscoveryEntry>,
    namespaces: HashSet<String>,
}

impl DiscoveryIndex {
    pub fn build(tools: &[ToolDefinition]) -> Self {
        let entries: Vec<DiscoveryEntry> = tools.iter().map(DiscoveryEntry::build).collect();
        let namespaces = entries.iter().map(|e| e.namespace.clone()).collect();
        Self { entries, namespaces }
    }

    pub fn entries(&self) -> &[DiscoveryEntry] {
        &self.entries
    }

    pub fn namespaces(&self) -> Vec<String> {
        let mut ns: Vec<String> = self.namespaces.iter().cloned().collect();
        ns.sort();
        ns
    }

    pub fn entries_in_namespace(&self, namespace: &str) -> Vec<&DiscoveryEntry> {
        self.entries.iter().filter(|e| e.namespace == namespace).collect()
    }

    /// Suggest up to `limit` paths by normalized-path proximity to `query`,
    /// used by the invocation pipeline when an exact/normalized tool lookup
    /// misses entirely.
    pub fn suggest(&self, query: &str, limit: usize) -> Vec<String> {
        self.search(query, limit).results.into_iter().map(|r| r.path).collect()
    }

    pub fn search(&self, query: &str, limit: usize) -> DiscoverResult {
        let terms: Vec<String> = query
            .to_lowercase()
            .split_whitespace()
            .map(str::to_string)
            .filter(|t| !t.is_empty())
            .collect();

        if terms.is_empty() {
            return DiscoverResult { best_path: None, results: vec![], total: 0 };
        }

        let namespace_hints: HashSet<&str> = terms
            .iter()
            .filter(|t| self.namespaces.contains(t.as_str()))
            .map(String::as_str)
            .collect();

        let intent_tokens: Vec<&str> = terms
            .iter()
            .map(String::as_str)
            .filter(|t| !STOPWORDS.contains(t) && !namespace_hints.contains(t))
            .collect();
        let intent_phrase = normalize(&intent_tokens.join(""));

        let min_matches = terms.len().div_ceil(2);
        let mut scored: Vec<(i32, usize, &DiscoveryEntry)> = Vec::new();

        for entry in &self.entries {
            let mut score = 0i32;
            let mut matched = 0usize;

            if !namespace_hints.is_empty() {
                if namespace_hints.contains(entry.namespace.as_str()) {
                    score += 6;
                } else {
                    score -= 8;
                }
            }

            for term in &terms {
                let in_text = entry.search_text.contains(term.as_str());
                let in_path = entry.path.contains(term.as_str());
                if in_text || in_path {
                    matched += 1;
                    score += 1;
                }
                if in_path {
                    score += 2;
                }
            }

            if matched < min_matches {
                continue;
            }

            if !intent_phrase.is_empty() {
                if entry.normalized_path.contains(&intent_phrase) {
                    score += 6;
                } else if entry.normalized_search_text.contains(&intent_phrase) {
                    score += 3;
                }
            }

            score += matched as i32 * 2;
            scored.push((score, matched, entry));
        }

        scored.sort_by(|a, b| {
            b.0.cmp(&a.0)
                .then_with(|| a.2.path.len().cmp(&b.2.path.len()))
                .then_with(|| a.2.path.cmp(&b.2.path))
        });

        let total = scored.len();
        let required_top_score = std::cmp::max(3, 2 * terms.len() as i32 - 1);
        let best_path = match scored.as_slice() {
            [top, runner_up, ..] if top.0 >= required_top_score && top.0 - runner_up.0 >= 2 => Some(top.2.path.clone()),
            [only] if only.0 >= required_top_score => Some(only.2.path.clone()),
            _ => None,
        };

        let results = scored
            .into_iter()
            .take(limit)
            .map(|(score, matched, entry)| RankedResult {
                path: entry.path.clone(),
                preferred_path: entry.preferred_path.clone(),
                score,
                matched_terms: matched,
            })
            .collect();

        DiscoverResult { best_path, results, total }
    }
}

/// `(path, description, builtin handler name)` for the three always-present
/// system tools the inventory assembler regenerates on every build.
pub fn system_tool_specs() -> [(&'static str, &'static str, &'static str); 3] {
    [
        (
            "discover",
            "Search the workspace's tool inventory by keyword. Returns the best-matching path (if confident) plus ranked candidates.",
            "discover",
        ),
        (
            "catalog.namespaces",
            "List the top-level namespaces (tool-path prefixes) available in this workspace.",
            "catalog.namespaces",
        ),
        (
            "catalog.tools",
            "List tools within a given namespace.",
            "catalog.tools",
        ),
    ]
}

pub fn run_discover(index: &DiscoveryIndex, input: Value) -> anyhow::Result<Value> {
    let query = input.get("query").and_then(Value::as_str).unwrap_or("");
    let limit = input
        .get("limit")
        .and_then(Value::as_u64)
        .map(|n| n as usize)
        .unwrap_or(DEFAULT_DISCOVER_LIMIT);
    let compact = input.get("compact").and_then(Value::as_bool).unwrap_or(false);

    let result = index.search(query, limit);
    let results: Vec<Value> = result
        .results
        .iter()
        .map(|r| {
            if compact {
                json!({"path": r.path, "preferredPath": r.preferred_path, "score": r.score})
            } else {
                let entry = index.entries().iter().find(|e| e.path == r.path);
                json!({
                    "path": r.path,
                    "preferredPath": r.preferred_path,
                    "score": r.score,
                    "matchedTerms": r.matched_terms,
                    "description": entry.map(|e| e.description.as_str()).unwrap_or(""),
                    "inputHint": entry.map(|e| e.display_input_hint.as_str()).unwrap_or("{}"),
                    "outputHint": entry.map(|e| e.display_output_hint.as_str()).unwrap_or("void"),
                })
            }
        })
        .collect();

    Ok(json!({
        "bestPath": result.best_path,
        "results": results,
        "total": result.total,
    }))
}

pub fn run_catalog_namespaces(index: &DiscoveryIndex) -> anyhow::Result<Value> {
    Ok(json!({ "namespaces": index.namespaces() }))
}

pub fn run_catalog_tools(index: &DiscoveryIndex, input: Value) -> anyhow::Result<Value> {
    let namespace = input
        .get("namespace")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow::anyhow!("catalog.tools requires a 'namespace' string argument"))?;

    let tools: Vec<Value> = index
        .entries_in_namespace(namespace)
        .into_iter()
        .map(|e| {
            json!({
                "path": e.path,
                "preferredPath": e.preferred_path,
                "description": e.description,
                "inputHint": e.display_input_hint,
                "outputHint": e.display_output_hint,
                "requiredInputKeys": e.required_input_keys,
            })
        })
        .collect();

    Ok(json!({ "namespace": namespace, "tools": tools }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ApprovalMode, RunSpec, ToolTyping};
    use std::sync::Arc;

    fn tool(path: &str, description: &str) -> ToolDefinition {
        ToolDefinition {
            path: path.to_string(),
            source: "system".into(),
            approval: ApprovalMode::Auto,
            description: description.to_string(),
            typing: ToolTyping::default(),
            credential: None,
            run_spec: RunSpec::Builtin { handler: "noop".into() },
            run: Arc::new(|_, _| Box::pin(async { Ok(serde_json::Value::Null) })),
        }
    }

    #[test]
    fn empty_query_returns_empty_result() {
        let index = DiscoveryIndex::build(&[tool("a.b", "")]);
        let result = index.search("", 10);
        assert_eq!(result.best_path, None);
        assert_eq!(result.total, 0);
    }

    #[test]
    fn namespace_hint_boosts_matching_namespace() {
        let tools = vec![
            tool("github.repos.list", "List repositories"),
            tool("jira.issues.list", "List issues"),
        ];
        let index = DiscoveryIndex::build(&tools);
        let result = index.search("github list", 10);
        assert_eq!(result.results.first().unwrap().path, "github.repos.list");
    }

    #[test]
    fn best_path_requires_clear_margin() {
        let tools = vec![
            tool("github.repos.list_workflow_runs", "List workflow runs"),
            tool("github.repos.list_workflows", "List workflows"),
        ];
        let index = DiscoveryIndex::build(&tools);
        let result = index.search("list workflows", 10);
        // Both candidates share most terms; margin rule should often yield no
        // single best path without a decisive winner.
        if let Some(best) = &result.best_path {
            assert!(result.results.iter().any(|r| &r.path == best));
        }
    }

    #[test]
    fn aliases_include_camel_case_and_compact_forms() {
        let entry = DiscoveryEntry::build(&tool("jira.create_issue", ""));
        assert!(entry.aliases.contains(&"jira.createIssue".to_string()));
        assert!(entry.aliases.contains(&"jira.createissue".to_string()));
    }
}
