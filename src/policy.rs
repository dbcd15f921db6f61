//! Per-call policy evaluation: `allow | deny | require_approval` against a
//! workspace's policy records, with GraphQL decisions computed per
//! root-level field and aggregated worst-case.

use std::collections::{HashMap, HashSet};

use graphql_parser::query::{Definition, Document, OperationDefinition, Selection, SelectionSet};
use tracing::debug;

use crate::model::{ApprovalMode, Decision, PolicyRecord, PolicyTarget, ToolDefinition};

/// Resolve a tool's decision from the most specific matching policy record,
/// falling back to its `approval` default when no rule matches.
pub fn decision_for_tool(tool: &ToolDefinition, policies: &[PolicyRecord]) -> Decision {
    decision_for_path(&tool.path, &tool.source, tool.approval, policies)
}

fn decision_for_path(
    path: &str,
    source: &str,
    approval_default: ApprovalMode,
    policies: &[PolicyRecord],
) -> Decision {
    let mut best: Option<(usize, Decision)> = None;
    for policy in policies {
        let (matches, specificity) = match &policy.match_pattern {
            PolicyTarget::PathPattern(pattern) => (pattern == path, pattern.len()),
            PolicyTarget::SourceKey(key) => (key == source, key.len()),
        };
        if !matches {
            continue;
        }
        if best.is_none_or(|(best_specificity, _)| specificity > best_specificity) {
            best = Some((specificity, policy.decision));
        }
    }

    best.map(|(_, decision)| decision).unwrap_or(match approval_default {
        ApprovalMode::Auto => Decision::Allow,
        ApprovalMode::Required => Decision::RequireApproval,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum OperationKind {
    Query,
    Mutation,
}

impl OperationKind {
    fn as_str(self) -> &'static str {
        match self {
            OperationKind::Query => "query",
            OperationKind::Mutation => "mutation",
        }
    }
}

/// Parse a submitted GraphQL document into deduplicated
/// `(operation_kind, field_name)` pairs, resolving aliases to field names and
/// inlining fragment spreads / inline fragments. Subscriptions are ignored —
/// only `Query` and `Mutation` roots carry policy-relevant fields.
pub fn extract_root_fields(query: &str) -> anyhow::Result<Vec<(&'static str, String)>> {
    let doc: Document<&str> = graphql_parser::parse_query::<&str>(query)?;
    let fragments = collect_fragments(&doc);

    let mut seen = HashSet::new();
    let mut fields = Vec::new();
    for def in &doc.definitions {
        let Definition::Operation(op) = def else { continue };
        let (kind, selection_set) = match op {
            OperationDefinition::SelectionSet(s) => (OperationKind::Query, s),
            OperationDefinition::Query(q) => (OperationKind::Query, &q.selection_set),
            OperationDefinition::Mutation(m) => (OperationKind::Mutation, &m.selection_set),
            OperationDefinition::Subscription(_) => continue,
        };
        let mut root_fields = Vec::new();
        collect_field_names(selection_set, &fragments, &mut root_fields);
        for name in root_fields {
            if seen.insert((kind, name.clone())) {
                fields.push((kind.as_str(), name));
            }
        }
    }
    Ok(fields)
}

fn collect_fragments<'a>(
    doc: &'a Document<'a, &'a str>,
) -> HashMap<&'a str, &'a SelectionSet<'a, &'a str>> {
    doc.definitions
        .iter()
        .filter_map(|d| match d {
            Definition::Fragment(f) => Some((f.name, &f.selection_set)),
            _ => None,
        })
        .collect()
}

fn collect_field_names<'a>(
    selection_set: &SelectionSet<'a, &'a str>,
    fragments: &HashMap<&'a str, &'a SelectionSet<'a, &'a str>>,
    out: &mut Vec<String>,
) {
    for selection in &selection_set.items {
        match selection {
            Selection::Field(field) => {
                out.push(field.name.to_string());
            }
            Selection::InlineFragment(inline) => {
                collect_field_names(&inline.selection_set, fragments, out);
            }
            Selection::FragmentSpread(spread) => {
                let name = spread.fragment_name;
                if let Some(frag_selection_set) = fragments.get(name) {
                    collect_field_names(frag_selection_set, fragments, out);
                } else {
                    debug!(fragment = name, "fragment spread referenced unknown fragment");
                }
            }
        }
    }
}

/// Evaluate a GraphQL tool's decision by aggregating worst-case over every
/// root field touched by `query`, plus the effective `source.<kind>.<field>`
/// paths for display. An empty field set (e.g. parse produced no root
/// selections) falls back to the raw tool's own decision.
pub fn graphql_decision(
    source: &str,
    query: &str,
    raw_tool_decision: Decision,
    policies: &[PolicyRecord],
) -> anyhow::Result<(Decision, Vec<String>)> {
    let fields = extract_root_fields(query)?;
    if fields.is_empty() {
        return Ok((raw_tool_decision, vec![]));
    }

    let mut worst = Decision::Allow;
    let mut effective_paths = Vec::new();
    for (kind, field) in fields {
        let path = format!("{source}.{kind}.{field}");
        let approval_default = if kind == "mutation" { ApprovalMode::Required } else { ApprovalMode::Auto };
        let decision = decision_for_path(&path, source, approval_default, policies);
        worst = worst.worst(decision);
        effective_paths.push(path);
    }
    Ok((worst, effective_paths))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PolicyTarget;

    fn policy(pattern: &str, decision: Decision) -> PolicyRecord {
        PolicyRecord {
            match_pattern: PolicyTarget::PathPattern(pattern.to_string()),
            context: "workspace".to_string(),
            decision,
        }
    }

    #[test]
    fn falls_back_to_approval_default_without_matching_policy() {
        assert_eq!(
            decision_for_path("a.b.c", "a", ApprovalMode::Auto, &[]),
            Decision::Allow
        );
        assert_eq!(
            decision_for_path("a.b.c", "a", ApprovalMode::Required, &[]),
            Decision::RequireApproval
        );
    }

    #[test]
    fn exact_path_policy_overrides_default() {
        let policies = vec![policy("a.b.c", Decision::Deny)];
        assert_eq!(
            decision_for_path("a.b.c", "a", ApprovalMode::Auto, &policies),
            Decision::Deny
        );
    }

    #[test]
    fn extracts_aliased_root_fields_and_inlines_fragments() {
        let query = r#"
            query {
                viewer { id }
                currentTeams: teams { nodes { id } }
                ...Extra
            }
            fragment Extra on Query { issues { id } }
        "#;
        let fields = extract_root_fields(query).unwrap();
        let names: Vec<&str> = fields.iter().map(|(_, n)| n.as_str()).collect();
        assert!(names.contains(&"viewer"));
        assert!(names.contains(&"teams"));
        assert!(names.contains(&"issues"));
        assert_eq!(names.len(), 3);
    }

    #[test]
    fn graphql_decision_aggregates_worst_case() {
        let policies = vec![policy("linear.query.teams", Decision::RequireApproval)];
        let query = "query { viewer { id } teams { nodes { id } } }";
        let (decision, paths) =
            graphql_decision("linear", query, Decision::Allow, &policies).unwrap();
        assert_eq!(decision, Decision::RequireApproval);
        assert_eq!(paths, vec!["linear.query.viewer", "linear.query.teams"]);
    }

    #[test]
    fn unmatched_mutation_field_defaults_to_require_approval() {
        let query = "mutation { deleteIssue(id: \"1\") { success } }";
        let (decision, paths) = graphql_decision("linear", query, Decision::Allow, &[]).unwrap();
        assert_eq!(decision, Decision::RequireApproval);
        assert_eq!(paths, vec!["linear.mutation.deleteIssue"]);
    }

    #[test]
    fn unmatched_query_field_defaults_to_allow() {
        let query = "query { viewer { id } }";
        let (decision, _paths) = graphql_decision("linear", query, Decision::RequireApproval, &[]).unwrap();
        assert_eq!(decision, Decision::Allow);
    }

    #[test]
    fn empty_field_set_falls_back_to_raw_tool_decision() {
        // A spread to a fragment that isn't defined anywhere in the document
        // resolves to zero root fields without being a parse error.
        let query = "query { ...Missing }";
        let (decision, paths) =
            graphql_decision("linear", query, Decision::RequireApproval, &[]).unwrap();
        assert_eq!(decision, Decision::RequireApproval);
        assert!(paths.is_empty());
    }
}
