use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

static NON_ALNUM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9_]+").unwrap());
static LEADING_DIGIT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[0-9]").unwrap());
static DATE_TAG_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^api_\d{4}_\d{2}_\d{2}_").unwrap());
static VERSION_TAG_PREFIX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^v\d+_").unwrap());

/// Sanitize a single path segment: lowercase alphanumerics plus underscore,
/// collapsing any other run of characters to a single `_`. A leading digit
/// is prefixed with `_` since tool paths must be valid identifiers.
pub fn sanitize_segment(raw: &str) -> String {
    let lowered = raw.to_lowercase();
    let collapsed = NON_ALNUM.replace_all(&lowered, "_");
    let trimmed = collapsed.trim_matches('_');
    let base = if trimmed.is_empty() { "_" } else { trimmed };
    if LEADING_DIGIT.is_match(base) {
        format!("_{base}")
    } else {
        base.to_string()
    }
}

/// Strip the conventional noise prefixes a generated "tag" segment can carry:
/// `api_<date>_` and `v<N>_`.
pub fn normalize_tag(tag: &str) -> String {
    let sanitized = sanitize_segment(tag);
    let no_date = DATE_TAG_PREFIX.replace(&sanitized, "");
    let no_version = VERSION_TAG_PREFIX.replace(&no_date, "");
    if no_version.is_empty() {
        sanitized
    } else {
        no_version.to_string()
    }
}

/// Builds `source.tag.operation`-shaped tool paths, sanitizing each segment,
/// de-duplicating an operation name that already repeats its tag, and
/// disambiguating collisions within one inventory with `_2`, `_3`, ... suffixes.
#[derive(Default)]
pub struct PathBuilder {
    used: HashSet<String>,
}

impl PathBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a three-part path `source.tag.operation`. `tag` may be empty,
    /// in which case the path collapses to `source.operation`.
    pub fn build(&mut self, source: &str, tag: &str, operation: &str) -> String {
        let source = sanitize_segment(source);
        let tag = normalize_tag(tag);
        let mut operation = sanitize_segment(operation);

        // Operation-tag prefix de-duplication: "jira.issues.issues_get" -> "jira.issues.get".
        if !tag.is_empty() {
            let prefixed = format!("{tag}_");
            if let Some(stripped) = operation.strip_prefix(&prefixed) {
                if !stripped.is_empty() {
                    operation = stripped.to_string();
                }
            }
        }

        let base = if tag.is_empty() {
            format!("{source}.{operation}")
        } else {
            format!("{source}.{tag}.{operation}")
        };

        self.disambiguate(base)
    }

    /// Build a two-part path `source.operation`, e.g. for MCP/GraphQL/Postman
    /// tools that have no natural tag grouping.
    pub fn build_flat(&mut self, source: &str, operation: &str) -> String {
        let source = sanitize_segment(source);
        let operation = sanitize_segment(operation);
        self.disambiguate(format!("{source}.{operation}"))
    }

    fn disambiguate(&mut self, base: String) -> String {
        if self.used.insert(base.clone()) {
            return base;
        }
        let mut n = 2;
        loop {
            let candidate = format!("{base}_{n}");
            if self.used.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }
}

/// Collapse an ugly, stuttering source name into a human-friendly "preferred
/// path" for display/disambiguation, e.g.
/// `vercel_vercel_api.domains.get_domain` -> `vercel.domains.get_domain`.
pub fn preferred_path(path: &str) -> String {
    let mut parts: Vec<String> = path.split('.').map(str::to_string).collect();
    if let Some(first) = parts.first().cloned() {
        let words: Vec<&str> = first.split('_').collect();
        if words.len() >= 2 {
            let mut deduped: Vec<&str> = Vec::with_capacity(words.len());
            for w in &words {
                if deduped.last() != Some(w) {
                    deduped.push(w);
                }
            }
            // Collapse "vercel_vercel_api" -> "vercel" when a leading word
            // repeats and the remainder is a generic suffix like "api".
            if deduped.len() >= 2 && deduped[0] == words[0] {
                let collapsed = if deduped.len() > 1
                    && (deduped.last() == Some(&"api") || deduped[0] == deduped[1])
                {
                    deduped[0].to_string()
                } else {
                    deduped.join("_")
                };
                parts[0] = collapsed;
            }
        }
    }
    parts.join(".")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_segment_lowercases_and_prefixes_leading_digit() {
        assert_eq!(sanitize_segment("List Workflow Runs!"), "list_workflow_runs");
        assert_eq!(sanitize_segment("2fa_login"), "_2fa_login");
        assert_eq!(sanitize_segment(""), "_");
    }

    #[test]
    fn normalize_tag_strips_date_and_version_prefixes() {
        assert_eq!(normalize_tag("api_2024_01_01_Repos"), "repos");
        assert_eq!(normalize_tag("v2_issues"), "issues");
        assert_eq!(normalize_tag("issues"), "issues");
    }

    #[test]
    fn build_deduplicates_operation_tag_prefix() {
        let mut b = PathBuilder::new();
        assert_eq!(b.build("jira", "issues", "issues_get"), "jira.issues.get");
    }

    #[test]
    fn build_disambiguates_collisions() {
        let mut b = PathBuilder::new();
        assert_eq!(b.build("gh", "repos", "get"), "gh.repos.get");
        assert_eq!(b.build("gh", "repos", "get"), "gh.repos.get_2");
        assert_eq!(b.build("gh", "repos", "get"), "gh.repos.get_3");
    }

    #[test]
    fn build_flat_has_no_tag_segment() {
        let mut b = PathBuilder::new();
        assert_eq!(b.build_flat("jira", "create_issue"), "jira.create_issue");
    }

    #[test]
    fn paths_are_unique_across_many_collisions() {
        let mut b = PathBuilder::new();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..50 {
            let p = b.build("x", "y", "z");
            assert!(seen.insert(p), "path builder produced a duplicate");
        }
    }
}
