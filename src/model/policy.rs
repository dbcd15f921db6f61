use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    // Ordering matters: `deny > require_approval > allow` under worst-case
    // aggregation. Derive the ordering from declaration order.
    Allow,
    RequireApproval,
    Deny,
}

impl Decision {
    /// Combine two decisions, keeping the more restrictive one:
    /// `deny > require_approval > allow`.
    pub fn worst(self, other: Decision) -> Decision {
        self.max(other)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PolicyTarget {
    PathPattern(String),
    SourceKey(String),
}

/// A single policy rule. `context` binds the rule to a workspace, actor, or
/// client scope; matching against the caller's context is a host
/// responsibility — this core only evaluates `match` against the tool path /
/// source key given an already-scoped rule set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyRecord {
    #[serde(rename = "match")]
    pub match_pattern: PolicyTarget,
    pub context: String,
    pub decision: Decision,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_ordering_is_deny_worst() {
        assert_eq!(Decision::Allow.worst(Decision::Deny), Decision::Deny);
        assert_eq!(
            Decision::RequireApproval.worst(Decision::Allow),
            Decision::RequireApproval
        );
        assert_eq!(
            Decision::Deny.worst(Decision::RequireApproval),
            Decision::Deny
        );
        assert_eq!(Decision::Allow.worst(Decision::Allow), Decision::Allow);
    }
}
