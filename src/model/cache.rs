use super::tool::CompiledToolSourceArtifact;
use serde::{Deserialize, Serialize};

/// Bump whenever the snapshot format or derivation logic changes; this
/// invalidates all prior caches globally.
pub const SIGNATURE_VERSION: &str = "toolmesh_v2";

/// A workspace's cached tool inventory: where it's stored, how big it is,
/// and whether the signature it was built from still matches the live
/// source set.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub workspace_id: String,
    pub signature: String,
    pub storage_id: String,
    pub types_storage_id: Option<String>,
    pub tool_count: usize,
    pub size_bytes: u64,
    pub is_fresh: bool,
}

/// A deterministic identifier of an inventory's input set, used as a cache key.
/// Built from `version | workspaceId | sorted(id:updatedAt:enabled)` — sorting
/// by source id makes the signature independent of enumeration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSignature(String);

impl SourceSignature {
    pub fn compute(workspace_id: &str, sources: &[super::ToolSource]) -> Self {
        let mut parts: Vec<String> = sources
            .iter()
            .map(|s| format!("{}:{}:{}", s.id, s.updated_at.timestamp_millis(), s.enabled))
            .collect();
        parts.sort();
        Self(format!(
            "{}|{}|{}",
            SIGNATURE_VERSION,
            workspace_id,
            parts.join(",")
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SourceSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The persisted, rehydratable form of a workspace's compiled tool inventory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceToolSnapshot {
    pub version: String,
    pub external_artifacts: Vec<CompiledToolSourceArtifact>,
    pub warnings: Vec<String>,
}

impl WorkspaceToolSnapshot {
    pub const VERSION: &'static str = "v2";

    pub fn new(external_artifacts: Vec<CompiledToolSourceArtifact>, warnings: Vec<String>) -> Self {
        Self {
            version: Self::VERSION.to_string(),
            external_artifacts,
            warnings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ToolSource, ToolSourceType};
    use chrono::TimeZone;
    use serde_json::json;

    fn source(id: &str, ts_secs: i64, enabled: bool) -> ToolSource {
        ToolSource {
            id: id.into(),
            source_type: ToolSourceType::Openapi,
            name: id.into(),
            enabled,
            config: json!({}),
            updated_at: Utc.timestamp_opt(ts_secs, 0).unwrap(),
        }
    }

    #[test]
    fn signature_is_order_independent() {
        let a = [source("one", 1, true), source("two", 2, true)];
        let b = [source("two", 2, true), source("one", 1, true)];
        assert_eq!(
            SourceSignature::compute("ws1", &a),
            SourceSignature::compute("ws1", &b)
        );
    }

    #[test]
    fn signature_changes_when_updated_at_changes() {
        let a = [source("one", 1, true)];
        let b = [source("one", 2, true)];
        assert_ne!(
            SourceSignature::compute("ws1", &a),
            SourceSignature::compute("ws1", &b)
        );
    }

    #[test]
    fn signature_differs_per_workspace() {
        let a = [source("one", 1, true)];
        assert_ne!(
            SourceSignature::compute("ws1", &a),
            SourceSignature::compute("ws2", &a)
        );
    }
}
