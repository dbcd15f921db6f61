use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolSourceType {
    Mcp,
    Openapi,
    Graphql,
    Postman,
}

impl ToolSourceType {
    pub fn as_str(self) -> &'static str {
        match self {
            ToolSourceType::Mcp => "mcp",
            ToolSourceType::Openapi => "openapi",
            ToolSourceType::Graphql => "graphql",
            ToolSourceType::Postman => "postman",
        }
    }
}

/// Workspace-scoped record describing a configured upstream.
/// The assembler only considers sources with `enabled = true`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSource {
    pub id: String,
    #[serde(rename = "type")]
    pub source_type: ToolSourceType,
    pub name: String,
    pub enabled: bool,
    pub config: Value,
    pub updated_at: DateTime<Utc>,
}
