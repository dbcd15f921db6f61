//! Protocol-specific loaders. Each turns one `ToolSource` into zero or more
//! `ToolDefinition`s; a loader failure never aborts the others — it degrades
//! to an empty tool set plus a warning the inventory assembler surfaces.

pub mod graphql;
pub mod mcp;
pub mod openapi;
pub mod postman;

use crate::host::ToolRuntimeStore;
use crate::model::{ToolDefinition, ToolSource, ToolSourceType};

pub struct LoadContext<'a> {
    pub http: &'a reqwest::Client,
    pub store: &'a dyn ToolRuntimeStore,
    pub workspace_id: &'a str,
    pub actor_id: Option<&'a str>,
}

#[derive(Default)]
pub struct SourceLoadResult {
    pub tools: Vec<ToolDefinition>,
    pub warnings: Vec<String>,
    /// Component-schema display signatures, carried through to the
    /// persisted artifact. Only the OpenAPI loader currently populates this.
    pub ref_hint_table: Option<std::collections::HashMap<String, String>>,
}

/// Dispatch to the loader matching `source.source_type`, translating a
/// hard loader failure into the "this source contributed nothing" shape
/// rather than propagating it — per-source failures never abort the rest
/// of a workspace's inventory build.
pub async fn load_source(source: &ToolSource, ctx: &LoadContext<'_>) -> SourceLoadResult {
    let outcome = match source.source_type {
        ToolSourceType::Openapi => openapi::load(source, ctx).await,
        ToolSourceType::Postman => postman::load(source, ctx).await,
        ToolSourceType::Graphql => graphql::load(source, ctx).await,
        ToolSourceType::Mcp => mcp::load(source, ctx).await,
    };

    match outcome {
        Ok(result) => result,
        Err(err) => SourceLoadResult {
            tools: vec![],
            warnings: vec![format!("source '{}' failed to load: {err}", source.name)],
            ref_hint_table: None,
        },
    }
}
