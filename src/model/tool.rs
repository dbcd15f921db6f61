use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Arguments passed to a tool's run closure at dispatch time.
#[derive(Debug, Clone, Default)]
pub struct ExecutionArgs {
    pub task_id: String,
    pub workspace_id: String,
    pub actor_id: Option<String>,
    pub client_id: Option<String>,
    pub credential: Option<ResolvedCredential>,
}

/// A credential value resolved by the host's credential provider, ready to be
/// applied by an executor. Never logged/Debug-printed with its raw value.
#[derive(Clone)]
pub struct ResolvedCredential {
    pub auth_type: CredentialAuthType,
    pub header_name: Option<String>,
    pub value: String,
}

impl fmt::Debug for ResolvedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedCredential")
            .field("auth_type", &self.auth_type)
            .field("header_name", &self.header_name)
            .field("value", &"[REDACTED]")
            .finish()
    }
}

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The executable closure a live tool carries. Dropped at the serialization
/// boundary — only `RunSpec` survives a round trip through storage.
pub type RunFn =
    Arc<dyn Fn(ExecutionArgs, Value) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync>;

/// Source-default / per-operation approval gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalMode {
    Auto,
    Required,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialMode {
    Static,
    Workspace,
    Actor,
    Account,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CredentialAuthType {
    Bearer,
    Basic,
    ApiKey,
}

/// A binding to a credential the host resolves at invocation time. Static-auth
/// credentials never carry raw secrets here — only the mode/type markers;
/// the raw value lives in the host's credential store and only appears
/// transiently as a `ResolvedCredential` at dispatch time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialBinding {
    pub source_key: String,
    pub mode: CredentialMode,
    pub auth_type: CredentialAuthType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header_name: Option<String>,
}

/// Ties an OpenAPI operation-derived tool back to its source document for
/// high-fidelity cross-referencing (e.g. generated type declarations lookup).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TypedRef {
    pub source_key: String,
    pub operation_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ToolTyping {
    pub input_schema: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_input_keys: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview_input_keys: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub typed_ref: Option<TypedRef>,
}

/// A tagged, serializable description of how to execute a tool.
/// Exactly one variant is ever set on a given tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunSpec {
    OpenApi {
        base_url: String,
        method: String,
        path_template: String,
        parameters: Value,
        /// Static (non-resolved) auth headers baked in at compile time.
        #[serde(default)]
        auth_headers: HashMap<String, String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        credential_spec: Option<CredentialBinding>,
    },
    Mcp {
        url: String,
        transport: McpTransport,
        #[serde(default)]
        query_params: HashMap<String, String>,
        tool_name: String,
        #[serde(default)]
        auth_headers: HashMap<String, String>,
    },
    Postman {
        method: String,
        url: String,
        #[serde(default)]
        headers: HashMap<String, String>,
        #[serde(default)]
        query: Vec<(String, String)>,
        #[serde(default)]
        body: PostmanBody,
        #[serde(default)]
        variables: HashMap<String, String>,
        #[serde(default)]
        auth_headers: HashMap<String, String>,
    },
    GraphqlRaw {
        endpoint: String,
        #[serde(default)]
        auth_headers: HashMap<String, String>,
    },
    GraphqlField {
        endpoint: String,
        /// "query" or "mutation"
        operation_type: String,
        field_name: String,
        selection: String,
        /// Ordered `(name, GraphQL type string)` pairs, e.g. `("id",
        /// "ID!")`, used to declare typed variables on the generated query.
        #[serde(default)]
        variables: Vec<(String, String)>,
        #[serde(default)]
        auth_headers: HashMap<String, String>,
    },
    Builtin {
        handler: String,
    },
}

impl RunSpec {
    pub fn kind(&self) -> &'static str {
        match self {
            RunSpec::OpenApi { .. } => "openapi",
            RunSpec::Mcp { .. } => "mcp",
            RunSpec::Postman { .. } => "postman",
            RunSpec::GraphqlRaw { .. } => "graphql_raw",
            RunSpec::GraphqlField { .. } => "graphql_field",
            RunSpec::Builtin { .. } => "builtin",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum McpTransport {
    StreamableHttp,
    Sse,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PostmanBody {
    #[default]
    None,
    Urlencoded {
        entries: Vec<(String, String)>,
    },
    Raw {
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        content_type: Option<String>,
    },
}

/// The compiled unit: a named, typed, approval-gated callable.
#[derive(Clone)]
pub struct ToolDefinition {
    pub path: String,
    pub source: String,
    pub approval: ApprovalMode,
    pub description: String,
    pub typing: ToolTyping,
    pub credential: Option<CredentialBinding>,
    pub run_spec: RunSpec,
    pub run: RunFn,
}

impl fmt::Debug for ToolDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDefinition")
            .field("path", &self.path)
            .field("source", &self.source)
            .field("approval", &self.approval)
            .field("run_spec_kind", &self.run_spec.kind())
            .finish()
    }
}

impl ToolDefinition {
    /// The first line of `description`, used as the compact form in listings.
    pub fn compact_description(&self) -> &str {
        self.description.lines().next().unwrap_or("")
    }
}

/// The declarative form of a `ToolDefinition` with the closure dropped,
/// carrying a tagged `run_spec` for rehydration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializedTool {
    pub path: String,
    pub source: String,
    pub approval: ApprovalMode,
    pub description: String,
    pub typing: ToolTyping,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential: Option<CredentialBinding>,
    pub run_spec: RunSpec,
}

impl From<&ToolDefinition> for SerializedTool {
    fn from(t: &ToolDefinition) -> Self {
        Self {
            path: t.path.clone(),
            source: t.source.clone(),
            approval: t.approval,
            description: t.description.clone(),
            typing: t.typing.clone(),
            credential: t.credential.clone(),
            run_spec: t.run_spec.clone(),
        }
    }
}

/// The on-disk unit one source loader produces: every tool it compiled plus
/// the shared ref-hint table they were rendered against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompiledToolSourceArtifact {
    pub version: String,
    pub source_type: String,
    pub source_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ref_hint_table: Option<HashMap<String, String>>,
    pub tools: Vec<SerializedTool>,
}

impl CompiledToolSourceArtifact {
    pub const VERSION: &'static str = "v1";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compact_description_takes_first_line() {
        let tool = ToolDefinition {
            path: "a.b".into(),
            source: "system".into(),
            approval: ApprovalMode::Auto,
            description: "Line one.\nMore detail here.".into(),
            typing: ToolTyping::default(),
            credential: None,
            run_spec: RunSpec::Builtin {
                handler: "noop".into(),
            },
            run: Arc::new(|_, _| Box::pin(async { Ok(Value::Null) })),
        };
        assert_eq!(tool.compact_description(), "Line one.");
    }

    #[test]
    fn run_spec_kind_matches_variant() {
        assert_eq!(
            RunSpec::Builtin {
                handler: "x".into()
            }
            .kind(),
            "builtin"
        );
        assert_eq!(
            RunSpec::GraphqlRaw {
                endpoint: "e".into(),
                auth_headers: HashMap::new(),
            }
            .kind(),
            "graphql_raw"
        );
    }

    #[test]
    fn serialized_tool_roundtrips_through_json() {
        let serialized = SerializedTool {
            path: "github.repos.get".into(),
            source: "openapi:github".into(),
            approval: ApprovalMode::Auto,
            description: "Get a repo".into(),
            typing: ToolTyping::default(),
            credential: None,
            run_spec: RunSpec::OpenApi {
                base_url: "https://api.github.com".into(),
                method: "GET".into(),
                path_template: "/repos/{owner}/{repo}".into(),
                parameters: Value::Null,
                auth_headers: HashMap::new(),
                credential_spec: None,
            },
        };
        let json = serde_json::to_string(&serialized).unwrap();
        let back: SerializedTool = serde_json::from_str(&json).unwrap();
        assert_eq!(back.path, serialized.path);
        assert_eq!(back.run_spec.kind(), "openapi");
    }
}
