//! Per-source configuration schemas. Deserialized from `ToolSource::config`
//! (an opaque JSON blob at the data-model layer) into a protocol-specific
//! shape here, with malformed configs surfaced as warnings rather than
//! failures by the caller.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::model::CredentialMode;

/// Generates a `Debug` impl that redacts secret fields.
///
/// Field specifiers:
/// - `field_name`                — printed normally via `&self.field_name`
/// - `redact(field_name)`        — `String` field: shows `[empty]` or `[REDACTED]`
/// - `redact_option(field_name)` — `Option<String>` field: shows `None` or `Some("[REDACTED]")`
macro_rules! redact_debug {
    (@field $builder:ident, $self:ident, redact($field:ident)) => {
        $builder.field(
            stringify!($field),
            &if $self.$field.is_empty() {
                "[empty]"
            } else {
                "[REDACTED]"
            },
        );
    };
    (@field $builder:ident, $self:ident, redact_option($field:ident)) => {
        $builder.field(
            stringify!($field),
            &$self.$field.as_ref().map(|_| "[REDACTED]"),
        );
    };
    (@field $builder:ident, $self:ident, $field:ident) => {
        $builder.field(stringify!($field), &$self.$field);
    };

    (@fields $builder:ident, $self:ident,) => {};
    (@fields $builder:ident, $self:ident, redact($field:ident), $($rest:tt)*) => {
        redact_debug!(@field $builder, $self, redact($field));
        redact_debug!(@fields $builder, $self, $($rest)*);
    };
    (@fields $builder:ident, $self:ident, redact_option($field:ident), $($rest:tt)*) => {
        redact_debug!(@field $builder, $self, redact_option($field));
        redact_debug!(@fields $builder, $self, $($rest)*);
    };
    (@fields $builder:ident, $self:ident, $field:ident, $($rest:tt)*) => {
        redact_debug!(@field $builder, $self, $field);
        redact_debug!(@fields $builder, $self, $($rest)*);
    };

    ($struct_name:ident, $($fields:tt)*) => {
        impl std::fmt::Debug for $struct_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                let mut builder = f.debug_struct(stringify!($struct_name));
                redact_debug!(@fields builder, self, $($fields)*);
                builder.finish()
            }
        }
    };
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenApiSourceConfig {
    /// URL of the OpenAPI/Swagger document, or an inline document when
    /// `inlineSpec` is set.
    #[serde(default)]
    pub spec_url: Option<String>,
    #[serde(default)]
    pub inline_spec: Option<serde_json::Value>,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub credential_mode: Option<CredentialMode>,
    #[serde(default)]
    pub base_url_override: Option<String>,
}

redact_debug!(
    OpenApiSourceConfig,
    spec_url,
    inline_spec,
    redact(api_key),
    credential_mode,
    base_url_override,
);

#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphqlSourceConfig {
    pub endpoint: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub credential_mode: Option<CredentialMode>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

redact_debug!(
    GraphqlSourceConfig,
    endpoint,
    redact(api_key),
    credential_mode,
    headers,
);

#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostmanSourceConfig {
    pub collection_url: String,
    #[serde(default)]
    pub proxy_url: Option<String>,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub environment: HashMap<String, String>,
}

redact_debug!(
    PostmanSourceConfig,
    collection_url,
    proxy_url,
    redact(api_key),
    environment,
);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum McpAuthMode {
    Static,
    Workspace,
    Actor,
    Account,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpSourceConfig {
    pub url: String,
    #[serde(default)]
    pub auth_mode: Option<McpAuthMode>,
    #[serde(default)]
    pub static_headers: HashMap<String, String>,
    #[serde(default)]
    pub api_key: String,
}

redact_debug!(
    McpSourceConfig,
    url,
    auth_mode,
    static_headers,
    redact(api_key),
);

impl McpSourceConfig {
    /// Per-actor credentials forbid sharing a cached tool inventory across
    /// actors: the assembler must force `skipCacheRead`/`skipCacheWrite`
    /// when any enabled MCP source is actor-scoped.
    pub fn is_actor_scoped(&self) -> bool {
        self.auth_mode == Some(McpAuthMode::Actor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mcp_source_debug_redacts_api_key() {
        let cfg = McpSourceConfig {
            url: "https://example.com/mcp".into(),
            auth_mode: Some(McpAuthMode::Static),
            static_headers: HashMap::new(),
            api_key: "sk-secret".into(),
        };
        let rendered = format!("{cfg:?}");
        assert!(!rendered.contains("sk-secret"));
        assert!(rendered.contains("REDACTED"));
    }

    #[test]
    fn actor_mode_is_detected() {
        let cfg = McpSourceConfig {
            url: "https://example.com/mcp".into(),
            auth_mode: Some(McpAuthMode::Actor),
            static_headers: HashMap::new(),
            api_key: String::new(),
        };
        assert!(cfg.is_actor_scoped());
    }
}
