//! Calls `tools/call` over a process-lifetime-shared connection keyed by
//! `(url, transport, headers)`, reconnecting once on a transport error
//! before giving up.

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock, OnceLock};

use regex::Regex;
use rmcp::model::{CallToolRequestParams, RawContent};
use rmcp::service::{Peer, RunningService};
use rmcp::{RoleClient, ServiceExt};
use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

use crate::model::{ExecutionArgs, McpTransport, ResolvedCredential, RunSpec};

static RECONNECT_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)socket|closed|econnreset|fetch failed").unwrap());

struct McpConnection {
    peer: Peer<RoleClient>,
    // Kept alive only to hold the background transport task running for as
    // long as this connection is cached.
    _service: RunningService<RoleClient, ()>,
}

type Registry = AsyncMutex<HashMap<String, Arc<McpConnection>>>;

fn registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(|| AsyncMutex::new(HashMap::new()))
}

fn connection_key(url: &str, transport: McpTransport, headers: &HashMap<String, String>) -> String {
    let mut sorted: Vec<_> = headers.iter().collect();
    sorted.sort();
    let headers_repr = sorted.into_iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join("&");
    format!("{transport:?}|{url}|{headers_repr}")
}

async fn dial(url: &str, transport: McpTransport, headers: &HashMap<String, String>) -> anyhow::Result<McpConnection> {
    let mut header_map = reqwest::header::HeaderMap::new();
    for (k, v) in headers {
        if let (Ok(name), Ok(val)) = (reqwest::header::HeaderName::try_from(k.as_str()), reqwest::header::HeaderValue::from_str(v)) {
            header_map.insert(name, val);
        }
    }
    let client = reqwest::Client::builder().default_headers(header_map).build()?;

    let service = match transport {
        McpTransport::StreamableHttp => {
            let transport = rmcp::transport::streamable_http_client::StreamableHttpClientTransport::with_client(
                client,
                rmcp::transport::streamable_http_client::StreamableHttpClientTransportConfig::with_uri(url.to_string()),
            );
            ().serve(transport).await.map_err(|e| anyhow::anyhow!("streamable-http connect failed: {e}"))?
        }
        McpTransport::Sse => {
            let transport = rmcp::transport::sse_client::SseClientTransport::start_with_client(client, url.to_string())
                .await
                .map_err(|e| anyhow::anyhow!("sse connect failed: {e}"))?;
            ().serve(transport).await.map_err(|e| anyhow::anyhow!("sse handshake failed: {e}"))?
        }
    };
    let peer = service.peer().clone();
    Ok(McpConnection { peer, _service: service })
}

/// Connect with `streamable-http` first, falling back to `sse`, used only
/// at load time to decide which transport this source speaks.
pub async fn connect_with_fallback(url: &str, headers: &HashMap<String, String>) -> anyhow::Result<(McpTransport, ConnectionHandle)> {
    match dial(url, McpTransport::StreamableHttp, headers).await {
        Ok(conn) => {
            let handle = cache_connection(url, McpTransport::StreamableHttp, headers, conn).await;
            Ok((McpTransport::StreamableHttp, handle))
        }
        Err(streamable_err) => {
            debug!(error = %streamable_err, "streamable-http connect failed, falling back to sse");
            let conn = dial(url, McpTransport::Sse, headers).await?;
            let handle = cache_connection(url, McpTransport::Sse, headers, conn).await;
            Ok((McpTransport::Sse, handle))
        }
    }
}

pub struct ConnectionHandle {
    pub peer: Peer<RoleClient>,
}

async fn cache_connection(url: &str, transport: McpTransport, headers: &HashMap<String, String>, conn: McpConnection) -> ConnectionHandle {
    let peer = conn.peer.clone();
    let key = connection_key(url, transport, headers);
    registry().lock().await.insert(key, Arc::new(conn));
    ConnectionHandle { peer }
}

async fn get_or_connect(url: &str, transport: McpTransport, headers: &HashMap<String, String>) -> anyhow::Result<Peer<RoleClient>> {
    let key = connection_key(url, transport, headers);
    if let Some(conn) = registry().lock().await.get(&key) {
        return Ok(conn.peer.clone());
    }
    let conn = dial(url, transport, headers).await?;
    let peer = conn.peer.clone();
    registry().lock().await.insert(key, Arc::new(conn));
    Ok(peer)
}

async fn invalidate(url: &str, transport: McpTransport, headers: &HashMap<String, String>) {
    let key = connection_key(url, transport, headers);
    registry().lock().await.remove(&key);
}

pub async fn execute(run_spec: &RunSpec, args: ExecutionArgs, input: Value) -> anyhow::Result<Value> {
    let RunSpec::Mcp {
        url,
        transport,
        query_params: _,
        tool_name,
        auth_headers,
    } = run_spec
    else {
        anyhow::bail!("mcp executor invoked with a non-mcp run-spec");
    };

    let mut headers = auth_headers.clone();
    apply_resolved_credential(&mut headers, &args.credential);

    match call(url, *transport, &headers, tool_name, &input).await {
        Ok(value) => Ok(value),
        Err(err) if RECONNECT_PATTERN.is_match(&err.to_string()) => {
            warn!(tool = tool_name, error = %err, "mcp transport error, reconnecting once");
            invalidate(url, *transport, &headers).await;
            call(url, *transport, &headers, tool_name, &input).await
        }
        Err(err) => Err(err),
    }
}

fn apply_resolved_credential(headers: &mut HashMap<String, String>, credential: &Option<ResolvedCredential>) {
    let Some(credential) = credential else { return };
    let header_name = credential.header_name.clone().unwrap_or_else(|| "Authorization".to_string());
    let value = match credential.auth_type {
        crate::model::CredentialAuthType::Bearer => format!("Bearer {}", credential.value),
        crate::model::CredentialAuthType::Basic => format!("Basic {}", credential.value),
        crate::model::CredentialAuthType::ApiKey => credential.value.clone(),
    };
    headers.insert(header_name, value);
}

async fn call(url: &str, transport: McpTransport, headers: &HashMap<String, String>, tool_name: &str, input: &Value) -> anyhow::Result<Value> {
    let peer = get_or_connect(url, transport, headers).await?;

    let arguments = match input.clone() {
        Value::Object(map) => Some(map),
        Value::Null => None,
        other => {
            let mut map = serde_json::Map::new();
            map.insert("input".to_string(), other);
            Some(map)
        }
    };

    let mut request = CallToolRequestParams::new(Cow::Owned(tool_name.to_string()));
    if let Some(arguments) = arguments {
        request = request.with_arguments(arguments);
    }

    let result = peer.call_tool(request).await.map_err(|e| anyhow::anyhow!("mcp tool '{tool_name}' call failed: {e}"))?;

    if result.is_error.unwrap_or(false) {
        anyhow::bail!("mcp tool '{tool_name}' returned an error: {}", flatten_content(&result.content));
    }

    Ok(flatten_content_to_value(&result.content))
}

fn flatten_content(content: &[rmcp::model::Annotated<RawContent>]) -> String {
    content
        .iter()
        .filter_map(|c| match &c.raw {
            RawContent::Text(text) => Some(text.text.clone()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// One text block -> string; many -> string array; none -> the raw content
/// array (images/audio/etc. surfaced as-is).
fn flatten_content_to_value(content: &[rmcp::model::Annotated<RawContent>]) -> Value {
    let texts: Vec<String> = content
        .iter()
        .filter_map(|c| match &c.raw {
            RawContent::Text(text) => Some(text.text.clone()),
            _ => None,
        })
        .collect();

    match texts.len() {
        0 => serde_json::to_value(content).unwrap_or(Value::Null),
        1 => Value::String(texts.into_iter().next().unwrap()),
        _ => Value::Array(texts.into_iter().map(Value::String).collect()),
    }
}
