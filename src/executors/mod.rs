//! Protocol-specific call dispatch. Each module executes exactly one
//! `RunSpec` variant against the network and returns a JSON result;
//! `builtin` resolves in-process without a network hop.

pub mod builtin;
pub mod graphql;
pub mod mcp;
pub mod openapi;
pub mod postman;

use std::sync::OnceLock;

/// One pooled client shared by every executor in the process. Executors are
/// plain async functions invoked from inside `RunFn` closures, not objects,
/// so there is nowhere natural to inject a client — a shared static plays
/// the same role the teacher's pinned per-tool client does.
pub fn http_client() -> &'static reqwest::Client {
    static CLIENT: OnceLock<reqwest::Client> = OnceLock::new();
    CLIENT.get_or_init(reqwest::Client::new)
}

pub(crate) fn apply_credential(
    headers: &mut reqwest::header::HeaderMap,
    credential: &Option<crate::model::ResolvedCredential>,
) {
    use reqwest::header::{HeaderName, HeaderValue};

    let Some(credential) = credential else { return };
    let (name, value) = match credential.auth_type {
        crate::model::CredentialAuthType::Bearer => ("Authorization".to_string(), format!("Bearer {}", credential.value)),
        crate::model::CredentialAuthType::Basic => ("Authorization".to_string(), format!("Basic {}", credential.value)),
        crate::model::CredentialAuthType::ApiKey => (
            credential.header_name.clone().unwrap_or_else(|| "X-API-Key".to_string()),
            credential.value.clone(),
        ),
    };
    if let (Ok(name), Ok(value)) = (HeaderName::try_from(name), HeaderValue::from_str(&value)) {
        headers.insert(name, value);
    }
}
