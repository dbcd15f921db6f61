//! In-process handlers that need no network hop. Resolved by name at
//! rehydration time from a host-supplied map (see `crate::serialize`).

use serde_json::Value;

use crate::model::ExecutionArgs;

pub type BuiltinHandler = std::sync::Arc<dyn Fn(ExecutionArgs, Value) -> crate::model::BoxFuture<'static, anyhow::Result<Value>> + Send + Sync>;

/// The handler for a `builtin` run-spec whose name has no registered
/// implementation: fails loudly rather than silently no-opping.
pub fn unknown_handler(handler_name: String) -> BuiltinHandler {
    std::sync::Arc::new(move |_args, _input| {
        let handler_name = handler_name.clone();
        Box::pin(async move { anyhow::bail!("no builtin handler registered for '{handler_name}'") })
    })
}
