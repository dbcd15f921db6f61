//! Drops a tool's executable closure for storage (`SerializedTool`) and
//! reconstructs it deterministically on the way back in. Every `RunSpec`
//! variant maps to exactly one executor; an unrecognized `builtin` handler
//! name rehydrates to a closure that fails loudly on call rather than
//! silently no-opping.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::executors::builtin::{unknown_handler, BuiltinHandler};
use crate::model::{CompiledToolSourceArtifact, ExecutionArgs, RunFn, RunSpec, SerializedTool, ToolDefinition};

pub fn serialize_artifact(
    source_type: &str,
    source_name: &str,
    source_key: Option<String>,
    ref_hint_table: Option<HashMap<String, String>>,
    tools: &[ToolDefinition],
) -> CompiledToolSourceArtifact {
    CompiledToolSourceArtifact {
        version: CompiledToolSourceArtifact::VERSION.to_string(),
        source_type: source_type.to_string(),
        source_name: source_name.to_string(),
        source_key,
        ref_hint_table,
        tools: tools.iter().map(SerializedTool::from).collect(),
    }
}

pub fn rehydrate_artifact(artifact: &CompiledToolSourceArtifact, builtins: &HashMap<String, BuiltinHandler>) -> Vec<ToolDefinition> {
    artifact.tools.iter().map(|tool| rehydrate_tool(tool, builtins)).collect()
}

pub fn rehydrate_tool(serialized: &SerializedTool, builtins: &HashMap<String, BuiltinHandler>) -> ToolDefinition {
    let run = build_run(&serialized.run_spec, builtins);
    ToolDefinition {
        path: serialized.path.clone(),
        source: serialized.source.clone(),
        approval: serialized.approval,
        description: serialized.description.clone(),
        typing: serialized.typing.clone(),
        credential: serialized.credential.clone(),
        run_spec: serialized.run_spec.clone(),
        run,
    }
}

fn build_run(run_spec: &RunSpec, builtins: &HashMap<String, BuiltinHandler>) -> RunFn {
    match run_spec {
        RunSpec::OpenApi { .. } => {
            let run_spec = run_spec.clone();
            Arc::new(move |args: ExecutionArgs, input: Value| {
                let run_spec = run_spec.clone();
                Box::pin(async move { crate::executors::openapi::execute(&run_spec, args, input).await })
            })
        }
        RunSpec::Postman { .. } => {
            let run_spec = run_spec.clone();
            Arc::new(move |args: ExecutionArgs, input: Value| {
                let run_spec = run_spec.clone();
                Box::pin(async move { crate::executors::postman::execute(&run_spec, args, input).await })
            })
        }
        RunSpec::GraphqlRaw { .. } => {
            let run_spec = run_spec.clone();
            Arc::new(move |args: ExecutionArgs, input: Value| {
                let run_spec = run_spec.clone();
                Box::pin(async move { crate::executors::graphql::execute_raw(&run_spec, args, input).await })
            })
        }
        RunSpec::GraphqlField { .. } => {
            let run_spec = run_spec.clone();
            Arc::new(move |args: ExecutionArgs, input: Value| {
                let run_spec = run_spec.clone();
                Box::pin(async move { crate::executors::graphql::execute_field(&run_spec, args, input).await })
            })
        }
        RunSpec::Mcp { .. } => {
            let run_spec = run_spec.clone();
            Arc::new(move |args: ExecutionArgs, input: Value| {
                let run_spec = run_spec.clone();
                Box::pin(async move { crate::executors::mcp::execute(&run_spec, args, input).await })
            })
        }
        RunSpec::Builtin { handler } => builtins.get(handler).cloned().unwrap_or_else(|| unknown_handler(handler.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ApprovalMode, ToolTyping};
    use std::collections::HashMap as Map;

    #[test]
    fn unregistered_builtin_handler_fails_on_call() {
        let serialized = SerializedTool {
            path: "sys.discover".into(),
            source: "system".into(),
            approval: ApprovalMode::Auto,
            description: "".into(),
            typing: ToolTyping::default(),
            credential: None,
            run_spec: RunSpec::Builtin { handler: "missing".into() },
        };
        let tool = rehydrate_tool(&serialized, &Map::new());
        let fut = (tool.run)(ExecutionArgs::default(), Value::Null);
        let result = futures_util::FutureExt::now_or_never(fut);
        assert!(result.is_some());
        assert!(result.unwrap().is_err());
    }

    #[test]
    fn registered_builtin_handler_is_used() {
        let mut builtins: Map<String, BuiltinHandler> = Map::new();
        builtins.insert(
            "echo".to_string(),
            Arc::new(|_args, input| Box::pin(async move { Ok(input) })),
        );
        let serialized = SerializedTool {
            path: "sys.echo".into(),
            source: "system".into(),
            approval: ApprovalMode::Auto,
            description: "".into(),
            typing: ToolTyping::default(),
            credential: None,
            run_spec: RunSpec::Builtin { handler: "echo".into() },
        };
        let tool = rehydrate_tool(&serialized, &builtins);
        let fut = (tool.run)(ExecutionArgs::default(), serde_json::json!({"a": 1}));
        let result = futures_util::FutureExt::now_or_never(fut).unwrap().unwrap();
        assert_eq!(result, serde_json::json!({"a": 1}));
    }
}
