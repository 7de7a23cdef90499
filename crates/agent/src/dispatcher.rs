use std::time::Instant;

use futures_util::future::join_all;
use serde_json::{Map, Value};

use helmsman_core::domain::run::{ToolCall, ToolOutput};

use crate::capabilities::{validate_arguments, ActiveCapabilities, CapabilityArgs, CapabilityError};
use crate::context::ExecutionContext;

/// Prefix of every output produced for a failed dispatch.
pub const ERROR_MARKER: &str = "error:";

pub fn is_error_output(output: &str) -> bool {
    output.starts_with(ERROR_MARKER)
}

fn error_output(message: impl std::fmt::Display) -> String {
    format!("{ERROR_MARKER} {message}")
}

/// Executes tool calls against an immutable capability snapshot. Dispatch
/// never fails: every problem is rendered as text starting with
/// [`ERROR_MARKER`] so the engine can reason about it.
#[derive(Clone)]
pub struct Dispatcher {
    active: ActiveCapabilities,
}

impl Dispatcher {
    pub fn new(active: ActiveCapabilities) -> Self {
        Self { active }
    }

    pub fn active(&self) -> &ActiveCapabilities {
        &self.active
    }

    pub async fn execute(&self, ctx: &ExecutionContext, name: &str, arguments_json: &str) -> String {
        let started = Instant::now();
        let result = self.try_execute(ctx, name, arguments_json).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(output) => {
                tracing::info!(
                    event_name = "agent.capability.dispatched",
                    capability = name,
                    outcome = "ok",
                    duration_ms,
                    "capability executed"
                );
                output
            }
            Err(error) => {
                tracing::warn!(
                    event_name = "agent.capability.dispatched",
                    capability = name,
                    outcome = "error",
                    duration_ms,
                    error = %error,
                    "capability failed"
                );
                error_output(error)
            }
        }
    }

    async fn try_execute(
        &self,
        ctx: &ExecutionContext,
        name: &str,
        arguments_json: &str,
    ) -> Result<String, CapabilityError> {
        let capability = self.active.get(name).ok_or_else(|| {
            CapabilityError::InvalidArguments(format!("capability `{name}` is not available"))
        })?;

        let values = parse_arguments(arguments_json)?;
        validate_arguments(capability.parameters(), &values)?;
        let args = CapabilityArgs::new(values);

        if ctx.is_cancelled() {
            return Err(CapabilityError::Cancelled);
        }
        ctx.guard(capability.execute(ctx, &args)).await
    }

    /// Executes every call of one `requires_action` episode concurrently.
    /// Outputs are returned in call order, one per call.
    pub async fn execute_all(&self, ctx: &ExecutionContext, calls: &[ToolCall]) -> Vec<ToolOutput> {
        join_all(calls.iter().map(|call| async move {
            ToolOutput {
                tool_call_id: call.id.clone(),
                output: self.execute(ctx, &call.capability_name, &call.arguments_json).await,
            }
        }))
        .await
    }
}

fn parse_arguments(arguments_json: &str) -> Result<Map<String, Value>, CapabilityError> {
    if arguments_json.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(arguments_json) {
        Ok(Value::Object(values)) => Ok(values),
        Ok(Value::Null) => Ok(Map::new()),
        Ok(_) => Err(CapabilityError::InvalidArguments(
            "arguments must be a JSON object".to_string(),
        )),
        Err(err) => {
            Err(CapabilityError::InvalidArguments(format!("malformed arguments JSON: {err}")))
        }
    }
}
