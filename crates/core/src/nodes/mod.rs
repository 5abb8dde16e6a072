//! The five nodes plus the quick path.
//!
//! Each node is one function: state in, structured output out. Interpreter
//! calls go through [`call_structured`], which enforces the per-call
//! deadline and turns malformed output into a tagged `VALIDATION_ERROR`.

pub mod act;
pub mod quick;
pub mod reply;
pub mod summarize;
pub mod think;
pub mod understand;

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;

use alfred_context::NodePrompt;
use alfred_domain::error::{Error, ErrorCode, Result};
use alfred_domain::interpreter::{CallConfig, Interpreter, InterpreterRequest, ResponseShape};
use alfred_domain::trace::TraceEvent;

/// Call the interpreter and parse its structured output.
pub(crate) async fn call_structured<T: DeserializeOwned>(
    interpreter: &dyn Interpreter,
    node: &str,
    prompt: NodePrompt,
    shape: ResponseShape,
    deadline_ms: u64,
) -> Result<T> {
    let shape_name = shape.name;
    let req = InterpreterRequest {
        system: prompt.system,
        user: prompt.user,
        shape,
        config: CallConfig {
            temperature: Some(0.2),
            max_tokens: None,
            deadline_ms: Some(deadline_ms),
        },
    };

    let started = std::time::Instant::now();
    let outcome = tokio::time::timeout(Duration::from_millis(deadline_ms), interpreter.call(req))
        .await
        .map_err(|_| {
            Error::tagged(
                ErrorCode::InterpreterTimeout,
                format!("{node} interpreter call exceeded {deadline_ms}ms"),
            )
        })?;

    let duration_ms = started.elapsed().as_millis() as u64;
    TraceEvent::InterpreterCall {
        node: node.to_owned(),
        shape: shape_name.to_owned(),
        duration_ms,
        ok: outcome.is_ok(),
    }
    .emit();

    let value = outcome?;
    parse_structured(value)
}

pub(crate) fn parse_structured<T: DeserializeOwned>(value: Value) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| Error::tagged(ErrorCode::ValidationError, format!("malformed output: {e}")))
}

/// Minimal object shape; providers with constrained decoding use it, the
/// nodes validate regardless.
pub(crate) fn object_shape(name: &'static str, required: &[&str]) -> ResponseShape {
    ResponseShape::new(
        name,
        serde_json::json!({
            "type": "object",
            "required": required,
        }),
    )
}
