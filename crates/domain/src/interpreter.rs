//! The interpreter seam.
//!
//! The core never talks to an LLM provider directly; it calls this trait
//! with a system prompt, a user prompt, and the shape the structured
//! response must satisfy. Streaming, retries above the per-call deadline,
//! and provider selection all live behind the implementation.

use serde_json::Value;

use crate::error::Result;

/// Named JSON shape the response must conform to. The schema is advisory
/// for providers that support constrained decoding; callers still validate
/// the parsed output.
#[derive(Debug, Clone)]
pub struct ResponseShape {
    pub name: &'static str,
    pub schema: Value,
}

impl ResponseShape {
    pub fn new(name: &'static str, schema: Value) -> Self {
        Self { name, schema }
    }
}

/// Per-call knobs.
#[derive(Debug, Clone, Default)]
pub struct CallConfig {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Hard deadline for this call; enforced by the caller with a timeout.
    pub deadline_ms: Option<u64>,
}

/// One structured-output request.
#[derive(Debug, Clone)]
pub struct InterpreterRequest {
    pub system: String,
    pub user: String,
    pub shape: ResponseShape,
    pub config: CallConfig,
}

/// Trait every interpreter adapter must implement.
#[async_trait::async_trait]
pub trait Interpreter: Send + Sync {
    /// Send one request and return the structured response.
    async fn call(&self, req: InterpreterRequest) -> Result<Value>;

    /// A unique identifier for this interpreter instance.
    fn interpreter_id(&self) -> &str;
}
