use serde::Serialize;

/// Structured trace events emitted across all Alfred crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    TurnStarted {
        user_id: String,
        turn_id: u64,
        mode: String,
    },
    NodeFinished {
        node: String,
        turn_id: u64,
        duration_ms: u64,
        ok: bool,
    },
    InterpreterCall {
        node: String,
        shape: String,
        duration_ms: u64,
        ok: bool,
    },
    ToolDispatched {
        op: String,
        table: String,
        rerouted: bool,
        ok: bool,
    },
    RefMinted {
        reference: String,
        entity_type: String,
        generated: bool,
    },
    ArtifactPromoted {
        gen_ref: String,
        saved_ref: String,
    },
    ConversationCompacted {
        user_id: String,
        turns_compacted: usize,
    },
    RegistryPersisted {
        user_id: String,
        refs: usize,
        pending_artifacts: usize,
    },
    JobFinished {
        job_id: String,
        status: String,
        duration_ms: u64,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "alfred_event");
    }
}
