//! Streaming event grammar for a turn.
//!
//! Consumers parse by the `type` tag and must ignore unknown tags. The set
//! is closed on the emitting side: `chunk` and `handoff` exist for modes
//! outside the planned/quick paths and are never emitted by the core.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeName {
    Understand,
    Think,
    Act,
    QuickAct,
    Reply,
    Summarize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseStatus {
    Started,
    Completed,
    Failed,
}

/// One row of the active working set, shown to the client up front.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveRef {
    #[serde(rename = "ref")]
    pub reference: String,
    pub label: String,
    pub action: String,
}

/// Events emitted while a turn executes.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum TurnEvent {
    #[serde(rename = "job_started")]
    JobStarted { job_id: Uuid },

    /// The curated working set after Understand.
    #[serde(rename = "active_context")]
    ActiveContext { refs: Vec<ActiveRef> },

    /// One per node transition.
    #[serde(rename = "phase_progress")]
    PhaseProgress {
        node: NodeName,
        status: PhaseStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        details: Option<String>,
    },

    /// Incremental text; only used by modes outside the core's scope.
    #[serde(rename = "chunk")]
    Chunk { text: String },

    /// Mode handoff; likewise outside the core's scope.
    #[serde(rename = "handoff")]
    Handoff { target: String },

    #[serde(rename = "done")]
    Done,

    #[serde(rename = "error")]
    Error { message: String },
}
