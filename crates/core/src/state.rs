//! The per-turn evolving record and the entry-point wire types.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use alfred_domain::event::ActiveRef;
use alfred_domain::step::{BatchManifest, Step, StepResult, TurnExecutionSummary};
use alfred_registry::conversation::ConversationRecord;
use alfred_registry::registry::SessionIdRegistry;

use crate::nodes::reply::ReplyOutput;
use crate::nodes::think::ThinkOutput;
use crate::nodes::understand::UnderstandOutput;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Wire types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Plan,
    Quick,
    Cook,
    Brainstorm,
}

impl Mode {
    /// Only the planned and quick paths run in the core.
    pub fn is_supported(self) -> bool {
        matches!(self, Self::Plan | Self::Quick)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UiChangeKind {
    Created,
    Updated,
    Deleted,
}

/// An out-of-band mutation the frontend applied and wants acknowledged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiChange {
    pub kind: UiChangeKind,
    pub table: String,
    /// Canonical identifier of the touched row.
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRequest {
    pub user_id: String,
    pub user_message: String,
    pub mode: Mode,
    #[serde(default)]
    pub ui_changes: Vec<UiChange>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnResult {
    pub response: String,
    pub active_context: Vec<ActiveRef>,
    /// Opaque handle for retrieving the job's event log.
    pub log_handle: String,
    pub job_id: Uuid,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Act bookkeeping
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Complete,
    Blocked,
}

/// Per-step outcome note, in plan order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActOutput {
    pub step_id: String,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Turn state
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Everything one turn accumulates, threaded explicitly through the nodes.
pub struct AlfredState {
    pub user_id: String,
    pub turn_id: u64,
    pub mode: Mode,
    pub user_message: String,
    pub ui_changes: Vec<UiChange>,

    pub understand_output: Option<UnderstandOutput>,
    pub think_output: Option<ThinkOutput>,
    pub act_outputs: Vec<ActOutput>,
    pub reply_output: Option<ReplyOutput>,
    pub summarize_output: Option<TurnExecutionSummary>,

    pub steps: Vec<Step>,
    pub current_step_index: usize,
    pub step_results: HashMap<String, StepResult>,
    pub batch_manifests: HashMap<String, BatchManifest>,
    pub tool_call_count_this_step: u32,

    /// Live registry; written back into the conversation record at
    /// Summarize.
    pub registry: SessionIdRegistry,
    /// Prior conversation state (its embedded registry snapshot is stale
    /// while the turn runs).
    pub record: ConversationRecord,

    /// Non-fatal problems, surfaced through Reply and the audit ledger.
    pub errors: Vec<String>,
    /// Audit accumulator filled in by Act and Quick.
    pub ledger: TurnExecutionSummary,
    pub timed_out: bool,
}

impl AlfredState {
    pub fn new(request: &TurnRequest, record: ConversationRecord) -> Self {
        let turn_id = record.next_turn_id;
        let registry = record.registry.clone();
        Self {
            user_id: request.user_id.clone(),
            turn_id,
            mode: request.mode,
            user_message: request.user_message.clone(),
            ui_changes: request.ui_changes.clone(),
            understand_output: None,
            think_output: None,
            act_outputs: Vec::new(),
            reply_output: None,
            summarize_output: None,
            steps: Vec::new(),
            current_step_index: 0,
            step_results: HashMap::new(),
            batch_manifests: HashMap::new(),
            tool_call_count_this_step: 0,
            registry,
            record,
            errors: Vec::new(),
            ledger: TurnExecutionSummary {
                turn_id,
                ..Default::default()
            },
            timed_out: false,
        }
    }

    pub fn note_error(&mut self, note: impl Into<String>) {
        let note = note.into();
        tracing::warn!(turn_id = self.turn_id, note = %note, "turn error noted");
        self.errors.push(note.clone());
        self.ledger.errors.push(note);
    }

    /// Step results visible to the Act prompt builder: the current turn
    /// plus the last two retained turns.
    pub fn visible_step_results(&self) -> Vec<&StepResult> {
        let mut results: Vec<&StepResult> = self
            .record
            .recent_turns(2)
            .iter()
            .flat_map(|t| t.step_results.iter())
            .collect();
        for step in &self.steps {
            if let Some(r) = self.step_results.get(&step.step_id) {
                results.push(r);
            }
        }
        results
    }

    /// Serializable checkpoint of step progress for the job record.
    pub fn steps_checkpoint(&self) -> Value {
        serde_json::json!({
            "total": self.steps.len(),
            "current": self.current_step_index,
            "completed": self.act_outputs,
        })
    }
}
