//! Quick Act — a one-shot bypass for trivial reads.
//!
//! One interpreter call, at most one `db_read`, no step loop, no batch
//! manifest. Anything that cannot be answered that way falls back to the
//! planned path on the next turn; this turn still replies gracefully.

use serde::Deserialize;
use serde_json::Value;

use alfred_context::views;
use alfred_domain::config::AlfredConfig;
use alfred_domain::interpreter::Interpreter;
use alfred_domain::step::{StepResult, StepType};
use alfred_tools::filter;
use alfred_tools::ops::ToolGate;
use alfred_tools::store::EntityStore;

use crate::nodes::act::ToolName;
use crate::state::{ActOutput, AlfredState, StepStatus};

use super::{call_structured, object_shape};

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum QuickAction {
    ToolCall {
        tool: ToolName,
        table: String,
        #[serde(default)]
        filters: Vec<Value>,
    },
    Blocked {
        reason: String,
    },
}

const QUICK_STEP_ID: &str = "quick_1";

/// Run the quick path. Returns true when the read produced an answer;
/// false means the classifier was wrong and the reply should say so.
pub async fn run(
    interpreter: &dyn Interpreter,
    store: &dyn EntityStore,
    config: &AlfredConfig,
    state: &mut AlfredState,
) -> bool {
    state.ledger.steps_total = config.limits.max_steps_quick;

    let constraints_json =
        serde_json::to_value(&state.record.constraints).unwrap_or(Value::Null);
    let prompt = views::quick_prompt(&state.user_message, &constraints_json);

    let action: QuickAction = match call_structured(
        interpreter,
        "quick_act",
        prompt,
        object_shape("quick_action", &["action"]),
        config.deadlines.step_deadline_ms,
    )
    .await
    {
        Ok(action) => action,
        Err(e) => {
            state.note_error(format!("quick path failed: {e}"));
            return false;
        }
    };

    let (table, raw_filters) = match action {
        QuickAction::ToolCall {
            tool: ToolName::DbRead,
            table,
            filters,
        } => (table, filters),
        QuickAction::ToolCall { tool, .. } => {
            // Guardrail: the quick path never writes.
            state.note_error(format!(
                "quick path refused {}: only db_read is allowed",
                tool.as_str()
            ));
            return false;
        }
        QuickAction::Blocked { reason } => {
            state.note_error(format!("quick path blocked: {reason}"));
            return false;
        }
    };

    let filters = match filter::parse_filters(&raw_filters) {
        Ok(f) => f,
        Err(e) => {
            state.note_error(format!("quick path filters invalid: {e}"));
            return false;
        }
    };

    let mut gate = ToolGate::new(&mut state.registry, store, state.turn_id);
    let outcome = gate.db_read(&table, filters).await;
    state.ledger.tools_called += 1;
    state.tool_call_count_this_step = 1;

    if !outcome.ok {
        let note = format!(
            "quick read failed: {}: {}",
            outcome
                .code
                .map(|c| c.as_str())
                .unwrap_or("VALIDATION_ERROR"),
            outcome.message.unwrap_or_default()
        );
        state.note_error(note);
        return false;
    }

    let rows = outcome.rows.unwrap_or_default();
    let mut result = StepResult::new(QUICK_STEP_ID, StepType::Read);
    result.summary = format!("quick read of {table}: {} rows", rows.len());
    for row in &rows {
        if let Some(reference) = row.get("id").and_then(Value::as_str) {
            result.ids.push(reference.to_owned());
        }
    }
    result.records = Some(rows);
    state.step_results.insert(QUICK_STEP_ID.to_owned(), result);
    state.act_outputs.push(ActOutput {
        step_id: QUICK_STEP_ID.to_owned(),
        status: StepStatus::Complete,
        note: None,
    });
    state.ledger.steps_completed = 1;
    true
}
