//! Reply — render committed state and pending artifacts for the user.
//!
//! The node is a witness: it reports what the system did, labels what is
//! saved versus generated, and never reconciles a gap between the plan and
//! the outcome. When the interpreter itself is unavailable, a plain
//! deterministic rendering still goes out.

use serde::{Deserialize, Serialize};

use alfred_context::views;
use alfred_domain::config::AlfredConfig;
use alfred_domain::interpreter::Interpreter;

use crate::nodes::think::ThinkOutput;
use crate::state::{AlfredState, StepStatus};

use super::{call_structured, object_shape};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyOutput {
    pub response: String,
    /// At most one suggestion, drawn from committed state or pending
    /// artifacts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_step: Option<String>,
}

/// Run the Reply node. Always produces output; interpreter failure falls
/// back to a deterministic rendering of the turn.
pub async fn run(
    interpreter: &dyn Interpreter,
    config: &AlfredConfig,
    state: &mut AlfredState,
) -> ReplyOutput {
    let execution = execution_section(state);
    let prompt = views::reply_prompt(
        &state.registry,
        &state.record,
        state.turn_id,
        config.limits.recent_turns_window,
        &state.user_message,
        &execution,
        &state.errors,
    );

    match call_structured::<ReplyOutput>(
        interpreter,
        "reply",
        prompt,
        object_shape("reply_output", &["response"]),
        config.deadlines.step_deadline_ms,
    )
    .await
    {
        Ok(output) => output,
        Err(e) => {
            state.note_error(format!("reply fell back to plain rendering: {e}"));
            ReplyOutput {
                response: fallback_response(state),
                next_step: None,
            }
        }
    }
}

/// What actually happened this turn, for the prompt. Discrepancies between
/// intent and outcome are stated, not resolved.
fn execution_section(state: &AlfredState) -> String {
    let mut out = String::from("## This turn\n");

    match &state.think_output {
        Some(ThinkOutput::Propose { proposal_message, .. }) => {
            out.push_str(&format!(
                "A plan was proposed and awaits confirmation: {proposal_message}\n"
            ));
        }
        Some(ThinkOutput::Clarify {
            clarification_questions,
            ..
        }) => {
            out.push_str(&format!(
                "Clarification is needed: {}\n",
                clarification_questions.join(" | ")
            ));
        }
        _ => {}
    }

    if state.act_outputs.is_empty() {
        out.push_str("No steps executed.\n");
    }
    for output in &state.act_outputs {
        let line = match output.status {
            StepStatus::Complete => match &output.note {
                Some(note) => format!("step {} completed with note {note}\n", output.step_id),
                None => format!("step {} completed\n", output.step_id),
            },
            StepStatus::Blocked => format!(
                "step {} blocked: {}\n",
                output.step_id,
                output.note.as_deref().unwrap_or("no reason given")
            ),
        };
        out.push_str(&line);
        if let Some(result) = state.step_results.get(&output.step_id) {
            if let Some(records) = &result.records {
                out.push_str(&format!(
                    "  rows: {}\n",
                    serde_json::to_string(records).unwrap_or_default()
                ));
            }
            if !result.summary.is_empty() {
                out.push_str(&format!("  summary: {}\n", result.summary));
            }
        }
    }

    if state.timed_out {
        out.push_str("The turn hit its deadline; results above are partial.\n");
    }
    out.trim_end().to_owned()
}

/// Deterministic rendering used when the interpreter is unavailable.
fn fallback_response(state: &AlfredState) -> String {
    let completed = state
        .act_outputs
        .iter()
        .filter(|o| o.status == StepStatus::Complete)
        .count();
    let blocked = state.act_outputs.len() - completed;
    let mut parts = vec![format!(
        "I finished {completed} of {} planned steps.",
        state.act_outputs.len().max(state.ledger.steps_total)
    )];
    if blocked > 0 {
        parts.push(format!("{blocked} could not run."));
    }
    if !state.errors.is_empty() {
        parts.push("Something went wrong along the way; nothing was lost, and you can ask me to try again.".into());
    }
    parts.join(" ")
}
