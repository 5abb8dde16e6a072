//! Think — turn the understood request into an executable plan, a
//! proposal, or clarification questions, and merge the turn's constraint
//! snapshot into the session deterministically.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::json;

use alfred_context::views;
use alfred_domain::config::AlfredConfig;
use alfred_domain::error::{Error, Result};
use alfred_domain::interpreter::Interpreter;
use alfred_domain::schema;
use alfred_domain::step::{Step, StepType};
use alfred_registry::refs;

use crate::nodes::understand::UnderstandOutput;
use crate::state::AlfredState;

use super::{call_structured, object_shape};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum ThinkOutput {
    /// Clear request: execute now.
    PlanDirect { goal: String, steps: Vec<Step> },
    /// Complex or multi-phase: wait for confirmation next turn.
    Propose { goal: String, proposal_message: String },
    /// Used sparingly; propose is preferred.
    Clarify {
        goal: String,
        clarification_questions: Vec<String>,
    },
}

#[derive(Debug, Deserialize)]
struct QuickVerdict {
    approve: bool,
    #[serde(default)]
    reason: String,
}

/// Run the Think node. The constraint merge happens here, before the
/// interpreter call, so the plan sees the merged session state.
pub async fn run(
    interpreter: &dyn Interpreter,
    config: &AlfredConfig,
    state: &mut AlfredState,
    understand: &UnderstandOutput,
) -> Result<ThinkOutput> {
    state
        .record
        .constraints
        .merge(&understand.constraint_snapshot);

    let understand_json = serde_json::to_value(understand)?;
    let constraints_json = serde_json::to_value(&state.record.constraints)?;
    let prompt = views::think_prompt(
        &state.registry,
        &state.record,
        state.turn_id,
        config.limits.recent_turns_window,
        config.limits.max_steps_plan,
        &understand_json,
        &constraints_json,
    );

    let output: ThinkOutput = call_structured(
        interpreter,
        "think",
        prompt,
        object_shape("think_output", &["decision"]),
        config.deadlines.step_deadline_ms,
    )
    .await?;

    if let ThinkOutput::PlanDirect { steps, .. } = &output {
        validate_plan(steps, config, state)?;
    }
    Ok(output)
}

/// Second opinion on a medium-confidence quick classification. A failed
/// or malformed verdict vetoes to the planned path.
pub async fn validate_quick(
    interpreter: &dyn Interpreter,
    config: &AlfredConfig,
    state: &AlfredState,
    understand: &UnderstandOutput,
) -> bool {
    let prompt = alfred_context::NodePrompt {
        system: format!(
            "{}\n\nYou are double-checking a quick-mode classification for a \
             kitchen assistant. Approve only if the request is a trivial \
             single-domain read: no writes, no reasoning, no multiple domains.",
            alfred_context::templates::PRECEDENCE_HEADER
        ),
        user: format!(
            "User message: {}\nProcessed: {}\nRespond with JSON: {{\"approve\": bool, \"reason\": string}}",
            state.user_message, understand.processed_message
        ),
    };
    match call_structured::<QuickVerdict>(
        interpreter,
        "think",
        prompt,
        object_shape("quick_verdict", &["approve"]),
        config.deadlines.step_deadline_ms,
    )
    .await
    {
        Ok(verdict) => {
            if !verdict.approve {
                tracing::debug!(reason = %verdict.reason, "quick mode vetoed");
            }
            verdict.approve
        }
        Err(_) => false,
    }
}

/// Structural checks on a direct plan. Violations are node-level errors:
/// they surface through Reply, never execute.
fn validate_plan(steps: &[Step], config: &AlfredConfig, state: &AlfredState) -> Result<()> {
    if steps.is_empty() {
        return Err(Error::validation("plan has no steps"));
    }
    if steps.len() > config.limits.max_steps_plan {
        return Err(Error::validation(format!(
            "plan has {} steps; the limit is {}",
            steps.len(),
            config.limits.max_steps_plan
        )));
    }

    let mut ids: HashSet<&str> = HashSet::new();
    for step in steps {
        if !ids.insert(&step.step_id) {
            return Err(Error::validation(format!(
                "duplicate step_id: {}",
                step.step_id
            )));
        }
        if schema::table(&step.subdomain).is_none() {
            return Err(Error::validation(format!(
                "step {} names unknown subdomain '{}'",
                step.step_id, step.subdomain
            )));
        }
    }

    // Inputs must be resolvable: a known ref, or the id of a step in a
    // strictly lower group (same-group steps are independent).
    for step in steps {
        for input in &step.inputs {
            if refs::is_ref_shaped(input) {
                if !state.registry.is_known_ref(input) {
                    return Err(Error::unknown_ref(input));
                }
                continue;
            }
            let producer = steps.iter().find(|s| s.step_id == *input);
            match producer {
                Some(p) if p.group < step.group => {}
                Some(p) => {
                    return Err(Error::validation(format!(
                        "step {} consumes {} from group {}, but runs in group {}",
                        step.step_id, input, p.group, step.group
                    )));
                }
                None => {
                    return Err(Error::validation(format!(
                        "step {} consumes unknown input '{}'",
                        step.step_id, input
                    )));
                }
            }
        }
    }

    // Batch writes persist existing content; they must name what.
    for step in steps {
        if step.step_type == StepType::Write && step.batch && step.inputs.is_empty() {
            return Err(Error::validation(format!(
                "batch write step {} declares no inputs to persist",
                step.step_id
            )));
        }
    }

    Ok(())
}

/// One corrective retry on malformed or invalid plans, then surface.
pub async fn run_with_retry(
    interpreter: &dyn Interpreter,
    config: &AlfredConfig,
    state: &mut AlfredState,
    understand: &UnderstandOutput,
) -> Result<ThinkOutput> {
    match run(interpreter, config, state, understand).await {
        Ok(output) => Ok(output),
        Err(first) => {
            state.note_error(format!("plan rejected, retrying once: {first}"));
            let hint = json!({
                "previous_error": first.to_string(),
            });
            // Re-run with the error folded into the understand payload so
            // the interpreter sees what to fix.
            let mut amended = understand.clone();
            amended
                .constraint_snapshot
                .source_phrases
                .push(format!("correction: {hint}"));
            run(interpreter, config, state, &amended).await
        }
    }
}
