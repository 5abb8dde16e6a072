//! Act — execute the plan step by step.
//!
//! For each group in ascending order, each step runs a bounded loop:
//! build a step-scoped prompt, ask the interpreter for one action, execute
//! it through the tool gate, repeat until the step completes, blocks, or
//! hits the tool-call cap. Tool-layer errors never propagate past this
//! node; they become corrective hints, failed batch items, or a blocked
//! step.

use serde::Deserialize;
use serde_json::Value;

use alfred_context::views;
use alfred_domain::config::AlfredConfig;
use alfred_domain::error::ErrorCode;
use alfred_domain::interpreter::Interpreter;
use alfred_domain::schema;
use alfred_domain::step::{BatchManifest, Step, StepResult, StepType};
use alfred_tools::ops::{payload_for_table, ToolGate, ToolOutcome};
use alfred_tools::store::EntityStore;
use alfred_tools::filter;

use crate::state::{ActOutput, AlfredState, StepStatus};

use super::{call_structured, object_shape};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Interpreter action shape
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    DbRead,
    DbCreate,
    DbUpdate,
    DbDelete,
}

impl ToolName {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DbRead => "db_read",
            Self::DbCreate => "db_create",
            Self::DbUpdate => "db_update",
            Self::DbDelete => "db_delete",
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ToolCallAction {
    pub tool: ToolName,
    pub table: String,
    #[serde(default)]
    pub filters: Vec<Value>,
    #[serde(default)]
    pub payloads: Vec<Value>,
    #[serde(default)]
    pub patch: Option<Value>,
    #[serde(default)]
    pub original_refs: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActAction {
    ToolCall(ToolCallAction),
    StepComplete {
        #[serde(default)]
        summary: String,
        #[serde(default)]
        artifacts: Option<Vec<Value>>,
    },
    Blocked {
        reason: String,
        #[serde(default)]
        code: Option<ErrorCode>,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Plan execution
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Execute every step of the plan in group order. `on_step_done` fires
/// after each step so the caller can checkpoint the job.
pub async fn run(
    interpreter: &dyn Interpreter,
    store: &dyn EntityStore,
    config: &AlfredConfig,
    state: &mut AlfredState,
    mut on_step_done: impl FnMut(&AlfredState),
) {
    let mut order: Vec<usize> = (0..state.steps.len()).collect();
    order.sort_by_key(|&i| state.steps[i].group);

    for idx in order {
        state.current_step_index = idx;
        let step = state.steps[idx].clone();
        run_step(interpreter, store, config, state, &step).await;
        on_step_done(state);
    }
}

async fn run_step(
    interpreter: &dyn Interpreter,
    store: &dyn EntityStore,
    config: &AlfredConfig,
    state: &mut AlfredState,
    step: &Step,
) {
    let cap = config.limits.max_tool_calls_per_step;
    // A couple of extra interpreter rounds beyond the cap, so corrective
    // hints can still land before the step is forced shut.
    let max_rounds = cap + 2;

    if step.batch && step.step_type == StepType::Write {
        let items: Vec<(String, String)> = resolve_inputs(state, step)
            .into_iter()
            .map(|r| {
                let label = state.registry.label(&r).unwrap_or(r.as_str()).to_owned();
                (r, label)
            })
            .collect();
        if !items.is_empty() {
            state
                .batch_manifests
                .insert(step.step_id.clone(), BatchManifest::new(items));
        }
    }

    let mut result = StepResult::new(&step.step_id, step.step_type);
    let mut hints: Vec<String> = Vec::new();
    let mut tool_calls: u32 = 0;
    state.tool_call_count_this_step = 0;

    for _round in 0..max_rounds {
        let prompt = {
            let manifest = state.batch_manifests.get(&step.step_id);
            let prior = state.visible_step_results();
            let artifacts = gather_artifacts(state, step);
            views::act_step_prompt(step, manifest, &prior, &artifacts, &hints, tool_calls, cap)
        };

        let action: ActAction = match call_structured(
            interpreter,
            "act",
            prompt,
            object_shape("act_action", &["action"]),
            config.deadlines.step_deadline_ms,
        )
        .await
        {
            Ok(action) => action,
            Err(e) => match e.code() {
                Some(ErrorCode::ValidationError) => {
                    hints.push(format!("VALIDATION_ERROR: {e}"));
                    continue;
                }
                Some(ErrorCode::InterpreterTimeout) | Some(ErrorCode::StepDeadline) => {
                    force_complete(state, step, &mut result, ErrorCode::StepDeadline);
                    return;
                }
                _ => {
                    block_step(state, step, &mut result, &format!("interpreter failed: {e}"));
                    return;
                }
            },
        };

        match action {
            ActAction::ToolCall(call) => {
                if let Err(hint) = check_step_contract(step.step_type, call.tool) {
                    hints.push(hint);
                    continue;
                }
                if tool_calls >= cap {
                    force_complete(state, step, &mut result, ErrorCode::CapReached);
                    return;
                }

                let outcome = dispatch(store, state, step, &call).await;
                tool_calls += 1;
                state.tool_call_count_this_step = tool_calls;
                state.ledger.tools_called += 1;

                if outcome.ok {
                    absorb_success(state, &mut result, &call, outcome);
                } else {
                    let code = outcome.code.unwrap_or(ErrorCode::ValidationError);
                    let message = outcome.message.unwrap_or_default();
                    if code == ErrorCode::StoreUnavailable {
                        block_step(state, step, &mut result, &format!("{code}: {message}"));
                        return;
                    }
                    // FK / constraint failures already settled their batch
                    // items; the step may still complete around them.
                    hints.push(format!("{code}: {message}"));
                    state.ledger.errors.push(format!(
                        "{}: {code}: {message}",
                        step.step_id
                    ));
                }

                if tool_calls >= cap {
                    force_complete(state, step, &mut result, ErrorCode::CapReached);
                    return;
                }
            }

            ActAction::StepComplete { summary, artifacts } => {
                if let Some(manifest) = state.batch_manifests.get(&step.step_id) {
                    if !manifest.is_settled() {
                        hints.push(format!(
                            "cannot complete: batch items still open: {}",
                            manifest.unsettled_refs().join(", ")
                        ));
                        continue;
                    }
                }
                if step.step_type == StepType::Generate {
                    let Some(artifacts) = artifacts.filter(|a| !a.is_empty()) else {
                        hints.push(
                            "generate steps must return artifacts in step_complete".into(),
                        );
                        continue;
                    };
                    register_artifacts(state, step, &mut result, artifacts);
                }
                result.summary = summary;
                complete_step(state, step, result, None);
                return;
            }

            ActAction::Blocked { reason, code } => {
                let note = match code {
                    Some(code) => format!("{code}: {reason}"),
                    None => reason,
                };
                block_step(state, step, &mut result, &note);
                return;
            }
        }
    }

    force_complete(state, step, &mut result, ErrorCode::CapReached);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Dispatch
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Read steps only read; write steps only write; analyze and generate
/// steps make no database calls at all.
fn check_step_contract(step_type: StepType, tool: ToolName) -> Result<(), String> {
    let allowed = match step_type {
        StepType::Read => matches!(tool, ToolName::DbRead),
        StepType::Write => matches!(
            tool,
            ToolName::DbCreate | ToolName::DbUpdate | ToolName::DbDelete
        ),
        StepType::Analyze | StepType::Generate => false,
    };
    if allowed {
        Ok(())
    } else {
        Err(format!(
            "VALIDATION_ERROR: {} steps may not call {}; follow the step contract",
            step_type.as_str(),
            tool.as_str()
        ))
    }
}

async fn dispatch(
    store: &dyn EntityStore,
    state: &mut AlfredState,
    step: &Step,
    call: &ToolCallAction,
) -> ToolOutcome {
    let filters = match filter::parse_filters(&call.filters) {
        Ok(f) => f,
        Err(e) => return ToolOutcome::from_error(&e),
    };

    let manifest = state.batch_manifests.get_mut(&step.step_id);
    let mut gate = ToolGate::new(&mut state.registry, store, state.turn_id);

    match call.tool {
        ToolName::DbRead => gate.db_read(&call.table, filters).await,
        ToolName::DbCreate => {
            let payloads = if call.payloads.is_empty() {
                // Persisting prior artifacts: derive payloads from the
                // registry so no content is invented here.
                match derive_payloads(&gate, &call.table, call.original_refs.as_deref()) {
                    Ok(p) => p,
                    Err(outcome) => return outcome,
                }
            } else {
                call.payloads.clone()
            };
            gate.db_create(&call.table, payloads, call.original_refs.clone(), manifest)
                .await
        }
        ToolName::DbUpdate => {
            let Some(patch) = call.patch.clone() else {
                return ToolOutcome::fail(ErrorCode::ValidationError, "db_update requires a patch");
            };
            gate.db_update(&call.table, filters, patch).await
        }
        ToolName::DbDelete => gate.db_delete(&call.table, filters).await,
    }
}

fn derive_payloads(
    gate: &ToolGate<'_>,
    table: &str,
    original_refs: Option<&[String]>,
) -> Result<Vec<Value>, ToolOutcome> {
    let Some(originals) = original_refs.filter(|o| !o.is_empty()) else {
        return Err(ToolOutcome::fail(
            ErrorCode::ValidationError,
            "db_create requires payloads or original_refs",
        ));
    };
    let Some(schema) = schema::table(table) else {
        return Err(ToolOutcome::fail(
            ErrorCode::ValidationError,
            format!("unknown table: {table}"),
        ));
    };
    originals
        .iter()
        .map(|reference| {
            gate.peek_entity_data(reference)
                .map(|content| payload_for_table(&content, schema))
                .ok_or_else(|| {
                    ToolOutcome::fail(
                        ErrorCode::UnknownRef,
                        format!("no in-memory artifact for {reference}"),
                    )
                })
        })
        .collect()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Step bookkeeping
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Expand a step's declared inputs into refs: literal refs pass through,
/// step ids resolve to the refs that step produced.
fn resolve_inputs(state: &AlfredState, step: &Step) -> Vec<String> {
    let mut refs: Vec<String> = Vec::new();
    for input in &step.inputs {
        if state.registry.is_known_ref(input) {
            refs.push(input.clone());
        } else if let Some(result) = state.step_results.get(input) {
            refs.extend(result.ids.iter().cloned());
        }
    }
    refs.sort();
    refs.dedup();
    refs
}

/// Artifacts injected into the step prompt — the same content write,
/// generate, and analyze steps all see, read through the unified access
/// path.
fn gather_artifacts(state: &AlfredState, step: &Step) -> Vec<(String, Value)> {
    if step.step_type == StepType::Read {
        return Vec::new();
    }
    let mut refs = resolve_inputs(state, step);
    if let Some(manifest) = state.batch_manifests.get(&step.step_id) {
        for item in &manifest.items {
            refs.push(item.reference.clone());
        }
    }
    refs.sort();
    refs.dedup();
    refs.into_iter()
        .filter_map(|r| {
            state
                .registry
                .get_entity_data(&r)
                .map(|content| (r.clone(), content.clone()))
        })
        .collect()
}

fn absorb_success(
    state: &mut AlfredState,
    result: &mut StepResult,
    call: &ToolCallAction,
    outcome: ToolOutcome,
) {
    if let Some(rows) = outcome.rows {
        for row in &rows {
            if let Some(reference) = row.get("id").and_then(Value::as_str) {
                if !result.ids.iter().any(|r| r == reference) {
                    result.ids.push(reference.to_owned());
                }
            }
        }
        result
            .records
            .get_or_insert_with(Vec::new)
            .extend(rows);
    }
    if let Some(refs) = outcome.refs {
        match call.tool {
            ToolName::DbCreate => {
                state.ledger.entities_created.extend(refs.iter().cloned());
                if call.original_refs.is_some() {
                    state.ledger.artifacts_saved.extend(refs.iter().cloned());
                }
            }
            ToolName::DbUpdate => {
                state.ledger.entities_updated.extend(refs.iter().cloned());
            }
            ToolName::DbDelete => {
                state.ledger.entities_deleted.extend(refs.iter().cloned());
            }
            ToolName::DbRead => {}
        }
        for reference in refs {
            if !result.ids.contains(&reference) {
                result.ids.push(reference);
            }
        }
    }
}

fn register_artifacts(
    state: &mut AlfredState,
    step: &Step,
    result: &mut StepResult,
    artifacts: Vec<Value>,
) {
    let entity_type = schema::table(&step.subdomain)
        .map(|t| t.entity_type)
        .unwrap_or("item");
    let label_field = schema::table(&step.subdomain)
        .map(|t| t.label_field)
        .unwrap_or("name");

    for artifact in &artifacts {
        let label = artifact
            .get(label_field)
            .and_then(Value::as_str)
            .unwrap_or("untitled");
        let reference =
            state
                .registry
                .register_generated(entity_type, label, artifact.clone(), state.turn_id);
        state.ledger.artifacts_generated.push(reference.clone());
        result.ids.push(reference);
    }
    result.artifacts = Some(artifacts);
}

fn complete_step(
    state: &mut AlfredState,
    step: &Step,
    result: StepResult,
    note: Option<String>,
) {
    state.ledger.steps_completed += 1;
    state.step_results.insert(step.step_id.clone(), result);
    state.act_outputs.push(ActOutput {
        step_id: step.step_id.clone(),
        status: StepStatus::Complete,
        note,
    });
}

/// Cap or deadline ended the step: settle the manifest and complete with
/// an explicit note.
fn force_complete(
    state: &mut AlfredState,
    step: &Step,
    result: &mut StepResult,
    code: ErrorCode,
) {
    if let Some(manifest) = state.batch_manifests.get_mut(&step.step_id) {
        manifest.fail_unsettled(code.as_str());
    }
    state.note_error(format!("step {} forced complete: {code}", step.step_id));
    if result.summary.is_empty() {
        result.summary = format!("forced complete: {code}");
    }
    let result = std::mem::replace(result, StepResult::new(&step.step_id, step.step_type));
    complete_step(state, step, result, Some(code.as_str().to_owned()));
}

fn block_step(state: &mut AlfredState, step: &Step, result: &mut StepResult, reason: &str) {
    state.note_error(format!("step {} blocked: {reason}", step.step_id));
    result.summary = format!("blocked: {reason}");
    let result = std::mem::replace(result, StepResult::new(&step.step_id, step.step_type));
    state.step_results.insert(step.step_id.clone(), result);
    state.act_outputs.push(ActOutput {
        step_id: step.step_id.clone(),
        status: StepStatus::Blocked,
        note: Some(reason.to_owned()),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripted::ScriptedInterpreter;
    use crate::state::{Mode, TurnRequest};
    use alfred_registry::conversation::ConversationRecord;
    use alfred_tools::store::MemoryStore;
    use serde_json::json;

    fn state_with_steps(steps: Vec<Step>) -> AlfredState {
        let request = TurnRequest {
            user_id: "u1".into(),
            user_message: "do the thing".into(),
            mode: Mode::Plan,
            ui_changes: vec![],
        };
        let mut s = AlfredState::new(&request, ConversationRecord::new("u1"));
        s.ledger.steps_total = steps.len();
        s.steps = steps;
        s
    }

    fn step(id: &str, step_type: StepType, subdomain: &str, group: u32) -> Step {
        Step {
            step_id: id.into(),
            step_type,
            subdomain: subdomain.into(),
            group,
            description: format!("{id} step"),
            batch: false,
            inputs: vec![],
        }
    }

    #[tokio::test]
    async fn read_step_completes_on_empty_results() {
        let store = MemoryStore::new();
        let interp = ScriptedInterpreter::with_responses([
            json!({"action": "tool_call", "tool": "db_read", "table": "pantry_items"}),
            json!({"action": "step_complete", "summary": "pantry is empty"}),
        ]);
        let mut s = state_with_steps(vec![step("s1", StepType::Read, "pantry_items", 0)]);

        run(&interp, &store, &AlfredConfig::default(), &mut s, |_| {}).await;

        assert_eq!(s.act_outputs.len(), 1);
        assert_eq!(s.act_outputs[0].status, StepStatus::Complete);
        let result = &s.step_results["s1"];
        assert_eq!(result.records.as_ref().unwrap().len(), 0);
        assert!(s.registry.is_empty());
    }

    #[tokio::test]
    async fn generate_step_registers_artifacts() {
        let store = MemoryStore::new();
        let interp = ScriptedInterpreter::with_responses([json!({
            "action": "step_complete",
            "summary": "drafted two recipes",
            "artifacts": [
                {"name": "Cod cakes", "servings": 4},
                {"name": "Miso cod", "servings": 2}
            ]
        })]);
        let mut s = state_with_steps(vec![step("s1", StepType::Generate, "recipes", 0)]);

        run(&interp, &store, &AlfredConfig::default(), &mut s, |_| {}).await;

        assert_eq!(s.ledger.artifacts_generated, vec!["gen_recipe_1", "gen_recipe_2"]);
        assert!(s.registry.is_pending("gen_recipe_1"));
        assert_eq!(
            s.registry.get_entity_data("gen_recipe_2").unwrap()["name"],
            "Miso cod"
        );
    }

    #[tokio::test]
    async fn generate_then_write_promotes_through_the_manifest() {
        let store = MemoryStore::new();
        let interp = ScriptedInterpreter::with_responses([
            json!({
                "action": "step_complete",
                "summary": "drafted",
                "artifacts": [
                    {"name": "Cod cakes", "servings": 4},
                    {"name": "Miso cod", "servings": 2},
                    {"name": "Cod tacos", "servings": 3}
                ]
            }),
            json!({
                "action": "tool_call",
                "tool": "db_create",
                "table": "recipes",
                "original_refs": ["gen_recipe_1", "gen_recipe_2", "gen_recipe_3"]
            }),
            json!({"action": "step_complete", "summary": "saved all three"}),
        ]);

        let mut write = step("s2", StepType::Write, "recipes", 1);
        write.batch = true;
        write.inputs = vec![
            "gen_recipe_1".into(),
            "gen_recipe_2".into(),
            "gen_recipe_3".into(),
        ];
        let mut s = state_with_steps(vec![
            step("s1", StepType::Generate, "recipes", 0),
            write,
        ]);

        run(&interp, &store, &AlfredConfig::default(), &mut s, |_| {}).await;

        assert_eq!(s.ledger.steps_completed, 2);
        let manifest = &s.batch_manifests["s2"];
        assert_eq!(manifest.total, 3);
        assert!(manifest.is_settled());
        assert_eq!(s.ledger.artifacts_saved.len(), 3);
        assert_eq!(store.row_count("recipes"), 3);
        assert!(s.registry.promoted_sibling("gen_recipe_1").is_some());
    }

    #[tokio::test]
    async fn premature_completion_of_a_batch_write_is_refused() {
        let store = MemoryStore::new();
        let mut s = state_with_steps(vec![]);
        let gen = s.registry.register_generated(
            "recipe",
            "Cod cakes",
            json!({"name": "Cod cakes"}),
            1,
        );

        let mut write = step("s1", StepType::Write, "recipes", 0);
        write.batch = true;
        write.inputs = vec![gen.clone()];
        s.steps = vec![write];
        s.ledger.steps_total = 1;

        let interp = ScriptedInterpreter::with_responses([
            json!({"action": "step_complete", "summary": "done (not really)"}),
            json!({
                "action": "tool_call",
                "tool": "db_create",
                "table": "recipes",
                "original_refs": [gen]
            }),
            json!({"action": "step_complete", "summary": "actually done"}),
        ]);

        run(&interp, &store, &AlfredConfig::default(), &mut s, |_| {}).await;

        assert_eq!(s.act_outputs[0].status, StepStatus::Complete);
        assert!(s.batch_manifests["s1"].is_settled());
        assert_eq!(store.row_count("recipes"), 1);
        // The refusal hint appears in the third request.
        let reqs = interp.requests();
        assert!(reqs[1].user.contains("batch items still open"));
    }

    #[tokio::test]
    async fn cap_forces_completion() {
        let store = MemoryStore::new();
        let mut responses = Vec::new();
        for _ in 0..10 {
            responses.push(json!({
                "action": "tool_call", "tool": "db_read", "table": "recipes"
            }));
        }
        let interp = ScriptedInterpreter::with_responses(responses);
        let mut s = state_with_steps(vec![step("s1", StepType::Read, "recipes", 0)]);

        run(&interp, &store, &AlfredConfig::default(), &mut s, |_| {}).await;

        assert_eq!(s.tool_call_count_this_step, 5);
        assert_eq!(s.act_outputs[0].status, StepStatus::Complete);
        assert_eq!(s.act_outputs[0].note.as_deref(), Some("CAP_REACHED"));
        assert!(s.errors.iter().any(|e| e.contains("CAP_REACHED")));
    }

    #[tokio::test]
    async fn analyze_steps_may_not_call_tools() {
        let store = MemoryStore::new();
        let interp = ScriptedInterpreter::with_responses([
            json!({"action": "tool_call", "tool": "db_read", "table": "recipes"}),
            json!({"action": "step_complete", "summary": "{\"kept\": []}"}),
        ]);
        let mut s = state_with_steps(vec![step("s1", StepType::Analyze, "recipes", 0)]);

        run(&interp, &store, &AlfredConfig::default(), &mut s, |_| {}).await;

        assert_eq!(s.ledger.tools_called, 0);
        assert_eq!(s.act_outputs[0].status, StepStatus::Complete);
        let reqs = interp.requests();
        assert!(reqs[1].user.contains("step contract"));
    }

    #[tokio::test]
    async fn blocked_step_records_the_reason() {
        let store = MemoryStore::new();
        let interp = ScriptedInterpreter::with_responses([json!({
            "action": "blocked",
            "reason": "need the recipe ref",
            "code": "UNKNOWN_REF"
        })]);
        let mut s = state_with_steps(vec![step("s1", StepType::Read, "recipes", 0)]);

        run(&interp, &store, &AlfredConfig::default(), &mut s, |_| {}).await;

        assert_eq!(s.act_outputs[0].status, StepStatus::Blocked);
        assert!(s.act_outputs[0].note.as_deref().unwrap().contains("UNKNOWN_REF"));
        assert_eq!(s.ledger.steps_completed, 0);
    }

    #[tokio::test]
    async fn groups_execute_in_ascending_order() {
        let store = MemoryStore::new();
        let interp = ScriptedInterpreter::with_responses([
            json!({"action": "step_complete", "summary": "a"}),
            json!({"action": "step_complete", "summary": "b"}),
            json!({"action": "step_complete", "summary": "c"}),
        ]);
        let mut s = state_with_steps(vec![
            step("late", StepType::Analyze, "recipes", 2),
            step("early", StepType::Analyze, "recipes", 0),
            step("mid", StepType::Analyze, "recipes", 1),
        ]);

        let mut seen = Vec::new();
        run(&interp, &store, &AlfredConfig::default(), &mut s, |st| {
            seen.push(st.steps[st.current_step_index].step_id.clone());
        })
        .await;

        assert_eq!(seen, vec!["early", "mid", "late"]);
    }

    #[tokio::test]
    async fn interpreter_exhaustion_blocks_the_step() {
        let store = MemoryStore::new();
        let interp = ScriptedInterpreter::new();
        let mut s = state_with_steps(vec![step("s1", StepType::Read, "recipes", 0)]);

        run(&interp, &store, &AlfredConfig::default(), &mut s, |_| {}).await;

        assert_eq!(s.act_outputs[0].status, StepStatus::Blocked);
    }
}
