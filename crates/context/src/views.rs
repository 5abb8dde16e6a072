//! Per-node prompt assembly.
//!
//! Each view composes exactly the layers its node is entitled to see, with
//! the precedence header leading every prompt: Think gets refs and labels
//! but no payloads, Act gets the current step with full artifacts, Reply
//! gets pending artifact content so it can show generated-but-unsaved
//! work.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use alfred_domain::schema;
use alfred_domain::step::{BatchManifest, Step, StepResult, StepType};
use alfred_registry::conversation::ConversationRecord;
use alfred_registry::registry::SessionIdRegistry;

use crate::entity;
use crate::layers;
use crate::templates::{self, render};

/// System and user halves of one interpreter call.
#[derive(Debug, Clone)]
pub struct NodePrompt {
    pub system: String,
    pub user: String,
}

static UUID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}")
        .unwrap()
});

/// True when the text contains a canonical identifier pattern. Prompts
/// must never.
pub fn contains_canonical_id(text: &str) -> bool {
    UUID_RE.is_match(text)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Understand
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub fn understand_prompt(
    registry: &SessionIdRegistry,
    record: &ConversationRecord,
    current_turn: u64,
    recent_window: u64,
    user_message: &str,
    ui_note: &str,
) -> NodePrompt {
    let system = render(
        templates::UNDERSTAND_SYSTEM,
        &[("precedence", templates::PRECEDENCE_HEADER)],
    );
    let user = render(
        templates::UNDERSTAND_USER,
        &[
            (
                "entity_context",
                &entity::render(registry, current_turn, recent_window),
            ),
            (
                "conversation",
                &layers::conversation_layer(record, recent_window as usize),
            ),
            ("reasoning", &layers::reasoning_layer(record)),
            ("ui_changes", ui_note),
            ("user_message", user_message),
        ],
    );
    NodePrompt { system, user }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Think
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[allow(clippy::too_many_arguments)]
pub fn think_prompt(
    registry: &SessionIdRegistry,
    record: &ConversationRecord,
    current_turn: u64,
    recent_window: u64,
    max_steps: usize,
    understand_json: &Value,
    constraints_json: &Value,
) -> NodePrompt {
    let system = render(
        templates::THINK_SYSTEM,
        &[
            ("precedence", templates::PRECEDENCE_HEADER),
            ("max_steps", &max_steps.to_string()),
        ],
    );
    let (refs, generated) = entity::render_refs_only(registry, current_turn, recent_window);
    let user = render(
        templates::THINK_USER,
        &[
            ("entity_refs", &refs),
            ("generated_content", &generated),
            (
                "conversation",
                &layers::conversation_layer(record, recent_window as usize),
            ),
            ("reasoning", &layers::reasoning_layer(record)),
            ("constraints", &constraints_json.to_string()),
            ("understand", &understand_json.to_string()),
        ],
    );
    NodePrompt { system, user }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Act
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn step_contract(step_type: StepType) -> &'static str {
    match step_type {
        StepType::Read => "\
- Emit db_read calls only. An empty result is a valid, complete answer; \
do not retry it.",
        StepType::Write => "\
- Emit db_create, db_update, or db_delete. Invent no new content: payloads \
come from prior generated artifacts or structured plan inputs. When \
persisting generated artifacts, pass their refs as original_refs.",
        StepType::Analyze => "\
- Emit no tool calls. Work over the data already shown and finish with \
step_complete carrying a structured summary.",
        StepType::Generate => "\
- Emit no database tool calls. Finish with step_complete carrying the \
generated artifacts as structured JSON, one object per item.",
    }
}

/// Schema slice relevant to the step's subdomain: the table plus any
/// linked children.
fn schema_slice(subdomain: &str) -> String {
    match schema::table(subdomain) {
        Some(t) => {
            let mut out = t.describe();
            for child in schema::children_of(t.table) {
                out.push_str(&format!("\nlinked child {}", child.describe()));
            }
            out
        }
        None => schema::TABLES
            .iter()
            .map(|t| t.describe())
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

#[allow(clippy::too_many_arguments)]
pub fn act_step_prompt(
    step: &Step,
    manifest: Option<&BatchManifest>,
    prior_results: &[&StepResult],
    artifacts: &[(String, Value)],
    hints: &[String],
    tool_calls_used: u32,
    tool_call_cap: u32,
) -> NodePrompt {
    let system = render(
        templates::ACT_SYSTEM,
        &[
            ("precedence", templates::PRECEDENCE_HEADER),
            ("step_type", step.step_type.as_str()),
            ("step_contract", step_contract(step.step_type)),
        ],
    );

    let manifest_section = match manifest {
        Some(m) => format!(
            "Batch manifest ({} items):\n{}",
            m.total,
            serde_json::to_string_pretty(m).unwrap_or_default()
        ),
        None => String::from("Batch manifest: (none)"),
    };

    let prior_section = if prior_results.is_empty() {
        String::from("Prior step results: (none)")
    } else {
        let mut out = String::from("Prior step results:\n");
        for r in prior_results {
            out.push_str(&serde_json::to_string(r).unwrap_or_default());
            out.push('\n');
        }
        out.trim_end().to_owned()
    };

    // Write, generate, and analyze steps all receive the full artifact
    // JSON; consumers must never see less than producers stored.
    let artifacts_section = if artifacts.is_empty() {
        String::from("Generated artifacts: (none)")
    } else {
        let mut out = String::from("Generated artifacts (full content):\n");
        for (reference, content) in artifacts {
            out.push_str(&format!("{reference}: {content}\n"));
        }
        out.trim_end().to_owned()
    };

    let hints_section = if hints.is_empty() {
        String::new()
    } else {
        format!("Corrections from previous attempts:\n{}\n", hints.join("\n"))
    };

    let user = render(
        templates::ACT_USER,
        &[
            ("step_id", &step.step_id),
            ("step_type", step.step_type.as_str()),
            ("subdomain", &step.subdomain),
            ("description", &step.description),
            ("schema_slice", &schema_slice(&step.subdomain)),
            ("manifest", &manifest_section),
            ("prior_results", &prior_section),
            ("artifacts", &artifacts_section),
            ("hints", &hints_section),
            ("tool_calls_used", &tool_calls_used.to_string()),
            ("tool_call_cap", &tool_call_cap.to_string()),
        ],
    );
    NodePrompt { system, user }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Quick
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub fn quick_prompt(user_message: &str, constraints_json: &Value) -> NodePrompt {
    let system = render(
        templates::QUICK_SYSTEM,
        &[("precedence", templates::PRECEDENCE_HEADER)],
    );
    let slices = schema::TABLES
        .iter()
        .map(|t| t.describe())
        .collect::<Vec<_>>()
        .join("\n");
    let user = render(
        templates::QUICK_USER,
        &[
            ("schema_slices", &slices),
            ("constraints", &constraints_json.to_string()),
            ("user_message", user_message),
        ],
    );
    NodePrompt { system, user }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Reply
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[allow(clippy::too_many_arguments)]
pub fn reply_prompt(
    registry: &SessionIdRegistry,
    record: &ConversationRecord,
    current_turn: u64,
    recent_window: u64,
    user_message: &str,
    execution_section: &str,
    error_notes: &[String],
) -> NodePrompt {
    let system = render(
        templates::REPLY_SYSTEM,
        &[("precedence", templates::PRECEDENCE_HEADER)],
    );

    let pending = {
        let refs = registry.pending_refs();
        if refs.is_empty() {
            String::from("Pending artifacts: (none)")
        } else {
            let mut out = String::from("Pending artifacts (generated but not yet saved):\n");
            for reference in refs {
                if let Some(content) = registry.get_entity_data(reference) {
                    out.push_str(&format!("{reference}: {content}\n"));
                }
            }
            out.trim_end().to_owned()
        }
    };

    let errors = if error_notes.is_empty() {
        String::new()
    } else {
        format!("Problems this turn:\n{}\n", error_notes.join("\n"))
    };

    let user = render(
        templates::REPLY_USER,
        &[
            (
                "entity_context",
                &entity::render(registry, current_turn, recent_window),
            ),
            (
                "conversation",
                &layers::conversation_layer(record, recent_window as usize),
            ),
            ("reasoning", &layers::reasoning_layer(record)),
            ("execution", execution_section),
            ("pending_artifacts", &pending),
            ("errors", &errors),
            ("user_message", user_message),
        ],
    );
    NodePrompt { system, user }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    fn seeded_registry() -> SessionIdRegistry {
        let mut reg = SessionIdRegistry::new();
        let id = Uuid::new_v4().to_string();
        reg.register_read(&id, "recipe", Some("Cod cakes"), 1);
        reg.register_generated("recipe", "Miso cod", json!({"name": "Miso cod"}), 1);
        reg
    }

    #[test]
    fn no_prompt_leaks_canonical_identifiers() {
        let reg = seeded_registry();
        let record = ConversationRecord::new("u1");
        let prompts = [
            understand_prompt(&reg, &record, 1, 2, "what's in my pantry?", ""),
            think_prompt(&reg, &record, 1, 2, 8, &json!({}), &json!({})),
            reply_prompt(&reg, &record, 1, 2, "show me", "Executed: nothing", &[]),
            quick_prompt("what's in my pantry?", &json!({})),
        ];
        for p in &prompts {
            assert!(!contains_canonical_id(&p.system), "system leaked an id");
            assert!(!contains_canonical_id(&p.user), "user leaked an id");
            assert!(p.system.starts_with("PRECEDENCE:"));
        }
    }

    #[test]
    fn think_sees_generated_refs_without_payloads() {
        let reg = seeded_registry();
        let record = ConversationRecord::new("u1");
        let p = think_prompt(&reg, &record, 1, 2, 8, &json!({}), &json!({}));
        assert!(p.user.contains("gen_recipe_2 | Miso cod"));
        assert!(p.user.contains("full data available during execution"));
        assert!(!p.user.contains("{\"name\":\"Miso cod\"}"));
    }

    #[test]
    fn reply_sees_full_pending_artifacts() {
        let reg = seeded_registry();
        let record = ConversationRecord::new("u1");
        let p = reply_prompt(&reg, &record, 1, 2, "show me", "", &[]);
        assert!(p.user.contains("generated but not yet saved"));
        assert!(p.user.contains("{\"name\":\"Miso cod\"}"));
    }

    #[test]
    fn act_prompt_injects_artifacts_for_all_step_types() {
        let step = Step {
            step_id: "s2".into(),
            step_type: StepType::Analyze,
            subdomain: "recipes".into(),
            group: 1,
            description: "compare the drafts".into(),
            batch: false,
            inputs: vec!["gen_recipe_1".into()],
        };
        let artifacts = vec![("gen_recipe_1".to_owned(), json!({"name": "Miso cod"}))];
        let p = act_step_prompt(&step, None, &[], &artifacts, &[], 0, 5);
        assert!(p.user.contains("gen_recipe_1: {\"name\":\"Miso cod\"}"));
        assert!(p.system.contains("Emit no tool calls"));
        assert!(p.user.contains("Tool calls used: 0 of 5"));
    }

    #[test]
    fn act_schema_slice_names_linked_children() {
        let step = Step {
            step_id: "s1".into(),
            step_type: StepType::Write,
            subdomain: "recipes".into(),
            group: 0,
            description: "save the drafts".into(),
            batch: true,
            inputs: vec![],
        };
        let p = act_step_prompt(&step, None, &[], &[], &[], 0, 5);
        assert!(p.user.contains("linked child recipe_ingredients"));
    }

    #[test]
    fn corrective_hints_are_rendered() {
        let step = Step {
            step_id: "s1".into(),
            step_type: StepType::Read,
            subdomain: "pantry_items".into(),
            group: 0,
            description: "read the pantry".into(),
            batch: false,
            inputs: vec![],
        };
        let hints = vec!["VALIDATION_ERROR: unknown field 'calories'".to_owned()];
        let p = act_step_prompt(&step, None, &[], &[], &hints, 1, 5);
        assert!(p.user.contains("Corrections from previous attempts"));
        assert!(p.user.contains("calories"));
    }
}
