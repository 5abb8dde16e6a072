//! Understand — compile the raw message into structured signals and curate
//! the working set.

use serde::{Deserialize, Serialize};

use alfred_context::views;
use alfred_domain::config::{AlfredConfig, ConfidenceFloor};
use alfred_domain::interpreter::Interpreter;
use alfred_domain::mention::{Confidence, ConstraintSnapshot, EntityCuration, EntityMention};

use crate::state::AlfredState;

use super::{call_structured, object_shape};

const PROCESSED_MESSAGE_MAX: usize = 50;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnderstandOutput {
    pub processed_message: String,
    #[serde(default)]
    pub entity_mentions: Vec<EntityMention>,
    #[serde(default)]
    pub needs_disambiguation: bool,
    #[serde(default)]
    pub disambiguation_options: Vec<String>,
    #[serde(default)]
    pub constraint_snapshot: ConstraintSnapshot,
    #[serde(default)]
    pub entity_curation: EntityCuration,
    #[serde(default)]
    pub quick_mode: bool,
    #[serde(default = "confidence_low")]
    pub quick_mode_confidence: Confidence,
}

fn confidence_low() -> Confidence {
    Confidence::Low
}

impl Default for UnderstandOutput {
    fn default() -> Self {
        Self {
            processed_message: String::new(),
            entity_mentions: Vec::new(),
            needs_disambiguation: false,
            disambiguation_options: Vec::new(),
            constraint_snapshot: ConstraintSnapshot::default(),
            entity_curation: EntityCuration::default(),
            quick_mode: false,
            quick_mode_confidence: Confidence::Low,
        }
    }
}

/// How the turn routes after Understand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuickRoute {
    /// Planned path.
    No,
    /// Straight to QuickAct.
    Direct,
    /// Quick, pending Think's veto pass.
    NeedsValidation,
}

/// The floor names the confidence that routes directly; `medium` below
/// the floor still qualifies but only through Think's veto pass.
pub fn quick_route(output: &UnderstandOutput, config: &AlfredConfig) -> QuickRoute {
    if !output.quick_mode || output.needs_disambiguation {
        return QuickRoute::No;
    }
    match (output.quick_mode_confidence, config.quick.confidence_floor) {
        (Confidence::High, _) => QuickRoute::Direct,
        (Confidence::Medium, ConfidenceFloor::Medium) => QuickRoute::Direct,
        (Confidence::Medium, ConfidenceFloor::High) => QuickRoute::NeedsValidation,
        (Confidence::Low, _) => QuickRoute::No,
    }
}

/// Run the Understand node. Malformed interpreter output falls back to
/// planned mode with empty curation; the turn continues.
pub async fn run(
    interpreter: &dyn Interpreter,
    config: &AlfredConfig,
    state: &mut AlfredState,
) -> UnderstandOutput {
    let ui_note = ui_changes_note(state);
    let prompt = views::understand_prompt(
        &state.registry,
        &state.record,
        state.turn_id,
        config.limits.recent_turns_window,
        &state.user_message,
        &ui_note,
    );

    let mut output: UnderstandOutput = match call_structured(
        interpreter,
        "understand",
        prompt,
        object_shape("understand_output", &["processed_message"]),
        config.deadlines.step_deadline_ms,
    )
    .await
    {
        Ok(output) => output,
        Err(e) => {
            state.note_error(format!("understand fell back to planned mode: {e}"));
            UnderstandOutput {
                processed_message: truncate(&state.user_message, PROCESSED_MESSAGE_MAX),
                ..Default::default()
            }
        }
    };

    output.processed_message = truncate(&output.processed_message, PROCESSED_MESSAGE_MAX);

    // Interpreter-proposed refs are only trusted when the registry knows
    // them; anything else downgrades to unresolved.
    for mention in &mut output.entity_mentions {
        if let Some(reference) = &mention.resolved_ref {
            if !state.registry.is_known_ref(reference) {
                mention.unresolve();
            }
        }
        mention
            .candidates
            .retain(|c| state.registry.is_known_ref(c));
    }

    apply_curation(state, &output.entity_curation);
    output
}

fn apply_curation(state: &mut AlfredState, curation: &EntityCuration) {
    if curation.clear_all {
        state.registry.clear_retained();
    }
    for reference in &curation.drop_refs {
        if state.registry.is_known_ref(reference) {
            state.registry.drop_ref(reference);
        }
    }
    for retained in &curation.retain_refs {
        if state.registry.is_known_ref(&retained.reference) {
            state.registry.retain(&retained.reference, &retained.reason);
            state.registry.touch(&retained.reference, state.turn_id);
        }
    }
}

/// Frontend mutations are applied to the registry before Understand runs;
/// the note tells the interpreter what already happened.
fn ui_changes_note(state: &AlfredState) -> String {
    if state.ui_changes.is_empty() {
        return String::new();
    }
    let lines: Vec<String> = state
        .ui_changes
        .iter()
        .map(|c| {
            let label = c.label.as_deref().unwrap_or("(unnamed)");
            format!("- {:?} {} \"{}\"", c.kind, c.table, label).to_lowercase()
        })
        .collect();
    format!(
        "The user already made these changes in the app:\n{}\n",
        lines.join("\n")
    )
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_owned();
    }
    let mut end = max;
    while !s.is_char_boundary(end) && end > 0 {
        end -= 1;
    }
    s[..end].to_owned()
}
