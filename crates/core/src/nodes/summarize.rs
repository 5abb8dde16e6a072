//! Summarize — the audit writer.
//!
//! Fully deterministic: emits the turn's execution ledger, compresses the
//! conversation tail, evicts promoted artifacts nothing referenced this
//! turn, and persists the registry and conversation. Runs even when
//! earlier nodes failed, so every turn leaves a record.

use alfred_domain::config::AlfredConfig;
use alfred_domain::step::TurnExecutionSummary;
use alfred_registry::conversation::{ConversationStore, ConversationTurn};

use crate::state::AlfredState;

const ASSISTANT_SUMMARY_MAX: usize = 140;

/// Write the audit ledger and persist everything. Returns the summary.
pub fn run(
    conversations: &ConversationStore,
    config: &AlfredConfig,
    state: &mut AlfredState,
) -> TurnExecutionSummary {
    let summary = build_summary(state);

    let response = state
        .reply_output
        .as_ref()
        .map(|r| r.response.clone())
        .unwrap_or_default();

    let turn = ConversationTurn {
        turn_id: state.turn_id,
        user_message: state.user_message.clone(),
        assistant_response: response.clone(),
        assistant_summary: compress_response(&response),
        execution_summary: summary.clone(),
        step_results: state.step_results.values().cloned().collect(),
    };

    let evicted = state.registry.evict_promoted(state.turn_id);
    if !evicted.is_empty() {
        tracing::debug!(evicted = evicted.len(), "evicted promoted artifacts");
    }

    state.record.registry = state.registry.clone();
    state
        .record
        .append_turn(turn, config.limits.full_detail_turns);
    if state.record.title.is_none() {
        state.record.title = Some(compress_response(&state.user_message));
    }

    conversations.upsert(state.record.clone());
    if let Err(e) = conversations.flush() {
        tracing::warn!(error = %e, "failed to flush conversation store");
    }

    state.summarize_output = Some(summary.clone());
    summary
}

fn build_summary(state: &AlfredState) -> TurnExecutionSummary {
    let mut summary = state.ledger.clone();
    summary.turn_id = state.turn_id;
    summary.steps_total = summary.steps_total.max(state.steps.len());
    summary.entities_created.sort();
    summary.entities_created.dedup();
    summary.entities_updated.sort();
    summary.entities_updated.dedup();
    summary.entities_deleted.sort();
    summary.entities_deleted.dedup();
    summary
}

/// First sentence, bounded. The ref scrub happens at compression time in
/// the conversation record; this only keeps the sentence short.
fn compress_response(response: &str) -> String {
    let first_sentence = response
        .split_inclusive(['.', '!', '?'])
        .next()
        .unwrap_or(response)
        .trim();
    let mut end = first_sentence.len().min(ASSISTANT_SUMMARY_MAX);
    while !first_sentence.is_char_boundary(end) && end > 0 {
        end -= 1;
    }
    first_sentence[..end].to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::reply::ReplyOutput;
    use crate::state::{Mode, TurnRequest};
    use alfred_registry::conversation::ConversationRecord;
    use serde_json::json;

    fn state() -> AlfredState {
        let request = TurnRequest {
            user_id: "u1".into(),
            user_message: "create 3 cod recipes and save them".into(),
            mode: Mode::Plan,
            ui_changes: vec![],
        };
        AlfredState::new(&request, ConversationRecord::new("u1"))
    }

    #[test]
    fn writes_the_ledger_and_persists_the_registry() {
        let dir = tempfile::tempdir().unwrap();
        let conversations = ConversationStore::new(dir.path()).unwrap();

        let mut s = state();
        s.registry
            .register_generated("recipe", "Cod cakes", json!({"name": "Cod cakes"}), 1);
        s.ledger.steps_total = 2;
        s.ledger.steps_completed = 2;
        s.ledger.tools_called = 3;
        s.ledger.artifacts_generated.push("gen_recipe_1".into());
        s.reply_output = Some(ReplyOutput {
            response: "Drafted Cod cakes. Want me to save it?".into(),
            next_step: None,
        });

        let summary = run(&conversations, &AlfredConfig::default(), &mut s);
        assert_eq!(summary.steps_completed, 2);
        assert_eq!(summary.tools_called, 3);

        let record = conversations.get("u1").unwrap();
        assert_eq!(record.turns.len(), 1);
        assert_eq!(record.turns[0].assistant_summary, "Drafted Cod cakes.");
        assert_eq!(record.next_turn_id, 2);
        assert!(record.registry.is_pending("gen_recipe_1"));
        assert!(record.title.is_some());
    }

    #[test]
    fn evicts_promoted_artifacts_from_earlier_turns() {
        let dir = tempfile::tempdir().unwrap();
        let conversations = ConversationStore::new(dir.path()).unwrap();
        let recipes = alfred_domain::schema::table("recipes").unwrap();

        let mut s = state();
        // Promoted on a previous turn, untouched since.
        let gen = s
            .registry
            .register_generated("recipe", "Old", json!({"name": "Old"}), 0);
        let uuid = uuid::Uuid::new_v4().to_string();
        s.registry
            .translate_create_output(&[uuid], recipes, Some(&[gen.clone()]), 0)
            .unwrap();
        assert!(s.registry.get_entity_data(&gen).is_some());

        run(&conversations, &AlfredConfig::default(), &mut s);
        assert!(s.registry.get_entity_data(&gen).is_none());
        // Still resolvable after eviction.
        assert!(s.registry.resolve(&gen).is_some());
    }

    #[test]
    fn summary_dedupes_entity_lists() {
        let dir = tempfile::tempdir().unwrap();
        let conversations = ConversationStore::new(dir.path()).unwrap();

        let mut s = state();
        s.ledger.entities_updated =
            vec!["recipe_1".into(), "recipe_1".into(), "recipe_2".into()];
        let summary = run(&conversations, &AlfredConfig::default(), &mut s);
        assert_eq!(summary.entities_updated, vec!["recipe_1", "recipe_2"]);
    }
}
