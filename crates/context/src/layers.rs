//! Conversation and reasoning layers.

use alfred_domain::step::TurnExecutionSummary;
use alfred_registry::conversation::ConversationRecord;

/// The last `recent_turns` exchanges in full plus the compressed tail.
pub fn conversation_layer(record: &ConversationRecord, recent_turns: usize) -> String {
    let mut out = String::from("## Conversation\n");
    if !record.history_summary.is_empty() {
        out.push_str(&format!("Earlier: {}\n", record.history_summary));
    }
    let turns = record.recent_turns(recent_turns);
    if turns.is_empty() && record.history_summary.is_empty() {
        out.push_str("(first exchange)\n");
    }
    for turn in turns {
        out.push_str(&format!("User: {}\n", turn.user_message));
        out.push_str(&format!("Alfred: {}\n", turn.assistant_response));
    }
    out.trim_end().to_owned()
}

fn render_summary(summary: &TurnExecutionSummary) -> String {
    let mut parts = vec![format!(
        "turn {}: {}/{} steps, {} tool calls",
        summary.turn_id, summary.steps_completed, summary.steps_total, summary.tools_called
    )];
    if !summary.entities_created.is_empty() {
        parts.push(format!("created {}", summary.entities_created.join(", ")));
    }
    if !summary.entities_updated.is_empty() {
        parts.push(format!("updated {}", summary.entities_updated.join(", ")));
    }
    if !summary.entities_deleted.is_empty() {
        parts.push(format!("deleted {}", summary.entities_deleted.join(", ")));
    }
    if !summary.artifacts_generated.is_empty() {
        parts.push(format!(
            "generated {}",
            summary.artifacts_generated.join(", ")
        ));
    }
    if !summary.artifacts_saved.is_empty() {
        parts.push(format!("saved {}", summary.artifacts_saved.join(", ")));
    }
    if !summary.errors.is_empty() {
        parts.push(format!("errors: {}", summary.errors.join("; ")));
    }
    parts.join("; ")
}

/// The last one or two execution summaries.
pub fn reasoning_layer(record: &ConversationRecord) -> String {
    let summaries = record.recent_execution_summaries(2);
    if summaries.is_empty() {
        return "## Recent execution\n(none)".into();
    }
    let mut out = String::from("## Recent execution\n");
    for s in summaries {
        out.push_str(&render_summary(s));
        out.push('\n');
    }
    out.trim_end().to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use alfred_registry::conversation::ConversationTurn;

    fn record_with_turns() -> ConversationRecord {
        let mut record = ConversationRecord::new("u1");
        for i in 1..=4u64 {
            record.append_turn(
                ConversationTurn {
                    turn_id: i,
                    user_message: format!("question {i}"),
                    assistant_response: format!("answer {i}"),
                    assistant_summary: format!("answered {i}"),
                    execution_summary: TurnExecutionSummary {
                        turn_id: i,
                        steps_completed: 1,
                        steps_total: 1,
                        tools_called: 2,
                        entities_created: if i == 3 {
                            vec!["recipe_1".into()]
                        } else {
                            vec![]
                        },
                        ..Default::default()
                    },
                    step_results: Vec::new(),
                },
                3,
            );
        }
        record
    }

    #[test]
    fn conversation_layer_windows_the_tail() {
        let record = record_with_turns();
        let text = conversation_layer(&record, 2);
        assert!(text.contains("question 3"));
        assert!(text.contains("question 4"));
        assert!(!text.contains("question 2"));
        assert!(text.contains("Earlier:"));
    }

    #[test]
    fn first_exchange_is_labelled() {
        let record = ConversationRecord::new("u1");
        let text = conversation_layer(&record, 2);
        assert!(text.contains("(first exchange)"));
    }

    #[test]
    fn reasoning_layer_shows_at_most_two_summaries() {
        let record = record_with_turns();
        let text = reasoning_layer(&record);
        assert!(text.contains("turn 3"));
        assert!(text.contains("turn 4"));
        assert!(!text.contains("turn 2"));
        assert!(text.contains("created recipe_1"));
    }
}
