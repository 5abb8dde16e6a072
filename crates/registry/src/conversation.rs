//! Per-user conversation state.
//!
//! A conversation record keeps the last few turns verbatim, a ref-free
//! narrative for everything older, the accumulated constraints, and the
//! registry snapshot. Records persist to `conversations.json` under the
//! configured state path; all writes go through [`ConversationStore`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use alfred_domain::error::{Error, Result};
use alfred_domain::step::{StepResult, TurnExecutionSummary};
use alfred_domain::trace::TraceEvent;

use crate::constraints::SessionConstraints;
use crate::refs;
use crate::registry::SessionIdRegistry;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Conversation turn
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub turn_id: u64,
    pub user_message: String,
    pub assistant_response: String,
    /// One-sentence compression used when the turn falls out of the
    /// full-detail window.
    pub assistant_summary: String,
    pub execution_summary: TurnExecutionSummary,
    /// Full step results, kept only while the turn stays in the tail so
    /// the next turns' Act prompts can consume them.
    #[serde(default)]
    pub step_results: Vec<StepResult>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Conversation record
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub last_active_at: DateTime<Utc>,
    /// Monotonic within the session; the next turn takes this id.
    pub next_turn_id: u64,
    /// Full-detail tail, oldest first.
    pub turns: Vec<ConversationTurn>,
    /// Narrative for turns older than the tail. Contains no refs, no IDs.
    #[serde(default)]
    pub history_summary: String,
    #[serde(default)]
    pub constraints: SessionConstraints,
    /// Registry snapshot, sufficient to reconstruct ref state.
    #[serde(default)]
    pub registry: SessionIdRegistry,
}

impl ConversationRecord {
    pub fn new(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_owned(),
            title: None,
            last_active_at: Utc::now(),
            next_turn_id: 1,
            turns: Vec::new(),
            history_summary: String::new(),
            constraints: SessionConstraints::default(),
            registry: SessionIdRegistry::new(),
        }
    }

    /// Append a finished turn and compress the tail down to
    /// `full_detail_turns`. Returns how many turns were folded into the
    /// narrative.
    pub fn append_turn(&mut self, turn: ConversationTurn, full_detail_turns: usize) -> usize {
        self.next_turn_id = turn.turn_id + 1;
        self.last_active_at = Utc::now();
        self.turns.push(turn);

        let mut compacted = 0;
        while self.turns.len() > full_detail_turns {
            let old = self.turns.remove(0);
            let line = compress_turn(&old);
            if !self.history_summary.is_empty() {
                self.history_summary.push(' ');
            }
            self.history_summary.push_str(&line);
            compacted += 1;
        }
        if compacted > 0 {
            TraceEvent::ConversationCompacted {
                user_id: self.user_id.clone(),
                turns_compacted: compacted,
            }
            .emit();
        }
        compacted
    }

    pub fn recent_turns(&self, n: usize) -> &[ConversationTurn] {
        let start = self.turns.len().saturating_sub(n);
        &self.turns[start..]
    }

    /// The most recent execution summaries, newest last, at most `n`.
    pub fn recent_execution_summaries(&self, n: usize) -> Vec<&TurnExecutionSummary> {
        self.recent_turns(n)
            .iter()
            .map(|t| &t.execution_summary)
            .collect()
    }
}

/// Fold one turn into a single ref-free narrative sentence.
fn compress_turn(turn: &ConversationTurn) -> String {
    let user = refs::scrub_refs(turn.user_message.trim());
    let assistant = refs::scrub_refs(turn.assistant_summary.trim());
    format!("They asked \"{user}\"; Alfred {assistant}")
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Conversation store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// File-backed store of conversation records, one per user.
pub struct ConversationStore {
    path: PathBuf,
    records: RwLock<HashMap<String, ConversationRecord>>,
}

impl ConversationStore {
    /// Load or create the store at `state_path/conversations.json`.
    pub fn new(state_path: &Path) -> Result<Self> {
        std::fs::create_dir_all(state_path).map_err(Error::Io)?;
        let path = state_path.join("conversations.json");
        let records = if path.exists() {
            let raw = std::fs::read_to_string(&path).map_err(Error::Io)?;
            serde_json::from_str(&raw).unwrap_or_default()
        } else {
            HashMap::new()
        };

        tracing::info!(
            conversations = records.len(),
            path = %path.display(),
            "conversation store loaded"
        );

        Ok(Self {
            path,
            records: RwLock::new(records),
        })
    }

    pub fn get(&self, user_id: &str) -> Option<ConversationRecord> {
        self.records.read().get(user_id).cloned()
    }

    pub fn load_or_create(&self, user_id: &str) -> ConversationRecord {
        if let Some(record) = self.get(user_id) {
            return record;
        }
        let record = ConversationRecord::new(user_id);
        self.records
            .write()
            .insert(user_id.to_owned(), record.clone());
        record
    }

    /// The single owner function for conversation mutations.
    pub fn upsert(&self, record: ConversationRecord) {
        TraceEvent::RegistryPersisted {
            user_id: record.user_id.clone(),
            refs: record.registry.len(),
            pending_artifacts: record.registry.pending_len(),
        }
        .emit();
        self.records
            .write()
            .insert(record.user_id.clone(), record);
    }

    /// Persist the current records to disk (atomic rewrite).
    pub fn flush(&self) -> Result<()> {
        let records = self.records.read();
        let json = serde_json::to_string_pretty(&*records)
            .map_err(|e| Error::Other(format!("serializing conversations: {e}")))?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(Error::Io)?;
        std::fs::rename(&tmp, &self.path).map_err(Error::Io)?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}
