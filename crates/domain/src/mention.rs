//! Entity mentions, constraints, and curation — the structured signals the
//! Understand node compiles out of a raw user message.

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Entity mentions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    Exact,
    Fuzzy,
    Unresolved,
}

/// One span of the user message that refers to an entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityMention {
    pub raw_text: String,
    pub entity_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub candidates: Vec<String>,
    pub confidence: Confidence,
    pub resolution: Resolution,
}

impl EntityMention {
    /// Downgrade to unresolved, keeping the raw text and type.
    pub fn unresolve(&mut self) {
        self.resolved_ref = None;
        self.resolution = Resolution::Unresolved;
        self.confidence = Confidence::Low;
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Constraints
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    Dietary,
    Equipment,
    Time,
    Budget,
    Preference,
    Household,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    pub kind: ConstraintKind,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_phrase: Option<String>,
}

/// Per-turn constraint signals extracted by Understand. Merged into the
/// session's accumulated constraints deterministically.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConstraintSnapshot {
    #[serde(default)]
    pub new_constraints: Vec<Constraint>,
    #[serde(default)]
    pub override_constraints: Vec<Constraint>,
    #[serde(default)]
    pub reset_goal: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal_update: Option<String>,
    #[serde(default)]
    pub source_phrases: Vec<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Entity curation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetainedRef {
    #[serde(rename = "ref")]
    pub reference: String,
    pub reason: String,
}

/// Which entities stay in play for this turn. Drives registry retention.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityCuration {
    #[serde(default)]
    pub clear_all: bool,
    #[serde(default)]
    pub drop_refs: Vec<String>,
    #[serde(default)]
    pub retain_refs: Vec<RetainedRef>,
}
