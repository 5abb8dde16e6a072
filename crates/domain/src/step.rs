//! Plan steps and their execution records.
//!
//! A plan is an ordered list of typed steps grouped into dependency tiers;
//! the executor records one [`StepResult`] per step and, for multi-item
//! writes, a [`BatchManifest`] enumerating every item the step must settle.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Step
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepType {
    Read,
    Write,
    Analyze,
    Generate,
}

impl StepType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Analyze => "analyze",
            Self::Generate => "generate",
        }
    }
}

/// One unit of the plan produced by the Think node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub step_id: String,
    pub step_type: StepType,
    /// The domain area the step operates in (usually a table name).
    pub subdomain: String,
    /// Dependency tier. Steps in a higher group may consume the outputs of
    /// lower groups; same-group steps must be independent.
    pub group: u32,
    pub description: String,
    /// Whether the step settles multiple items through a manifest.
    #[serde(default)]
    pub batch: bool,
    /// Refs and step ids the step consumes.
    #[serde(default)]
    pub inputs: Vec<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Batch manifest
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchItemStatus {
    Pending,
    InProgress,
    Complete,
    Failed,
}

impl BatchItemStatus {
    /// Settled items no longer block step completion.
    pub fn is_settled(self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchItem {
    #[serde(rename = "ref")]
    pub reference: String,
    pub label: String,
    pub status: BatchItemStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Explicit enumeration of the items a write step must settle.
///
/// Invariant: a step is not complete while any item is pending or
/// in-progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchManifest {
    pub total: usize,
    pub items: Vec<BatchItem>,
}

impl BatchManifest {
    pub fn new(items: Vec<(String, String)>) -> Self {
        let items: Vec<BatchItem> = items
            .into_iter()
            .map(|(reference, label)| BatchItem {
                reference,
                label,
                status: BatchItemStatus::Pending,
                result_ref: None,
                error: None,
            })
            .collect();
        Self {
            total: items.len(),
            items,
        }
    }

    pub fn is_settled(&self) -> bool {
        self.items.iter().all(|i| i.status.is_settled())
    }

    pub fn unsettled_refs(&self) -> Vec<&str> {
        self.items
            .iter()
            .filter(|i| !i.status.is_settled())
            .map(|i| i.reference.as_str())
            .collect()
    }

    pub fn item_mut(&mut self, reference: &str) -> Option<&mut BatchItem> {
        self.items.iter_mut().find(|i| i.reference == reference)
    }

    pub fn mark_complete(&mut self, reference: &str, result_ref: Option<String>) -> bool {
        if let Some(item) = self.item_mut(reference) {
            item.status = BatchItemStatus::Complete;
            item.result_ref = result_ref;
            item.error = None;
            return true;
        }
        false
    }

    pub fn mark_failed(&mut self, reference: &str, error: impl Into<String>) -> bool {
        if let Some(item) = self.item_mut(reference) {
            item.status = BatchItemStatus::Failed;
            item.error = Some(error.into());
            return true;
        }
        false
    }

    /// Force-settle every open item (used when the tool-call cap or a
    /// deadline ends the step early).
    pub fn fail_unsettled(&mut self, reason: &str) -> usize {
        let mut failed = 0;
        for item in &mut self.items {
            if !item.status.is_settled() {
                item.status = BatchItemStatus::Failed;
                item.error = Some(reason.to_owned());
                failed += 1;
            }
        }
        failed
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Step result
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The structured output of one executed step, indexed by step id and
/// available to later steps and to Reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub step_id: String,
    pub step_type: StepType,
    /// Rows returned by read steps (already ref-translated).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub records: Option<Vec<Value>>,
    /// Full structured content produced by generate steps.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<Vec<Value>>,
    pub summary: String,
    /// Refs touched by the step.
    #[serde(default)]
    pub ids: Vec<String>,
}

impl StepResult {
    pub fn new(step_id: impl Into<String>, step_type: StepType) -> Self {
        Self {
            step_id: step_id.into(),
            step_type,
            records: None,
            artifacts: None,
            summary: String::new(),
            ids: Vec::new(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Turn execution summary
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Structured audit ledger of one turn. The two most recent summaries are
/// shown to Reply and to the next turn's Think.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnExecutionSummary {
    pub turn_id: u64,
    pub steps_completed: usize,
    pub steps_total: usize,
    pub tools_called: usize,
    #[serde(default)]
    pub entities_created: Vec<String>,
    #[serde(default)]
    pub entities_updated: Vec<String>,
    #[serde(default)]
    pub entities_deleted: Vec<String>,
    #[serde(default)]
    pub artifacts_generated: Vec<String>,
    #[serde(default)]
    pub artifacts_saved: Vec<String>,
    #[serde(default)]
    pub errors: Vec<String>,
}
