use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Every recognized option of the core, loadable from TOML. Unknown keys
/// are rejected so typos surface at startup rather than as silent defaults.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct AlfredConfig {
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub deadlines: DeadlineConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
    #[serde(default)]
    pub quick: QuickConfig,
}

impl AlfredConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| Error::Config(format!("parsing config: {e}")))
    }

    pub fn load(path: &std::path::Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(Error::Io)?;
        Self::from_toml_str(&raw)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Windows and caps
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LimitsConfig {
    /// Turns counted as "active" for entity tiering.
    #[serde(default = "d_2")]
    pub recent_turns_window: u64,
    /// Turns kept verbatim in the conversation tail.
    #[serde(default = "d_3")]
    pub full_detail_turns: usize,
    /// Hard bound on the Act loop per step.
    #[serde(default = "d_5")]
    pub max_tool_calls_per_step: u32,
    /// Maximum plan length in planned mode.
    #[serde(default = "d_8")]
    pub max_steps_plan: usize,
    /// Maximum plan length in quick mode.
    #[serde(default = "d_1")]
    pub max_steps_quick: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            recent_turns_window: 2,
            full_detail_turns: 3,
            max_tool_calls_per_step: 5,
            max_steps_plan: 8,
            max_steps_quick: 1,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Deadlines
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeadlineConfig {
    #[serde(default = "d_30000")]
    pub step_deadline_ms: u64,
    #[serde(default = "d_120000")]
    pub turn_deadline_ms: u64,
}

impl Default for DeadlineConfig {
    fn default() -> Self {
        Self {
            step_deadline_ms: 30_000,
            turn_deadline_ms: 120_000,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Job durability
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobsConfig {
    /// How long terminal job records are retained before pruning.
    #[serde(default = "d_24")]
    pub retention_hours: u64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self { retention_hours: 24 }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Quick mode gating
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceFloor {
    /// Only `high`-confidence classifications take the quick path directly.
    High,
    /// `medium` also qualifies, subject to Think's veto pass.
    Medium,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QuickConfig {
    #[serde(default = "d_floor_high")]
    pub confidence_floor: ConfidenceFloor,
}

impl Default for QuickConfig {
    fn default() -> Self {
        Self {
            confidence_floor: ConfidenceFloor::High,
        }
    }
}

// ── serde default helpers ──────────────────────────────────────────

fn d_1() -> usize {
    1
}
fn d_2() -> u64 {
    2
}
fn d_3() -> usize {
    3
}
fn d_5() -> u32 {
    5
}
fn d_8() -> usize {
    8
}
fn d_24() -> u64 {
    24
}
fn d_30000() -> u64 {
    30_000
}
fn d_120000() -> u64 {
    120_000
}
fn d_floor_high() -> ConfidenceFloor {
    ConfidenceFloor::High
}
