//! Accumulated session constraints and the active goal.
//!
//! The merge is deterministic: overrides replace constraints of the same
//! kind, new constraints accumulate, and `reset_goal` clears the goal
//! before any update applies. No interpreter is involved.

use serde::{Deserialize, Serialize};

use alfred_domain::mention::{Constraint, ConstraintSnapshot};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionConstraints {
    #[serde(default)]
    pub permanent: Vec<Constraint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_goal: Option<String>,
}

impl SessionConstraints {
    pub fn merge(&mut self, snapshot: &ConstraintSnapshot) {
        if snapshot.reset_goal {
            self.active_goal = None;
        }
        if let Some(goal) = &snapshot.goal_update {
            self.active_goal = Some(goal.clone());
        }

        for override_c in &snapshot.override_constraints {
            self.permanent.retain(|c| c.kind != override_c.kind);
            self.permanent.push(override_c.clone());
        }

        for new_c in &snapshot.new_constraints {
            if !self.permanent.contains(new_c) {
                self.permanent.push(new_c.clone());
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.permanent.is_empty() && self.active_goal.is_none()
    }
}
