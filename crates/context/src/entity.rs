//! The entity layer — three sections built from the registry.
//!
//! One row per ref across all sections, most-recent placement wins:
//! a pending artifact always renders under Generated, an active ref under
//! Recent Context, and a retained ref under Long Term Memory only when it
//! appears nowhere else.

use std::collections::HashSet;

use alfred_domain::event::ActiveRef;
use alfred_registry::registry::{RefEntry, SessionIdRegistry};

pub struct EntitySections {
    pub generated: Vec<RefEntry>,
    pub recent: Vec<RefEntry>,
    pub retained: Vec<RefEntry>,
}

impl EntitySections {
    pub fn is_empty(&self) -> bool {
        self.generated.is_empty() && self.recent.is_empty() && self.retained.is_empty()
    }

    pub fn all(&self) -> impl Iterator<Item = &RefEntry> {
        self.generated
            .iter()
            .chain(self.recent.iter())
            .chain(self.retained.iter())
    }
}

/// Partition the registry into the three sections, deduplicated.
pub fn sections(
    registry: &SessionIdRegistry,
    current_turn: u64,
    recent_window: u64,
) -> EntitySections {
    let mut seen: HashSet<String> = HashSet::new();
    let mut generated = Vec::new();
    let mut recent = Vec::new();
    let mut retained = Vec::new();

    let cutoff = current_turn.saturating_sub(recent_window);
    for entry in registry.entries() {
        if entry.pending {
            seen.insert(entry.reference.clone());
            generated.push(entry);
        }
    }
    for entry in registry.entries() {
        if !seen.contains(&entry.reference) && entry.last_turn >= cutoff {
            seen.insert(entry.reference.clone());
            recent.push(entry);
        }
    }
    for entry in registry.entries() {
        if !seen.contains(&entry.reference) && entry.reason.is_some() {
            seen.insert(entry.reference.clone());
            retained.push(entry);
        }
    }

    EntitySections {
        generated,
        recent,
        retained,
    }
}

fn render_rows(entries: &[RefEntry]) -> String {
    entries
        .iter()
        .map(|e| format!("{} | {} | {}", e.reference, e.label, e.action.as_str()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Full entity context, all three sections with headers.
pub fn render(registry: &SessionIdRegistry, current_turn: u64, recent_window: u64) -> String {
    let s = sections(registry, current_turn, recent_window);
    if s.is_empty() {
        return "Working set: (empty)".into();
    }

    let mut out = String::new();
    if !s.generated.is_empty() {
        out.push_str("## Generated (NOT YET SAVED)\n");
        out.push_str(&render_rows(&s.generated));
        out.push('\n');
    }
    if !s.recent.is_empty() {
        out.push_str(&format!("## Recent Context (last {recent_window} turns)\n"));
        out.push_str(&render_rows(&s.recent));
        out.push('\n');
    }
    if !s.retained.is_empty() {
        out.push_str("## Long Term Memory (retained)\n");
        for e in &s.retained {
            out.push_str(&format!(
                "{} | {} | {} ({})\n",
                e.reference,
                e.label,
                e.action.as_str(),
                e.reason.as_deref().unwrap_or("")
            ));
        }
    }
    out.trim_end().to_owned()
}

/// Refs and labels only — the Think view. Generated entries carry a
/// directive instead of payloads.
pub fn render_refs_only(
    registry: &SessionIdRegistry,
    current_turn: u64,
    recent_window: u64,
) -> (String, String) {
    let s = sections(registry, current_turn, recent_window);
    let mut refs = String::from("## Working set (refs and labels)\n");
    let mut any = false;
    for e in s.recent.iter().chain(s.retained.iter()) {
        refs.push_str(&format!("{} | {}\n", e.reference, e.label));
        any = true;
    }
    if !any {
        refs.push_str("(empty)\n");
    }

    let generated = if s.generated.is_empty() {
        String::from("## Generated Content\n(none)")
    } else {
        let mut g = String::from(
            "## Generated Content (full data available during execution)\n",
        );
        for e in &s.generated {
            g.push_str(&format!("{} | {}\n", e.reference, e.label));
        }
        g.trim_end().to_owned()
    };
    (refs.trim_end().to_owned(), generated)
}

/// The working set rows for the `active_context` event.
pub fn active_refs(
    registry: &SessionIdRegistry,
    current_turn: u64,
    recent_window: u64,
) -> Vec<ActiveRef> {
    sections(registry, current_turn, recent_window)
        .all()
        .map(|e| ActiveRef {
            reference: e.reference.clone(),
            label: e.label.clone(),
            action: e.action.as_str().to_owned(),
        })
        .collect()
}
