//! Session Identity Registry — ref ↔ identifier translation, lifecycle
//! tracking, and the artifact store for generated-not-saved entities.
//!
//! The registry is exclusively owned by the active turn and carried across
//! turns through serialization in the conversation record. No canonical
//! identifier ever crosses from here into a prompt; no ref ever reaches
//! the store untranslated.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use alfred_domain::error::{Error, ErrorCode, Result};
use alfred_domain::schema::{table_for_entity_type, TableSchema};
use alfred_domain::trace::TraceEvent;

use crate::refs;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Lifecycle actions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Latest lifecycle tag per ref.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefAction {
    Read,
    Created,
    Updated,
    Deleted,
    Generated,
    Linked,
}

impl RefAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
            Self::Generated => "generated",
            Self::Linked => "linked",
        }
    }
}

/// Content retained for a promoted artifact until Summarize evicts it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromotedArtifact {
    pub saved_ref: String,
    pub content: Value,
}

/// One row of the registry's observable surface, used by context builders
/// and the `active_context` event.
#[derive(Debug, Clone, Serialize)]
pub struct RefEntry {
    pub reference: String,
    pub label: String,
    pub action: RefAction,
    pub last_turn: u64,
    pub reason: Option<String>,
    pub pending: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Registry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionIdRegistry {
    ref_to_uuid: HashMap<String, String>,
    uuid_to_ref: HashMap<String, String>,
    /// Monotonic per entity type, reset per session.
    counters: HashMap<String, u32>,
    ref_labels: HashMap<String, String>,
    ref_actions: HashMap<String, RefAction>,
    ref_turn_last_ref: HashMap<String, u64>,
    ref_active_reason: HashMap<String, String>,
    /// `gen_*` ref → full generated content, while not yet persisted.
    pending_artifacts: HashMap<String, Value>,
    /// `gen_*` ref → saved sibling + retained content, until eviction.
    promoted: HashMap<String, PromotedArtifact>,
}

impl SessionIdRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Ref minting ───────────────────────────────────────────────

    fn next_ordinal(&mut self, entity_type: &str) -> u32 {
        let counter = self.counters.entry(entity_type.to_owned()).or_insert(0);
        *counter += 1;
        *counter
    }

    fn insert_ref(
        &mut self,
        reference: &str,
        uuid: Option<&str>,
        label: Option<&str>,
        action: RefAction,
        turn: u64,
    ) {
        if let Some(uuid) = uuid {
            self.ref_to_uuid.insert(reference.to_owned(), uuid.to_owned());
            self.uuid_to_ref.insert(uuid.to_owned(), reference.to_owned());
        }
        if let Some(label) = label {
            self.ref_labels.insert(reference.to_owned(), label.to_owned());
        }
        self.ref_actions.insert(reference.to_owned(), action);
        self.touch(reference, turn);
    }

    /// Assign or reuse a ref for a stored row seen by a read.
    pub fn register_read(
        &mut self,
        uuid: &str,
        entity_type: &str,
        label: Option<&str>,
        turn: u64,
    ) -> String {
        if let Some(existing) = self.uuid_to_ref.get(uuid).cloned() {
            if let Some(label) = label {
                self.ref_labels.insert(existing.clone(), label.to_owned());
            }
            self.ref_actions.insert(existing.clone(), RefAction::Read);
            self.touch(&existing, turn);
            return existing;
        }
        let reference = refs::format_ref(entity_type, self.next_ordinal(entity_type));
        self.insert_ref(&reference, Some(uuid), label, RefAction::Read, turn);
        TraceEvent::RefMinted {
            reference: reference.clone(),
            entity_type: entity_type.to_owned(),
            generated: false,
        }
        .emit();
        reference
    }

    /// Lazily register a foreign-key identifier seen on a read, with no
    /// label until something resolves it.
    pub fn register_linked(&mut self, uuid: &str, entity_type: &str, turn: u64) -> String {
        if let Some(existing) = self.uuid_to_ref.get(uuid).cloned() {
            self.touch(&existing, turn);
            return existing;
        }
        let reference = refs::format_ref(entity_type, self.next_ordinal(entity_type));
        self.insert_ref(&reference, Some(uuid), None, RefAction::Linked, turn);
        reference
    }

    /// Mint a `gen_*` ref and file its artifact.
    pub fn register_generated(
        &mut self,
        entity_type: &str,
        label: &str,
        content: Value,
        turn: u64,
    ) -> String {
        let reference = refs::format_gen_ref(entity_type, self.next_ordinal(entity_type));
        self.pending_artifacts.insert(reference.clone(), content);
        self.insert_ref(&reference, None, Some(label), RefAction::Generated, turn);
        TraceEvent::RefMinted {
            reference: reference.clone(),
            entity_type: entity_type.to_owned(),
            generated: true,
        }
        .emit();
        reference
    }

    // ── Translation: read output ──────────────────────────────────

    /// For each record: assign or reuse a ref, replace the identifier
    /// field, and resolve known FK identifiers. Unknown FK identifiers are
    /// lazily registered as `linked`.
    pub fn translate_read_output(
        &mut self,
        records: Vec<Value>,
        schema: &TableSchema,
        turn: u64,
    ) -> Vec<Value> {
        records
            .into_iter()
            .map(|mut record| {
                let Some(obj) = record.as_object_mut() else {
                    return record;
                };
                let label = obj
                    .get(schema.label_field)
                    .and_then(|v| v.as_str())
                    .map(str::to_owned);
                if let Some(id) = obj.get(schema.id_field).and_then(|v| v.as_str()) {
                    let reference =
                        self.register_read(&id.to_owned(), schema.entity_type, label.as_deref(), turn);
                    obj.insert(schema.id_field.to_owned(), Value::String(reference));
                }
                for fk in schema.fk_fields {
                    if let Some(raw) = obj.get(fk.field).and_then(|v| v.as_str()) {
                        if refs::is_canonical_id(raw) {
                            let reference = self.register_linked(&raw.to_owned(), fk.target, turn);
                            obj.insert(fk.field.to_owned(), Value::String(reference));
                        }
                    }
                }
                record
            })
            .collect()
    }

    // ── Translation: create output ────────────────────────────────

    /// Map freshly created identifiers back to refs. When `original_refs`
    /// are supplied, the write persisted prior `gen_*` artifacts: each gen
    /// ref is promoted to a `{type}_n` sibling and stays resolvable until
    /// Summarize cleans it up.
    pub fn translate_create_output(
        &mut self,
        created_ids: &[String],
        schema: &TableSchema,
        original_refs: Option<&[String]>,
        turn: u64,
    ) -> Result<Vec<String>> {
        match original_refs {
            Some(originals) => {
                if originals.len() != created_ids.len() {
                    return Err(Error::validation(format!(
                        "original_refs count {} does not match created rows {}",
                        originals.len(),
                        created_ids.len()
                    )));
                }
                originals
                    .iter()
                    .zip(created_ids)
                    .map(|(gen_ref, uuid)| self.promote(gen_ref, uuid, schema, turn))
                    .collect()
            }
            None => Ok(created_ids
                .iter()
                .map(|uuid| {
                    let reference =
                        refs::format_ref(schema.entity_type, self.next_ordinal(schema.entity_type));
                    self.insert_ref(&reference, Some(uuid.as_str()), None, RefAction::Created, turn);
                    reference
                })
                .collect()),
        }
    }

    fn promote(
        &mut self,
        gen_ref: &str,
        uuid: &str,
        schema: &TableSchema,
        turn: u64,
    ) -> Result<String> {
        let content = self
            .pending_artifacts
            .remove(gen_ref)
            .ok_or_else(|| Error::unknown_ref(gen_ref))?;

        let saved_ref =
            refs::format_ref(schema.entity_type, self.next_ordinal(schema.entity_type));
        let label = self.ref_labels.get(gen_ref).cloned();
        self.insert_ref(&saved_ref, Some(uuid), label.as_deref(), RefAction::Created, turn);

        // The gen ref now resolves to the stored row too.
        self.ref_to_uuid.insert(gen_ref.to_owned(), uuid.to_owned());
        self.ref_actions.insert(gen_ref.to_owned(), RefAction::Created);
        self.touch(gen_ref, turn);
        self.promoted.insert(
            gen_ref.to_owned(),
            PromotedArtifact {
                saved_ref: saved_ref.clone(),
                content,
            },
        );

        TraceEvent::ArtifactPromoted {
            gen_ref: gen_ref.to_owned(),
            saved_ref: saved_ref.clone(),
        }
        .emit();
        Ok(saved_ref)
    }

    // ── Translation: filters and payloads ─────────────────────────

    /// Resolve a ref to its canonical identifier, if it has one.
    pub fn resolve(&self, reference: &str) -> Option<&str> {
        self.ref_to_uuid.get(reference).map(String::as_str)
    }

    /// Substitute ref values with identifiers in-place. Non-ref values are
    /// untouched; an unknown ref is an error, never a guess.
    pub fn translate_filter_values<'a>(
        &self,
        values: impl Iterator<Item = &'a mut Value>,
    ) -> Result<()> {
        for value in values {
            self.translate_value(value)?;
        }
        Ok(())
    }

    fn translate_value(&self, value: &mut Value) -> Result<()> {
        match value {
            Value::String(s) if refs::is_ref_shaped(s) => {
                match self.resolve(s) {
                    Some(uuid) => *s = uuid.to_owned(),
                    None if self.pending_artifacts.contains_key(s.as_str()) => {
                        return Err(Error::tagged(
                            ErrorCode::UnknownRef,
                            format!("{s} is generated but not persisted; it has no stored identifier"),
                        ));
                    }
                    None => return Err(Error::unknown_ref(s)),
                }
            }
            Value::Array(items) => {
                for item in items {
                    self.translate_value(item)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Substitute ref values in the payload's known FK fields.
    pub fn translate_payload(&self, data: &mut Value, schema: &TableSchema) -> Result<()> {
        let Some(obj) = data.as_object_mut() else {
            return Err(Error::validation("payload must be a JSON object"));
        };
        for fk in schema.fk_fields {
            if let Some(value) = obj.get_mut(fk.field) {
                self.translate_value(value)?;
            }
        }
        Ok(())
    }

    // ── Unified data access ───────────────────────────────────────

    /// The only sanctioned way to ask whether a ref's data is available
    /// in-memory. Returns the artifact while it is pending or freshly
    /// promoted; `None` means the data lives in the store.
    pub fn get_entity_data(&self, reference: &str) -> Option<&Value> {
        self.pending_artifacts
            .get(reference)
            .or_else(|| self.promoted.get(reference).map(|p| &p.content))
    }

    /// In-place replacement of an existing pending artifact, preserving
    /// the ref and refreshing its label when the content's name changed.
    pub fn update_entity_data(&mut self, reference: &str, content: Value) -> bool {
        if !self.pending_artifacts.contains_key(reference) {
            return false;
        }
        if let Some(parsed) = refs::parse(reference) {
            if let Some(schema) = table_for_entity_type(parsed.entity_type) {
                if let Some(label) = content.get(schema.label_field).and_then(|v| v.as_str()) {
                    self.ref_labels.insert(reference.to_owned(), label.to_owned());
                }
            }
        }
        self.pending_artifacts.insert(reference.to_owned(), content);
        true
    }

    // ── Lifecycle ─────────────────────────────────────────────────

    pub fn mark(&mut self, reference: &str, action: RefAction) {
        self.ref_actions.insert(reference.to_owned(), action);
    }

    /// Record the turn at which the ref was last referenced. Non-decreasing.
    pub fn touch(&mut self, reference: &str, turn: u64) {
        let entry = self.ref_turn_last_ref.entry(reference.to_owned()).or_insert(turn);
        if turn > *entry {
            *entry = turn;
        }
    }

    /// Sticky note explaining why an older ref remains relevant.
    pub fn retain(&mut self, reference: &str, reason: &str) {
        self.ref_active_reason
            .insert(reference.to_owned(), reason.to_owned());
    }

    /// Evict a ref's in-memory content and retention note. The ref itself
    /// stays resolvable for the rest of the session.
    pub fn drop_ref(&mut self, reference: &str) {
        self.pending_artifacts.remove(reference);
        self.promoted.remove(reference);
        self.ref_active_reason.remove(reference);
    }

    /// Clear every retention note (Understand's `clear_all` curation).
    pub fn clear_retained(&mut self) {
        self.ref_active_reason.clear();
    }

    /// Evict promoted artifacts whose `gen_*` ref was not referenced this
    /// turn. Called by Summarize.
    pub fn evict_promoted(&mut self, current_turn: u64) -> Vec<String> {
        let stale: Vec<String> = self
            .promoted
            .keys()
            .filter(|r| {
                self.ref_turn_last_ref
                    .get(*r)
                    .map(|t| *t < current_turn)
                    .unwrap_or(true)
            })
            .cloned()
            .collect();
        for reference in &stale {
            self.promoted.remove(reference);
        }
        stale
    }

    // ── Queries ───────────────────────────────────────────────────

    pub fn is_known_ref(&self, s: &str) -> bool {
        self.ref_to_uuid.contains_key(s)
            || self.pending_artifacts.contains_key(s)
            || self.promoted.contains_key(s)
    }

    /// Whether the ref holds a pending (generated, unpromoted) artifact.
    pub fn is_pending(&self, reference: &str) -> bool {
        self.pending_artifacts.contains_key(reference)
            && self.ref_actions.get(reference) == Some(&RefAction::Generated)
    }

    pub fn label(&self, reference: &str) -> Option<&str> {
        self.ref_labels.get(reference).map(String::as_str)
    }

    pub fn set_label(&mut self, reference: &str, label: &str) {
        self.ref_labels.insert(reference.to_owned(), label.to_owned());
    }

    pub fn action(&self, reference: &str) -> Option<RefAction> {
        self.ref_actions.get(reference).copied()
    }

    pub fn last_turn(&self, reference: &str) -> Option<u64> {
        self.ref_turn_last_ref.get(reference).copied()
    }

    /// The saved sibling of a promoted `gen_*` ref.
    pub fn promoted_sibling(&self, gen_ref: &str) -> Option<&str> {
        self.promoted.get(gen_ref).map(|p| p.saved_ref.as_str())
    }

    pub fn pending_refs(&self) -> Vec<&str> {
        let mut refs: Vec<&str> = self.pending_artifacts.keys().map(String::as_str).collect();
        refs.sort();
        refs
    }

    pub fn entry(&self, reference: &str) -> Option<RefEntry> {
        let action = self.action(reference)?;
        Some(RefEntry {
            reference: reference.to_owned(),
            label: self
                .label(reference)
                .unwrap_or("(unresolved)")
                .to_owned(),
            action,
            last_turn: self.last_turn(reference).unwrap_or(0),
            reason: self.ref_active_reason.get(reference).cloned(),
            pending: self.is_pending(reference),
        })
    }

    /// Every known ref's entry, sorted for stable rendering.
    pub fn entries(&self) -> Vec<RefEntry> {
        let mut refs: Vec<&String> = self.ref_actions.keys().collect();
        refs.sort();
        refs.iter().filter_map(|r| self.entry(r)).collect()
    }

    pub fn len(&self) -> usize {
        self.ref_actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ref_actions.is_empty()
    }

    pub fn pending_len(&self) -> usize {
        self.pending_artifacts.len()
    }

    // ── Durable state ─────────────────────────────────────────────

    pub fn snapshot(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub fn from_snapshot(snapshot: Value) -> Result<Self> {
        serde_json::from_value(snapshot).map_err(Error::Json)
    }
}
