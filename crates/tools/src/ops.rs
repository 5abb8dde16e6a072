//! The four CRUD operations exposed to the Act node.
//!
//! Every call passes through the registry twice: inbound (refs → canonical
//! identifiers in filters and payloads) and outbound (identifiers → refs in
//! rows and created ids). Results are structured, never thrown; the Act
//! node decides what a failure means for its step.

use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use serde_json::{json, Value};

use alfred_domain::error::{Error, ErrorCode, Result};
use alfred_domain::schema::{self, SmartNameRule, TableSchema};
use alfred_domain::step::BatchManifest;
use alfred_domain::trace::TraceEvent;
use alfred_registry::refs;
use alfred_registry::registry::{RefAction, SessionIdRegistry};

use crate::filter::{self, Filter, FilterOp};
use crate::store::EntityStore;

/// Retries for transient store failures, beyond the initial attempt.
const MAX_STORE_RETRIES: u32 = 2;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Outcome
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Structured result of one tool operation.
#[derive(Debug, Clone, Serialize)]
pub struct ToolOutcome {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refs: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// The read was satisfied from the registry without touching the store.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub rerouted: bool,
}

impl ToolOutcome {
    pub fn ok_rows(rows: Vec<Value>) -> Self {
        Self {
            ok: true,
            rows: Some(rows),
            refs: None,
            code: None,
            message: None,
            rerouted: false,
        }
    }

    pub fn ok_refs(refs: Vec<String>) -> Self {
        Self {
            ok: true,
            rows: None,
            refs: Some(refs),
            code: None,
            message: None,
            rerouted: false,
        }
    }

    pub fn fail(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            rows: None,
            refs: None,
            code: Some(code),
            message: Some(message.into()),
            rerouted: false,
        }
    }

    pub fn from_error(err: &Error) -> Self {
        Self::fail(
            err.code().unwrap_or(ErrorCode::ValidationError),
            err.to_string(),
        )
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tool gate
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One turn's handle on the store, bound to that turn's registry.
pub struct ToolGate<'a> {
    registry: &'a mut SessionIdRegistry,
    store: &'a dyn EntityStore,
    turn: u64,
}

impl<'a> ToolGate<'a> {
    pub fn new(registry: &'a mut SessionIdRegistry, store: &'a dyn EntityStore, turn: u64) -> Self {
        Self {
            registry,
            store,
            turn,
        }
    }

    pub fn registry(&mut self) -> &mut SessionIdRegistry {
        self.registry
    }

    /// Read-only view of a ref's in-memory content.
    pub fn peek_entity_data(&self, reference: &str) -> Option<Value> {
        self.registry.get_entity_data(reference).cloned()
    }

    // ── db_read ───────────────────────────────────────────────────

    pub async fn db_read(&mut self, table: &str, mut filters: Vec<Filter>) -> ToolOutcome {
        let Some(schema) = schema::table(table) else {
            return ToolOutcome::fail(ErrorCode::ValidationError, format!("unknown table: {table}"));
        };
        if let Err(e) = filter::validate(&filters, schema) {
            return ToolOutcome::from_error(&e);
        }

        // A read that refers exclusively to refs with in-memory data is
        // served from the registry without touching the store.
        if let Some(rows) = self.try_reroute(&filters) {
            TraceEvent::ToolDispatched {
                op: "db_read".into(),
                table: table.into(),
                rerouted: true,
                ok: true,
            }
            .emit();
            let mut outcome = ToolOutcome::ok_rows(rows);
            outcome.rerouted = true;
            return outcome;
        }

        if let Err(e) = self.apply_smart_names(schema, &mut filters).await {
            return ToolOutcome::from_error(&e);
        }
        if let Err(e) = self
            .registry
            .translate_filter_values(filters.iter_mut().map(|f| &mut f.value))
        {
            return ToolOutcome::from_error(&e);
        }

        let result = with_retry(|| self.store.read(table, &filters)).await;
        let rows = match result {
            Ok(rows) => rows,
            Err(e) => {
                TraceEvent::ToolDispatched {
                    op: "db_read".into(),
                    table: table.into(),
                    rerouted: false,
                    ok: false,
                }
                .emit();
                return ToolOutcome::from_error(&e);
            }
        };

        let translated = self.registry.translate_read_output(rows, schema, self.turn);
        TraceEvent::ToolDispatched {
            op: "db_read".into(),
            table: table.into(),
            rerouted: false,
            ok: true,
        }
        .emit();
        ToolOutcome::ok_rows(translated)
    }

    /// Collect every string value in the filters. Reroute only when all of
    /// them are refs and every ref has in-memory data.
    fn try_reroute(&mut self, filters: &[Filter]) -> Option<Vec<Value>> {
        let mut candidates: Vec<&str> = Vec::new();
        for f in filters {
            match &f.value {
                Value::String(s) => candidates.push(s),
                Value::Array(items) => {
                    for item in items {
                        candidates.push(item.as_str()?);
                    }
                }
                Value::Null => {}
                _ => return None,
            }
        }
        if candidates.is_empty() || !candidates.iter().all(|s| refs::is_ref_shaped(s)) {
            return None;
        }

        let mut rows = Vec::with_capacity(candidates.len());
        for reference in &candidates {
            let content = self.registry.get_entity_data(reference)?.clone();
            let mut row = content;
            if let Some(obj) = row.as_object_mut() {
                obj.insert("id".into(), Value::String((*reference).to_owned()));
            }
            rows.push(row);
        }
        for reference in candidates {
            self.registry.touch(&reference.to_owned(), self.turn);
        }
        Some(rows)
    }

    /// Declared per-table name equivalences: a strict name equality becomes
    /// a contains match, or a best-name lookup substitutes an identifier.
    async fn apply_smart_names(
        &mut self,
        schema: &TableSchema,
        filters: &mut [Filter],
    ) -> Result<()> {
        for f in filters.iter_mut() {
            if f.field != schema.label_field || f.op != FilterOp::Eq {
                continue;
            }
            let Some(name) = f.value.as_str() else { continue };
            if refs::is_ref_shaped(name) {
                continue;
            }
            match schema.smart_name {
                SmartNameRule::None => {}
                SmartNameRule::IlikeContains => {
                    f.op = FilterOp::Ilike;
                    f.value = json!(format!("%{name}%"));
                }
                SmartNameRule::BestNameLookup => {
                    let probe = vec![Filter::new(
                        schema.label_field,
                        FilterOp::Ilike,
                        json!(format!("%{name}%")),
                    )];
                    let matches = with_retry(|| self.store.read(schema.table, &probe)).await?;
                    // Best name = shortest label containing the query.
                    let best = matches
                        .iter()
                        .filter_map(|r| {
                            let label = r.get(schema.label_field)?.as_str()?;
                            let id = r.get(schema.id_field)?.as_str()?;
                            Some((label.len(), id.to_owned()))
                        })
                        .min_by_key(|(len, _)| *len);
                    if let Some((_, id)) = best {
                        f.field = schema.id_field.to_owned();
                        f.op = FilterOp::Eq;
                        f.value = Value::String(id);
                    } else {
                        f.op = FilterOp::Ilike;
                        f.value = json!(format!("%{name}%"));
                    }
                }
            }
        }
        Ok(())
    }

    // ── db_create ─────────────────────────────────────────────────

    /// Create rows. When `original_refs` name prior `gen_*` artifacts, the
    /// write persists them: each gen ref is promoted and its manifest item
    /// settles.
    pub async fn db_create(
        &mut self,
        table: &str,
        payloads: Vec<Value>,
        original_refs: Option<Vec<String>>,
        mut manifest: Option<&mut BatchManifest>,
    ) -> ToolOutcome {
        let Some(schema) = schema::table(table) else {
            return ToolOutcome::fail(ErrorCode::ValidationError, format!("unknown table: {table}"));
        };
        if let Some(originals) = &original_refs {
            if originals.len() != payloads.len() {
                return ToolOutcome::fail(
                    ErrorCode::ValidationError,
                    "original_refs must match payloads one-to-one",
                );
            }
        }

        let mut prepared = Vec::with_capacity(payloads.len());
        for payload in payloads {
            match self.prepare_payload(payload, schema) {
                Ok(p) => prepared.push(p),
                Err(e) => {
                    self.fail_manifest(&mut manifest, &original_refs, &e);
                    return ToolOutcome::from_error(&e);
                }
            }
        }
        let labels: Vec<Option<String>> = prepared
            .iter()
            .map(|p| {
                p.get(schema.label_field)
                    .and_then(Value::as_str)
                    .map(str::to_owned)
            })
            .collect();

        let created = match with_retry(|| self.store.create(table, prepared.clone())).await {
            Ok(ids) => ids,
            Err(e) => {
                self.fail_manifest(&mut manifest, &original_refs, &e);
                TraceEvent::ToolDispatched {
                    op: "db_create".into(),
                    table: table.into(),
                    rerouted: false,
                    ok: false,
                }
                .emit();
                return ToolOutcome::from_error(&e);
            }
        };

        let new_refs = match self.registry.translate_create_output(
            &created,
            schema,
            original_refs.as_deref(),
            self.turn,
        ) {
            Ok(refs) => refs,
            Err(e) => return ToolOutcome::from_error(&e),
        };

        for (reference, label) in new_refs.iter().zip(&labels) {
            if let Some(label) = label {
                self.registry.set_label(reference, label);
            }
        }
        if let (Some(manifest), Some(originals)) = (manifest.as_deref_mut(), &original_refs) {
            for (original, saved) in originals.iter().zip(&new_refs) {
                manifest.mark_complete(original, Some(saved.clone()));
            }
        }

        TraceEvent::ToolDispatched {
            op: "db_create".into(),
            table: table.into(),
            rerouted: false,
            ok: true,
        }
        .emit();
        ToolOutcome::ok_refs(new_refs)
    }

    fn prepare_payload(&self, payload: Value, schema: &TableSchema) -> Result<Value> {
        let Some(obj) = payload.as_object() else {
            return Err(Error::validation("payload must be a JSON object"));
        };
        for field in obj.keys() {
            if !schema.has_field(field) {
                return Err(self.classify_unknown_field(field, schema));
            }
        }
        let mut payload = Value::Object(obj.clone());
        self.registry.translate_payload(&mut payload, schema)?;
        Ok(payload)
    }

    /// A field that belongs to a linked child table signals a mutation the
    /// step description failed to disambiguate; anything else is plain
    /// validation.
    fn classify_unknown_field(&self, field: &str, schema: &TableSchema) -> Error {
        for child in schema::children_of(schema.table) {
            if child.has_field(field) {
                return Error::tagged(
                    ErrorCode::AmbiguousMutation,
                    format!(
                        "field '{}' belongs to linked table '{}'; plan a separate {} write",
                        field, child.table, child.table
                    ),
                );
            }
        }
        Error::validation(format!(
            "unknown field '{}' on table '{}' (allowed: {})",
            field,
            schema.table,
            schema.fields.join(", ")
        ))
    }

    fn fail_manifest(
        &self,
        manifest: &mut Option<&mut BatchManifest>,
        original_refs: &Option<Vec<String>>,
        err: &Error,
    ) {
        if let (Some(manifest), Some(originals)) = (manifest.as_deref_mut(), original_refs) {
            for original in originals {
                manifest.mark_failed(original, err.to_string());
            }
        }
    }

    // ── db_update ─────────────────────────────────────────────────

    pub async fn db_update(
        &mut self,
        table: &str,
        mut filters: Vec<Filter>,
        mut patch: Value,
    ) -> ToolOutcome {
        let Some(schema) = schema::table(table) else {
            return ToolOutcome::fail(ErrorCode::ValidationError, format!("unknown table: {table}"));
        };
        if let Err(e) = filter::validate(&filters, schema) {
            return ToolOutcome::from_error(&e);
        }
        if let Some(obj) = patch.as_object() {
            for field in obj.keys() {
                if !schema.has_field(field) {
                    return ToolOutcome::from_error(&self.classify_unknown_field(field, schema));
                }
            }
        } else {
            return ToolOutcome::fail(ErrorCode::ValidationError, "patch must be a JSON object");
        }

        let touched = ref_values(&filters);
        if let Err(e) = self
            .registry
            .translate_filter_values(filters.iter_mut().map(|f| &mut f.value))
        {
            return ToolOutcome::from_error(&e);
        }
        if let Err(e) = self.registry.translate_payload(&mut patch, schema) {
            return ToolOutcome::from_error(&e);
        }

        match with_retry(|| self.store.update(table, &filters, patch.clone())).await {
            Ok(0) => ToolOutcome::ok_refs(Vec::new()),
            Ok(_) => {
                for reference in &touched {
                    self.registry.mark(reference, RefAction::Updated);
                    self.registry.touch(reference, self.turn);
                }
                ToolOutcome::ok_refs(touched)
            }
            Err(e) => ToolOutcome::from_error(&e),
        }
    }

    // ── db_delete ─────────────────────────────────────────────────

    pub async fn db_delete(&mut self, table: &str, mut filters: Vec<Filter>) -> ToolOutcome {
        let Some(schema) = schema::table(table) else {
            return ToolOutcome::fail(ErrorCode::ValidationError, format!("unknown table: {table}"));
        };
        if let Err(e) = filter::validate(&filters, schema) {
            return ToolOutcome::from_error(&e);
        }
        if filters.is_empty() {
            return ToolOutcome::fail(
                ErrorCode::ValidationError,
                "db_delete requires at least one filter",
            );
        }

        let touched = ref_values(&filters);
        if let Err(e) = self
            .registry
            .translate_filter_values(filters.iter_mut().map(|f| &mut f.value))
        {
            return ToolOutcome::from_error(&e);
        }

        match with_retry(|| self.store.delete(table, &filters)).await {
            Ok(0) => ToolOutcome::ok_refs(Vec::new()),
            Ok(_) => {
                for reference in &touched {
                    self.registry.mark(reference, RefAction::Deleted);
                    self.registry.touch(reference, self.turn);
                }
                ToolOutcome::ok_refs(touched)
            }
            Err(e) => ToolOutcome::from_error(&e),
        }
    }
}

/// Select only the fields a table declares from a generated artifact,
/// dropping nested child content the write must not carry.
pub fn payload_for_table(artifact: &Value, schema: &TableSchema) -> Value {
    let mut out = serde_json::Map::new();
    if let Some(obj) = artifact.as_object() {
        for (k, v) in obj {
            if k != schema.id_field && schema.has_field(k) {
                out.insert(k.clone(), v.clone());
            }
        }
    }
    Value::Object(out)
}

/// Ref-shaped string values appearing in a filter set.
fn ref_values(filters: &[Filter]) -> Vec<String> {
    let mut out = Vec::new();
    for f in filters {
        match &f.value {
            Value::String(s) if refs::is_ref_shaped(s) => out.push(s.clone()),
            Value::Array(items) => {
                for item in items {
                    if let Some(s) = item.as_str() {
                        if refs::is_ref_shaped(s) {
                            out.push(s.to_owned());
                        }
                    }
                }
            }
            _ => {}
        }
    }
    out
}

/// Retry transient store failures with bounded backoff.
async fn with_retry<T, F, Fut>(mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Err(e) if e.code().map(ErrorCode::is_transient).unwrap_or(false)
                && attempt < MAX_STORE_RETRIES =>
            {
                attempt += 1;
                tracing::warn!(attempt, "transient store failure, retrying");
                tokio::time::sleep(Duration::from_millis(25 * u64::from(attempt))).await;
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, UnreliableStore};

    fn gate<'a>(
        registry: &'a mut SessionIdRegistry,
        store: &'a dyn EntityStore,
    ) -> ToolGate<'a> {
        ToolGate::new(registry, store, 1)
    }

    #[tokio::test]
    async fn read_translates_rows_to_refs() {
        let store = MemoryStore::new();
        store.seed("recipes", json!({"name": "Cod cakes", "servings": 4}));
        let mut registry = SessionIdRegistry::new();

        let outcome = gate(&mut registry, &store).db_read("recipes", vec![]).await;
        assert!(outcome.ok);
        let rows = outcome.rows.unwrap();
        assert_eq!(rows[0]["id"], "recipe_1");
        assert_eq!(registry.label("recipe_1"), Some("Cod cakes"));
    }

    #[tokio::test]
    async fn read_with_zero_rows_is_complete() {
        let store = MemoryStore::new();
        let mut registry = SessionIdRegistry::new();
        let outcome = gate(&mut registry, &store).db_read("pantry_items", vec![]).await;
        assert!(outcome.ok);
        assert!(outcome.rows.unwrap().is_empty());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn read_of_pending_refs_reroutes_to_the_registry() {
        let store = MemoryStore::new();
        let mut registry = SessionIdRegistry::new();
        let gen = registry.register_generated(
            "recipe",
            "Miso cod",
            json!({"name": "Miso cod", "servings": 2}),
            1,
        );

        let outcome = gate(&mut registry, &store)
            .db_read(
                "recipes",
                vec![Filter::new("id", FilterOp::In, json!([gen]))],
            )
            .await;
        assert!(outcome.ok);
        assert!(outcome.rerouted);
        let rows = outcome.rows.unwrap();
        assert_eq!(rows[0]["name"], "Miso cod");
        assert_eq!(rows[0]["id"], "gen_recipe_1");
    }

    #[tokio::test]
    async fn mixed_ref_and_name_read_goes_to_the_store() {
        let store = MemoryStore::new();
        store.seed("recipes", json!({"name": "Cod cakes"}));
        let mut registry = SessionIdRegistry::new();
        registry.register_generated("recipe", "Draft", json!({"name": "Draft"}), 1);

        let outcome = gate(&mut registry, &store)
            .db_read(
                "recipes",
                vec![Filter::new("name", FilterOp::Ilike, json!("%cod%"))],
            )
            .await;
        assert!(outcome.ok);
        assert!(!outcome.rerouted);
    }

    #[tokio::test]
    async fn smart_name_rewrites_equality_to_ilike() {
        let store = MemoryStore::new();
        store.seed("recipes", json!({"name": "Thai Cod Curry"}));
        let mut registry = SessionIdRegistry::new();

        let outcome = gate(&mut registry, &store)
            .db_read(
                "recipes",
                vec![Filter::new("name", FilterOp::Eq, json!("cod"))],
            )
            .await;
        assert!(outcome.ok);
        assert_eq!(outcome.rows.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn smart_name_best_lookup_substitutes_identifier() {
        let store = MemoryStore::new();
        store.seed("pantry_items", json!({"name": "broccoli florets"}));
        store.seed("pantry_items", json!({"name": "broccoli"}));
        let mut registry = SessionIdRegistry::new();

        let outcome = gate(&mut registry, &store)
            .db_read(
                "pantry_items",
                vec![Filter::new("name", FilterOp::Eq, json!("broccoli"))],
            )
            .await;
        assert!(outcome.ok);
        let rows = outcome.rows.unwrap();
        // Best name = exact shortest match, one row.
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], "broccoli");
    }

    #[tokio::test]
    async fn unknown_ref_in_filters_is_surfaced_not_guessed() {
        let store = MemoryStore::new();
        let mut registry = SessionIdRegistry::new();
        let outcome = gate(&mut registry, &store)
            .db_read(
                "recipes",
                vec![Filter::new("id", FilterOp::Eq, json!("recipe_42"))],
            )
            .await;
        assert!(!outcome.ok);
        assert_eq!(outcome.code, Some(ErrorCode::UnknownRef));
        assert!(outcome.message.unwrap().contains("recipe_42"));
    }

    #[tokio::test]
    async fn create_persists_artifacts_and_settles_the_manifest() {
        let store = MemoryStore::new();
        let mut registry = SessionIdRegistry::new();
        let g1 = registry.register_generated(
            "recipe",
            "Cod cakes",
            json!({"name": "Cod cakes", "servings": 4}),
            1,
        );
        let g2 = registry.register_generated(
            "recipe",
            "Miso cod",
            json!({"name": "Miso cod", "servings": 2}),
            1,
        );
        let mut manifest = BatchManifest::new(vec![
            (g1.clone(), "Cod cakes".into()),
            (g2.clone(), "Miso cod".into()),
        ]);

        let payloads = vec![
            json!({"name": "Cod cakes", "servings": 4}),
            json!({"name": "Miso cod", "servings": 2}),
        ];
        let outcome = gate(&mut registry, &store)
            .db_create(
                "recipes",
                payloads,
                Some(vec![g1.clone(), g2.clone()]),
                Some(&mut manifest),
            )
            .await;

        assert!(outcome.ok);
        let saved = outcome.refs.unwrap();
        assert_eq!(saved.len(), 2);
        assert!(manifest.is_settled());
        assert_eq!(registry.promoted_sibling(&g1), Some(saved[0].as_str()));
        assert_eq!(store.row_count("recipes"), 2);
    }

    #[tokio::test]
    async fn create_failure_marks_manifest_items_failed() {
        let store = MemoryStore::new();
        let mut registry = SessionIdRegistry::new();
        let gen = registry.register_generated(
            "ingredient",
            "cod",
            json!({"name": "cod", "recipe_id": "recipe_1"}),
            1,
        );
        let mut manifest = BatchManifest::new(vec![(gen.clone(), "cod".into())]);

        // recipe_1 is unknown to the registry: translation fails.
        let outcome = gate(&mut registry, &store)
            .db_create(
                "recipe_ingredients",
                vec![json!({"name": "cod", "recipe_id": "recipe_1"})],
                Some(vec![gen.clone()]),
                Some(&mut manifest),
            )
            .await;

        assert!(!outcome.ok);
        assert_eq!(outcome.code, Some(ErrorCode::UnknownRef));
        assert!(manifest.is_settled());
        assert_eq!(
            manifest.items[0].status,
            alfred_domain::step::BatchItemStatus::Failed
        );
    }

    #[tokio::test]
    async fn child_field_on_parent_write_is_ambiguous() {
        let store = MemoryStore::new();
        store.seed("recipes", json!({"name": "Stir fry"}));
        let mut registry = SessionIdRegistry::new();
        let mut g = gate(&mut registry, &store);
        let read = g.db_read("recipes", vec![]).await;
        assert!(read.ok);

        let outcome = g
            .db_update(
                "recipes",
                vec![Filter::new("id", FilterOp::Eq, json!("recipe_1"))],
                json!({"quantity": 2}),
            )
            .await;
        assert!(!outcome.ok);
        assert_eq!(outcome.code, Some(ErrorCode::AmbiguousMutation));
    }

    #[tokio::test]
    async fn update_marks_refs_and_reports_them() {
        let store = MemoryStore::new();
        store.seed("recipes", json!({"name": "Stir fry", "servings": 2}));
        let mut registry = SessionIdRegistry::new();
        let mut g = gate(&mut registry, &store);
        g.db_read("recipes", vec![]).await;

        let outcome = g
            .db_update(
                "recipes",
                vec![Filter::new("id", FilterOp::Eq, json!("recipe_1"))],
                json!({"servings": 6}),
            )
            .await;
        assert!(outcome.ok);
        assert_eq!(outcome.refs.unwrap(), vec!["recipe_1"]);
        assert_eq!(registry.action("recipe_1"), Some(RefAction::Updated));
    }

    #[tokio::test]
    async fn update_matching_nothing_is_an_empty_success() {
        let store = MemoryStore::new();
        store.seed("recipes", json!({"name": "Stir fry"}));
        let mut registry = SessionIdRegistry::new();
        let mut g = gate(&mut registry, &store);
        g.db_read("recipes", vec![]).await;

        let outcome = g
            .db_update(
                "recipes",
                vec![Filter::new("name", FilterOp::Eq, json!("Nonexistent"))],
                json!({"servings": 6}),
            )
            .await;
        assert!(outcome.ok);
        assert!(outcome.refs.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_requires_filters() {
        let store = MemoryStore::new();
        let mut registry = SessionIdRegistry::new();
        let outcome = gate(&mut registry, &store).db_delete("recipes", vec![]).await;
        assert!(!outcome.ok);
        assert_eq!(outcome.code, Some(ErrorCode::ValidationError));
    }

    #[tokio::test]
    async fn transient_store_failures_are_retried() {
        let store = UnreliableStore::new(MemoryStore::new(), 2);
        let mut registry = SessionIdRegistry::new();
        let outcome = gate(&mut registry, &store).db_read("recipes", vec![]).await;
        assert!(outcome.ok, "two failures then success should succeed");
    }

    #[tokio::test]
    async fn persistent_store_failure_surfaces_after_retries() {
        let store = UnreliableStore::new(MemoryStore::new(), 5);
        let mut registry = SessionIdRegistry::new();
        let outcome = gate(&mut registry, &store).db_read("recipes", vec![]).await;
        assert!(!outcome.ok);
        assert_eq!(outcome.code, Some(ErrorCode::StoreUnavailable));
    }

    #[test]
    fn payload_for_table_strips_child_fields() {
        let schema = schema::table("recipes").unwrap();
        let artifact = json!({
            "name": "Cod cakes",
            "servings": 4,
            "ingredients": [{"name": "cod", "quantity": 500, "unit": "g"}]
        });
        let payload = payload_for_table(&artifact, schema);
        assert_eq!(payload["name"], "Cod cakes");
        assert!(payload.get("ingredients").is_none());
    }
}
