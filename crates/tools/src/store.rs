//! The storage seam.
//!
//! [`EntityStore`] is the only interface the core uses to reach durable
//! rows; the relational backend, its access policies, and its schema live
//! outside the core. [`MemoryStore`] is the reference implementation used
//! by tests and offline runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;
use serde_json::{Map, Value};
use uuid::Uuid;

use alfred_domain::error::{Error, ErrorCode, Result};
use alfred_domain::schema;

use crate::filter::{self, Filter};

/// Async CRUD over opaque tables. Filters arrive already translated
/// (canonical identifiers only, never refs).
#[async_trait::async_trait]
pub trait EntityStore: Send + Sync {
    async fn read(&self, table: &str, filters: &[Filter]) -> Result<Vec<Value>>;
    /// Returns the canonical identifiers of the created rows, in order.
    async fn create(&self, table: &str, rows: Vec<Value>) -> Result<Vec<String>>;
    /// Returns the number of rows updated.
    async fn update(&self, table: &str, filters: &[Filter], patch: Value) -> Result<u64>;
    /// Returns the number of rows deleted.
    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<u64>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// In-memory store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// In-memory reference store with real filter matching and FK enforcement.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, Vec<Map<String, Value>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a row directly, minting its identifier. Test convenience.
    pub fn seed(&self, table: &str, mut row: Value) -> String {
        let id = Uuid::new_v4().to_string();
        if let Some(obj) = row.as_object_mut() {
            obj.insert("id".into(), Value::String(id.clone()));
            self.tables
                .write()
                .entry(table.to_owned())
                .or_default()
                .push(obj.clone());
        }
        id
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.tables
            .read()
            .get(table)
            .map(Vec::len)
            .unwrap_or(0)
    }

    fn check_fks(&self, table: &str, row: &Map<String, Value>) -> Result<()> {
        let Some(schema) = schema::table(table) else {
            return Ok(());
        };
        let tables = self.tables.read();
        for fk in schema.fk_fields {
            let Some(Value::String(target_id)) = row.get(fk.field) else {
                continue;
            };
            let Some(target_schema) = schema::table_for_entity_type(fk.target) else {
                continue;
            };
            let exists = tables
                .get(target_schema.table)
                .map(|rows| {
                    rows.iter()
                        .any(|r| r.get("id").and_then(Value::as_str) == Some(target_id))
                })
                .unwrap_or(false);
            if !exists {
                return Err(Error::tagged(
                    ErrorCode::FkViolation,
                    format!("{}.{} references missing {}", table, fk.field, fk.target),
                ));
            }
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl EntityStore for MemoryStore {
    async fn read(&self, table: &str, filters: &[Filter]) -> Result<Vec<Value>> {
        let tables = self.tables.read();
        let rows = tables.get(table).cloned().unwrap_or_default();
        Ok(rows
            .into_iter()
            .filter(|row| filters.iter().all(|f| filter::matches(row, f)))
            .map(Value::Object)
            .collect())
    }

    async fn create(&self, table: &str, rows: Vec<Value>) -> Result<Vec<String>> {
        // Validate all rows before inserting any, so a failing batch item
        // does not leave partial siblings behind.
        let mut prepared = Vec::with_capacity(rows.len());
        for row in rows {
            let Some(mut obj) = row.as_object().cloned() else {
                return Err(Error::validation("row payload must be a JSON object"));
            };
            self.check_fks(table, &obj)?;
            let id = Uuid::new_v4().to_string();
            obj.insert("id".into(), Value::String(id.clone()));
            prepared.push((id, obj));
        }

        let mut tables = self.tables.write();
        let bucket = tables.entry(table.to_owned()).or_default();
        let mut ids = Vec::with_capacity(prepared.len());
        for (id, obj) in prepared {
            bucket.push(obj);
            ids.push(id);
        }
        Ok(ids)
    }

    async fn update(&self, table: &str, filters: &[Filter], patch: Value) -> Result<u64> {
        let Some(patch_obj) = patch.as_object() else {
            return Err(Error::validation("patch must be a JSON object"));
        };
        let mut tables = self.tables.write();
        let Some(rows) = tables.get_mut(table) else {
            return Ok(0);
        };
        let mut updated = 0;
        for row in rows.iter_mut() {
            if filters.iter().all(|f| filter::matches(row, f)) {
                for (k, v) in patch_obj {
                    row.insert(k.clone(), v.clone());
                }
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<u64> {
        let mut tables = self.tables.write();
        let Some(rows) = tables.get_mut(table) else {
            return Ok(0);
        };
        let before = rows.len();
        rows.retain(|row| !filters.iter().all(|f| filter::matches(row, f)));
        Ok((before - rows.len()) as u64)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Unreliable decorator
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Wraps a store, failing the first `n` calls with `STORE_UNAVAILABLE`.
/// Exercises the bounded-retry path.
pub struct UnreliableStore<S> {
    inner: S,
    failures_left: AtomicUsize,
}

impl<S> UnreliableStore<S> {
    pub fn new(inner: S, failures: usize) -> Self {
        Self {
            inner,
            failures_left: AtomicUsize::new(failures),
        }
    }

    fn maybe_fail(&self) -> Result<()> {
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::SeqCst);
            return Err(Error::tagged(
                ErrorCode::StoreUnavailable,
                "store temporarily unavailable",
            ));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl<S: EntityStore> EntityStore for UnreliableStore<S> {
    async fn read(&self, table: &str, filters: &[Filter]) -> Result<Vec<Value>> {
        self.maybe_fail()?;
        self.inner.read(table, filters).await
    }

    async fn create(&self, table: &str, rows: Vec<Value>) -> Result<Vec<String>> {
        self.maybe_fail()?;
        self.inner.create(table, rows).await
    }

    async fn update(&self, table: &str, filters: &[Filter], patch: Value) -> Result<u64> {
        self.maybe_fail()?;
        self.inner.update(table, filters, patch).await
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<u64> {
        self.maybe_fail()?;
        self.inner.delete(table, filters).await
    }
}
