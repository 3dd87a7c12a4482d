use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::StoreError;

use super::{Filter, ProfileStore, Row, TouchColumn, USER_ID_COLUMN};

const BASE_COLUMNS: &[&str] = &[USER_ID_COLUMN, "first_name", "last_name", "username", "created_at"];

#[derive(Default)]
struct Table {
    rows: Vec<Row>,
}

/// In-process [`ProfileStore`] that behaves like a PostgREST table.
///
/// Writes naming a column outside the table's schema are rejected, inserts
/// enforce the `user_id` primary key, and the whole store can be switched
/// to unavailable.
pub struct MemoryStore {
    tables: Mutex<HashMap<String, Table>>,
    touch_columns: Mutex<HashMap<String, Option<TouchColumn>>>,
    default_touch: Option<TouchColumn>,
    unavailable: AtomicBool,
    calls: AtomicUsize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_touch_column(TouchColumn::Canonical)
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every table exposes the given touch column.
    pub fn with_touch_column(column: TouchColumn) -> Self {
        Self::build(Some(column))
    }

    /// No table has a touch column at all.
    pub fn without_touch_column() -> Self {
        Self::build(None)
    }

    fn build(default_touch: Option<TouchColumn>) -> Self {
        Self {
            tables: Mutex::new(HashMap::new()),
            touch_columns: Mutex::new(HashMap::new()),
            default_touch,
            unavailable: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    /// Override the touch column of one table.
    pub fn set_table_touch_column(&self, table: &str, column: Option<TouchColumn>) {
        self.touch_columns
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(table.to_string(), column);
    }

    /// Make every subsequent call fail with `Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of store operations attempted so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Snapshot of a table's rows.
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.tables
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    fn begin(&self) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection refused".into()));
        }
        Ok(())
    }

    fn check_columns(&self, table: &str, row: &Row) -> Result<(), StoreError> {
        let touch = self
            .touch_columns
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(table)
            .copied()
            .unwrap_or(self.default_touch);

        for column in row.keys() {
            let known = BASE_COLUMNS.contains(&column.as_str())
                || touch.map(|t| t.name() == column).unwrap_or(false);
            if !known {
                return Err(StoreError::Rejected {
                    status: 400,
                    code: Some("PGRST204".into()),
                    message: format!(
                        "Could not find the '{}' column of '{}' in the schema cache",
                        column, table
                    ),
                });
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ProfileStore for MemoryStore {
    async fn select(
        &self,
        table: &str,
        filter: Option<&Filter>,
        limit: Option<usize>,
    ) -> Result<Vec<Row>, StoreError> {
        self.begin()?;
        let tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        let rows = tables
            .get(table)
            .map(|t| {
                t.rows
                    .iter()
                    .filter(|r| filter.map(|f| f.matches(r)).unwrap_or(true))
                    .take(limit.unwrap_or(usize::MAX))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(rows)
    }

    async fn insert(&self, table: &str, row: &Row) -> Result<(), StoreError> {
        self.begin()?;
        self.check_columns(table, row)?;

        let mut tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        let entry = tables.entry(table.to_string()).or_default();
        if let Some(id) = row.get(USER_ID_COLUMN).and_then(|v| v.as_str()) {
            if entry.rows.iter().any(|r| Filter::user_id(id).matches(r)) {
                return Err(StoreError::Conflict(format!(
                    "duplicate key value violates unique constraint \"{}_pkey\"",
                    table
                )));
            }
        }
        entry.rows.push(row.clone());
        Ok(())
    }

    async fn update(&self, table: &str, patch: &Row, filter: &Filter) -> Result<usize, StoreError> {
        self.begin()?;
        self.check_columns(table, patch)?;

        let mut tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        let Some(entry) = tables.get_mut(table) else {
            return Ok(0);
        };
        let mut changed = 0;
        for row in entry.rows.iter_mut().filter(|r| filter.matches(r)) {
            for (k, v) in patch {
                row.insert(k.clone(), v.clone());
            }
            changed += 1;
        }
        Ok(changed)
    }
}
