use std::sync::Arc;

use chrono::{DateTime, FixedOffset};
use tracing::{debug, warn};

use crate::config::TableNames;
use crate::error::StoreError;

use super::{touch_patch, Filter, LogicalTable, ProfileRecord, ProfileStore, TouchColumn};

/// Result of a write that may fall back to the alternate touch column.
#[derive(Debug)]
pub enum WriteOutcome {
    /// Accepted with the canonical touch column.
    Canonical,
    /// Canonical column rejected; accepted with the alternate one.
    Fallback,
    /// Neither attempt succeeded.
    Failed(StoreError),
}

impl WriteOutcome {
    /// The column that was accepted, if any.
    pub fn column(&self) -> Option<TouchColumn> {
        match self {
            WriteOutcome::Canonical => Some(TouchColumn::Canonical),
            WriteOutcome::Fallback => Some(TouchColumn::Alternate),
            WriteOutcome::Failed(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureAction {
    Created,
    Updated,
}

/// Successful `ensure_and_touch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ensured {
    pub action: EnsureAction,
    pub column: TouchColumn,
}

/// Typed access to the two profile tables on top of a [`ProfileStore`].
#[derive(Clone)]
pub struct StoreClient {
    store: Arc<dyn ProfileStore>,
    tables: TableNames,
}

impl StoreClient {
    pub fn new(store: Arc<dyn ProfileStore>, tables: TableNames) -> Self {
        Self { store, tables }
    }

    /// Physical name of a logical table.
    pub fn table_name(&self, table: LogicalTable) -> &str {
        match table {
            LogicalTable::Waitlist => &self.tables.waitlist,
            LogicalTable::UserProfile => &self.tables.user_profile,
        }
    }

    /// Look up a user's record.
    pub async fn fetch(
        &self,
        table: LogicalTable,
        user_id: &str,
    ) -> Result<Option<ProfileRecord>, StoreError> {
        let rows = self
            .store
            .select(self.table_name(table), Some(&Filter::user_id(user_id)), Some(1))
            .await?;
        rows.first().map(ProfileRecord::from_row).transpose()
    }

    /// Whether the user has a row, without interpreting its contents.
    pub async fn exists(&self, table: LogicalTable, user_id: &str) -> Result<bool, StoreError> {
        let rows = self
            .store
            .select(self.table_name(table), Some(&Filter::user_id(user_id)), Some(1))
            .await?;
        Ok(!rows.is_empty())
    }

    /// Insert a new record, trying the canonical touch column and then the alternate.
    ///
    /// Both attempts carry the same `user_id`, so a retry never creates a second row.
    pub async fn insert_touching(&self, table: LogicalTable, record: &ProfileRecord) -> WriteOutcome {
        let name = self.table_name(table);
        let first = match self.store.insert(name, &record.to_row(TouchColumn::Canonical)).await {
            Ok(()) => return WriteOutcome::Canonical,
            Err(e) => e,
        };
        if !first.is_rejection() {
            return WriteOutcome::Failed(first);
        }
        debug!(table = name, error = %first, "Canonical touch column rejected on insert, retrying");

        match self.store.insert(name, &record.to_row(TouchColumn::Alternate)).await {
            Ok(()) => WriteOutcome::Fallback,
            Err(e) => {
                warn!(table = name, first = %first, second = %e, "Insert rejected with both touch columns");
                WriteOutcome::Failed(schema_or(e, name))
            }
        }
    }

    /// Set the touch timestamp of an existing record.
    ///
    /// Returns the outcome and how many rows the accepted update matched.
    pub async fn touch(
        &self,
        table: LogicalTable,
        user_id: &str,
        at: DateTime<FixedOffset>,
    ) -> (WriteOutcome, usize) {
        let name = self.table_name(table);
        let filter = Filter::user_id(user_id);

        let first = match self
            .store
            .update(name, &touch_patch(TouchColumn::Canonical, at), &filter)
            .await
        {
            Ok(n) => return (WriteOutcome::Canonical, n),
            Err(e) => e,
        };
        if !first.is_rejection() {
            return (WriteOutcome::Failed(first), 0);
        }
        debug!(table = name, error = %first, "Canonical touch column rejected on update, retrying");

        match self
            .store
            .update(name, &touch_patch(TouchColumn::Alternate, at), &filter)
            .await
        {
            Ok(n) => (WriteOutcome::Fallback, n),
            Err(e) => {
                warn!(table = name, first = %first, second = %e, "Update rejected with both touch columns");
                (WriteOutcome::Failed(schema_or(e, name)), 0)
            }
        }
    }

    /// Create the record if absent, else refresh its touch timestamp.
    ///
    /// Fails with `Unavailable` when the store cannot be reached and with
    /// `SchemaMismatch` when no touch column is accepted.
    pub async fn ensure_and_touch(
        &self,
        table: LogicalTable,
        record: &ProfileRecord,
    ) -> Result<Ensured, StoreError> {
        if !self.exists(table, &record.user_id).await? {
            match self.insert_touching(table, record).await {
                WriteOutcome::Failed(StoreError::Conflict(msg)) => {
                    // Created concurrently between lookup and insert.
                    debug!(table = %table, user_id = %record.user_id, "Insert conflict: {}", msg);
                }
                WriteOutcome::Failed(e) => return Err(e),
                outcome => {
                    return Ok(Ensured {
                        action: EnsureAction::Created,
                        column: outcome.column().unwrap_or(TouchColumn::Canonical),
                    })
                }
            }
        }

        match self.touch(table, &record.user_id, record.last_seen_at).await {
            (WriteOutcome::Failed(e), _) => Err(e),
            (outcome, _) => Ok(Ensured {
                action: EnsureAction::Updated,
                column: outcome.column().unwrap_or(TouchColumn::Canonical),
            }),
        }
    }

    /// Bounded read against the waitlist table.
    pub async fn check_connectivity(&self) -> Result<(), StoreError> {
        self.store
            .select(self.table_name(LogicalTable::Waitlist), None, Some(1))
            .await
            .map(|_| ())
    }

    /// Whether the store is reachable with the configured credentials.
    pub async fn test_connectivity(&self) -> bool {
        match self.check_connectivity().await {
            Ok(()) => true,
            Err(e) => {
                warn!("Store connectivity check failed: {}", e);
                false
            }
        }
    }
}

/// A second rejection means neither column exists; anything else passes through.
fn schema_or(err: StoreError, table: &str) -> StoreError {
    if err.is_rejection() {
        StoreError::SchemaMismatch {
            table: table.to_string(),
        }
    } else {
        err
    }
}
