use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::error::StoreError;
use crate::store::{EnsureAction, LogicalTable, ProfileRecord, StoreClient, TouchColumn, WriteOutcome};
use crate::types::UserIdentity;
use crate::util::Clock;

/// How much of the read-modify-write cycle to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileMode {
    /// Create the record if absent, else refresh its touch timestamp.
    Full,
    /// Refresh the touch timestamp of an existing record only.
    TouchOnly,
}

/// What a single reconciliation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    Created(TouchColumn),
    Touched(TouchColumn),
    /// Touch-only call for a user with no record.
    Skipped,
    /// Logged and swallowed.
    Failed,
}

/// Keeps a user's records in both logical tables present and fresh.
///
/// Never fails: store problems are logged and reported as `Failed`.
#[derive(Clone)]
pub struct Reconciler {
    store: StoreClient,
    clock: Arc<dyn Clock>,
}

impl Reconciler {
    pub fn new(store: StoreClient, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Reconcile both logical tables, waitlist first.
    pub async fn reconcile_all(
        &self,
        identity: &UserIdentity,
        mode: ReconcileMode,
    ) -> [Reconciliation; 2] {
        let waitlist = self.reconcile(identity, LogicalTable::Waitlist, mode).await;
        let profile = self.reconcile(identity, LogicalTable::UserProfile, mode).await;
        [waitlist, profile]
    }

    pub async fn reconcile(
        &self,
        identity: &UserIdentity,
        table: LogicalTable,
        mode: ReconcileMode,
    ) -> Reconciliation {
        let user_id = identity.external_id.as_str();
        let result = match mode {
            ReconcileMode::Full => self.ensure(identity, table).await,
            ReconcileMode::TouchOnly => self.touch(table, user_id).await,
        };

        match result {
            Ok(r) => {
                debug!(table = %table, user_id, outcome = ?r, "Reconciled user");
                r
            }
            Err(e) => {
                error!(table = %table, user_id, "Error saving user data: {}", e);
                Reconciliation::Failed
            }
        }
    }

    async fn ensure(
        &self,
        identity: &UserIdentity,
        table: LogicalTable,
    ) -> Result<Reconciliation, StoreError> {
        let record = ProfileRecord::first_seen(identity, self.clock.now());
        let ensured = self.store.ensure_and_touch(table, &record).await?;

        if ensured.column == TouchColumn::Alternate {
            warn!(
                table = %table,
                "Table {} only accepts the alternate column {}",
                self.store.table_name(table),
                TouchColumn::Alternate.name()
            );
        }
        Ok(match ensured.action {
            EnsureAction::Created => {
                info!(table = %table, user_id = %record.user_id, "User data saved to {}", self.store.table_name(table));
                Reconciliation::Created(ensured.column)
            }
            EnsureAction::Updated => Reconciliation::Touched(ensured.column),
        })
    }

    async fn touch(&self, table: LogicalTable, user_id: &str) -> Result<Reconciliation, StoreError> {
        let (outcome, matched) = self.store.touch(table, user_id, self.clock.now()).await;
        let column = match outcome {
            WriteOutcome::Failed(e) => return Err(e),
            WriteOutcome::Fallback => {
                debug!(table = %table, user_id, "Touched via alternate column");
                TouchColumn::Alternate
            }
            WriteOutcome::Canonical => TouchColumn::Canonical,
        };
        if matched == 0 {
            return Ok(Reconciliation::Skipped);
        }
        Ok(Reconciliation::Touched(column))
    }
}
