pub mod client;
pub mod memory;
pub mod postgrest;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::StoreError;
use crate::types::UserIdentity;
use crate::util::parse_timestamp;

pub use client::{Ensured, EnsureAction, StoreClient, WriteOutcome};

/// A row as exchanged with the store.
pub type Row = Map<String, Value>;

/// Primary key column shared by both logical tables.
pub const USER_ID_COLUMN: &str = "user_id";

/// Equality filter on a single column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub column: String,
    pub value: String,
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }

    pub fn user_id(user_id: &str) -> Self {
        Self::eq(USER_ID_COLUMN, user_id)
    }

    /// Whether a row satisfies this filter (string comparison).
    pub fn matches(&self, row: &Row) -> bool {
        match row.get(&self.column) {
            Some(Value::String(s)) => s == &self.value,
            Some(Value::Number(n)) => n.to_string() == self.value,
            _ => false,
        }
    }
}

/// Table-scoped operations of the remote store.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Fetch rows matching `filter` (all rows when `None`), at most `limit`.
    async fn select(
        &self,
        table: &str,
        filter: Option<&Filter>,
        limit: Option<usize>,
    ) -> Result<Vec<Row>, StoreError>;

    /// Insert a single row.
    async fn insert(&self, table: &str, row: &Row) -> Result<(), StoreError>;

    /// Apply `patch` to rows matching `filter`; returns how many rows changed.
    async fn update(&self, table: &str, patch: &Row, filter: &Filter) -> Result<usize, StoreError>;
}

/// The two record sets a user is tracked in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalTable {
    Waitlist,
    UserProfile,
}

impl std::fmt::Display for LogicalTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogicalTable::Waitlist => write!(f, "waitlist"),
            LogicalTable::UserProfile => write!(f, "user_profile"),
        }
    }
}

/// Column that holds the "last seen" timestamp.
///
/// Deployed schemas use one of two names; `Canonical` is tried first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchColumn {
    Canonical,
    Alternate,
}

impl TouchColumn {
    pub fn name(self) -> &'static str {
        match self {
            TouchColumn::Canonical => "last_interaction",
            TouchColumn::Alternate => "last_activity",
        }
    }
}

/// A user's record in one logical table.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileRecord {
    pub user_id: String,
    pub first_name: String,
    pub last_name: Option<String>,
    pub handle: Option<String>,
    pub created_at: DateTime<FixedOffset>,
    pub last_seen_at: DateTime<FixedOffset>,
}

/// Raw row shape; tolerant of either touch column.
#[derive(Debug, Deserialize)]
struct StoredRow {
    user_id: Value,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    last_interaction: Option<String>,
    #[serde(default)]
    last_activity: Option<String>,
}

impl ProfileRecord {
    /// Project a fresh record for a first-seen user.
    pub fn first_seen(identity: &UserIdentity, now: DateTime<FixedOffset>) -> Self {
        Self {
            user_id: identity.external_id.clone(),
            first_name: identity.first_name.clone(),
            last_name: identity.last_name.clone(),
            handle: identity.handle.clone(),
            created_at: now,
            last_seen_at: now,
        }
    }

    /// Serialize for insertion, writing the touch timestamp under `column`.
    pub fn to_row(&self, column: TouchColumn) -> Row {
        let mut row = Row::new();
        row.insert(USER_ID_COLUMN.into(), Value::String(self.user_id.clone()));
        row.insert("first_name".into(), Value::String(self.first_name.clone()));
        row.insert("last_name".into(), optional(&self.last_name));
        row.insert("username".into(), optional(&self.handle));
        row.insert("created_at".into(), Value::String(self.created_at.to_rfc3339()));
        row.insert(column.name().into(), Value::String(self.last_seen_at.to_rfc3339()));
        row
    }

    /// Parse a row returned by the store.
    ///
    /// The touch timestamp is read from whichever column is present, newest
    /// first; a row without one reports `created_at`.
    pub fn from_row(row: &Row) -> Result<Self, StoreError> {
        let raw: StoredRow = serde_json::from_value(Value::Object(row.clone()))
            .map_err(|e| StoreError::Parse(e.to_string()))?;

        let user_id = match raw.user_id {
            Value::String(s) => s,
            Value::Number(n) => n.to_string(),
            other => return Err(StoreError::Parse(format!("unexpected user_id: {}", other))),
        };

        let created_at = raw
            .created_at
            .as_deref()
            .and_then(parse_timestamp)
            .ok_or_else(|| StoreError::Parse(format!("row {} has no valid created_at", user_id)))?;

        let last_seen_at = [raw.last_interaction.as_deref(), raw.last_activity.as_deref()]
            .into_iter()
            .flatten()
            .filter_map(parse_timestamp)
            .max()
            .unwrap_or(created_at);

        Ok(Self {
            user_id,
            first_name: raw.first_name.unwrap_or_default(),
            last_name: raw.last_name,
            handle: raw.username,
            created_at,
            last_seen_at,
        })
    }
}

/// Patch that sets only the touch timestamp.
pub fn touch_patch(column: TouchColumn, at: DateTime<FixedOffset>) -> Row {
    let mut row = Row::new();
    row.insert(column.name().into(), Value::String(at.to_rfc3339()));
    row
}

fn optional(value: &Option<String>) -> Value {
    value
        .as_ref()
        .map(|v| Value::String(v.clone()))
        .unwrap_or(Value::Null)
}
