use super::StoreError;
use crate::models::UserId;
use async_trait::async_trait;
use serde_json::Value;

/// A raw record as exchanged with the store. Field names are whatever the backend uses.
pub type Row = serde_json::Map<String, Value>;

/// Row filter. All filters passed to one call are combined with AND.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    IsNull(String),
}

impl Filter {
    pub fn eq(column: &str, value: impl Into<Value>) -> Self {
        Filter::Eq(column.to_string(), value.into())
    }

    pub fn is_null(column: &str) -> Self {
        Filter::IsNull(column.to_string())
    }

    pub fn column(&self) -> &str {
        match self {
            Filter::Eq(column, _) | Filter::IsNull(column) => column,
        }
    }

    /// Evaluate against a row. A column absent from the row counts as null.
    pub fn matches(&self, row: &Row) -> bool {
        match self {
            Filter::Eq(column, value) => row.get(column).is_some_and(|v| v == value),
            Filter::IsNull(column) => row.get(column).is_none_or(Value::is_null),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub column: String,
    pub descending: bool,
}

impl OrderBy {
    pub fn desc(column: &str) -> Self {
        Self {
            column: column.to_string(),
            descending: true,
        }
    }

    pub fn asc(column: &str) -> Self {
        Self {
            column: column.to_string(),
            descending: false,
        }
    }
}

/// Authenticated record store holding watch progress.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// The signed-in principal, or `None` when there is no session.
    async fn current_principal(&self) -> Result<Option<UserId>, StoreError>;

    /// Names the backing schema. Engines over stores with the same scope share what they learn
    /// about optional columns for the rest of the process; `None` keeps it per engine.
    fn schema_scope(&self) -> Option<String> {
        None
    }

    async fn query(
        &self,
        table: &str,
        filters: &[Filter],
        order: Option<OrderBy>,
        limit: Option<usize>,
    ) -> Result<Vec<Row>, StoreError>;

    /// Insert, or merge into the row that conflicts on `conflict_columns`.
    async fn upsert(
        &self,
        table: &str,
        row: Row,
        conflict_columns: &[&str],
    ) -> Result<(), StoreError>;

    /// Update matching rows, returning how many were affected.
    async fn update(&self, table: &str, row: Row, filters: &[Filter]) -> Result<u64, StoreError>;

    async fn insert(&self, table: &str, row: Row) -> Result<(), StoreError>;

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<(), StoreError>;
}
