//! In-process [`RemoteStore`] with SQL-like uniqueness rules.
//!
//! Used as an offline store and as the test double for the sync engine. Faults can be
//! injected per operation: missing columns, transport outages, scripted failures and
//! inserts from a competing writer.

use super::{Filter, OrderBy, RemoteStore, Row, StoreError, columns};
use crate::models::UserId;
use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet, VecDeque};
use tokio::sync::Mutex;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    Principal,
    Query,
    Upsert,
    Update,
    Insert,
    Delete,
}

/// A call made against the store, recorded in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreOp {
    pub kind: OpKind,
    pub table: String,
    pub row: Option<Row>,
}

/// Uniqueness constraint. NULL never equals NULL, as in SQL.
#[derive(Debug, Clone)]
struct UniqueKey {
    columns: Vec<String>,
    /// Partial index: only rows where this column is null participate
    when_null: Option<String>,
}

impl UniqueKey {
    fn conflicts(&self, a: &Row, b: &Row) -> bool {
        if let Some(column) = &self.when_null
            && !(is_null(a, column) && is_null(b, column))
        {
            return false;
        }
        self.columns.iter().all(|column| values_equal(a, b, column))
    }
}

#[derive(Debug)]
enum Scripted {
    Passthrough,
    Fail(StoreError),
}

#[derive(Debug, Default)]
struct Inner {
    principal: Option<UserId>,
    tables: HashMap<String, Vec<Row>>,
    unique_keys: Vec<UniqueKey>,
    absent_columns: HashSet<String>,
    offline: bool,
    interlopers: VecDeque<(String, Row)>,
    scripts: HashMap<OpKind, VecDeque<Scripted>>,
    ops: Vec<StoreOp>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// A store signed in as `user`, with the native `(user_id, content_id, unit_id)` key.
    pub fn new(user: impl Into<UserId>) -> Self {
        let inner = Inner {
            principal: Some(user.into()),
            unique_keys: vec![UniqueKey {
                columns: vec![
                    columns::USER_ID.to_string(),
                    columns::CONTENT_ID.to_string(),
                    columns::UNIT_ID.to_string(),
                ],
                when_null: None,
            }],
            ..Inner::default()
        };
        Self {
            inner: Mutex::new(inner),
        }
    }

    /// A store with no signed-in principal.
    pub fn anonymous() -> Self {
        let mut store = Self::new("anonymous");
        store.inner.get_mut().principal = None;
        store
    }

    /// Add a partial unique index over `(user_id, content_id) WHERE unit_id IS NULL`.
    pub fn with_title_row_index(mut self) -> Self {
        self.inner.get_mut().unique_keys.push(UniqueKey {
            columns: vec![columns::USER_ID.to_string(), columns::CONTENT_ID.to_string()],
            when_null: Some(columns::UNIT_ID.to_string()),
        });
        self
    }

    /// Simulate a schema that lacks `column`: writes naming it fail.
    pub fn without_column(mut self, column: &str) -> Self {
        self.inner
            .get_mut()
            .absent_columns
            .insert(column.to_string());
        self
    }

    pub async fn set_principal(&self, user: Option<UserId>) {
        self.inner.lock().await.principal = user;
    }

    /// Make every call fail with a transport error.
    pub async fn set_offline(&self, offline: bool) {
        self.inner.lock().await.offline = offline;
    }

    /// A competing writer inserts `row` right before the next `insert` call lands.
    pub async fn inject_concurrent_insert(&self, table: &str, row: Row) {
        self.inner
            .lock()
            .await
            .interlopers
            .push_back((table.to_string(), row));
    }

    /// Let the next call of `kind` through, unchanged.
    pub async fn script_pass(&self, kind: OpKind) {
        self.push_script(kind, Scripted::Passthrough).await;
    }

    /// Fail the next call of `kind` (after any earlier scripted calls) with `error`.
    pub async fn script_failure(&self, kind: OpKind, error: StoreError) {
        self.push_script(kind, Scripted::Fail(error)).await;
    }

    async fn push_script(&self, kind: OpKind, scripted: Scripted) {
        self.inner
            .lock()
            .await
            .scripts
            .entry(kind)
            .or_default()
            .push_back(scripted);
    }

    /// Snapshot of every row in `table`.
    pub async fn rows(&self, table: &str) -> Vec<Row> {
        self.inner
            .lock()
            .await
            .tables
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    /// Put a row in place directly, bypassing constraints.
    pub async fn seed(&self, table: &str, row: Row) {
        self.inner
            .lock()
            .await
            .tables
            .entry(table.to_string())
            .or_default()
            .push(row);
    }

    pub async fn ops(&self) -> Vec<StoreOp> {
        self.inner.lock().await.ops.clone()
    }

    pub async fn op_count(&self, kind: OpKind) -> usize {
        self.inner
            .lock()
            .await
            .ops
            .iter()
            .filter(|op| op.kind == kind)
            .count()
    }

    /// Number of calls that write (upsert, update, insert, delete).
    pub async fn write_count(&self) -> usize {
        self.inner
            .lock()
            .await
            .ops
            .iter()
            .filter(|op| !matches!(op.kind, OpKind::Principal | OpKind::Query))
            .count()
    }
}

impl Inner {
    fn begin(&mut self, kind: OpKind, table: &str, row: Option<&Row>) -> Result<(), StoreError> {
        trace!("memory store {:?} on {}", kind, table);
        self.ops.push(StoreOp {
            kind,
            table: table.to_string(),
            row: row.cloned(),
        });

        if self.offline {
            return Err(StoreError::Transport("store unreachable".to_string()));
        }

        if let Some(Scripted::Fail(err)) = self.scripts.get_mut(&kind).and_then(VecDeque::pop_front)
        {
            return Err(err);
        }

        if let Some(row) = row
            && let Some(column) = row.keys().find(|key| self.absent_columns.contains(*key))
        {
            return Err(StoreError::MissingColumn(column.clone()));
        }

        Ok(())
    }

    fn check_unique(
        &self,
        table: &str,
        candidate: &Row,
        skip: Option<usize>,
    ) -> Result<(), StoreError> {
        let rows = self.tables.get(table).map(Vec::as_slice).unwrap_or_default();
        for (index, existing) in rows.iter().enumerate() {
            if Some(index) == skip {
                continue;
            }
            if let Some(key) = self
                .unique_keys
                .iter()
                .find(|key| key.conflicts(existing, candidate))
            {
                return Err(StoreError::UniqueViolation(format!(
                    "duplicate key on ({})",
                    key.columns.join(", ")
                )));
            }
        }
        Ok(())
    }

    fn insert_checked(&mut self, table: &str, row: Row) -> Result<(), StoreError> {
        self.check_unique(table, &row, None)?;
        self.tables.entry(table.to_string()).or_default().push(row);
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn current_principal(&self) -> Result<Option<UserId>, StoreError> {
        let mut inner = self.inner.lock().await;
        inner.begin(OpKind::Principal, "auth", None)?;
        Ok(inner.principal.clone())
    }

    async fn query(
        &self,
        table: &str,
        filters: &[Filter],
        order: Option<OrderBy>,
        limit: Option<usize>,
    ) -> Result<Vec<Row>, StoreError> {
        let mut inner = self.inner.lock().await;
        inner.begin(OpKind::Query, table, None)?;

        let mut rows: Vec<Row> = inner
            .tables
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| filters.iter().all(|f| f.matches(row)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if let Some(order) = order {
            rows.sort_by(|a, b| {
                let ordering = compare_values(a.get(&order.column), b.get(&order.column));
                if order.descending {
                    ordering.reverse()
                } else {
                    ordering
                }
            });
        }

        if let Some(limit) = limit {
            rows.truncate(limit);
        }

        Ok(rows)
    }

    async fn upsert(
        &self,
        table: &str,
        row: Row,
        conflict_columns: &[&str],
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.begin(OpKind::Upsert, table, Some(&row))?;

        // A null in any conflict column never matches, so such rows always insert.
        let existing = inner.tables.get(table).and_then(|rows| {
            rows.iter().position(|candidate| {
                conflict_columns
                    .iter()
                    .all(|column| values_equal(candidate, &row, column))
            })
        });

        match existing {
            Some(index) => {
                let mut merged = inner.tables[table][index].clone();
                merged.extend(row);
                inner.check_unique(table, &merged, Some(index))?;
                if let Some(rows) = inner.tables.get_mut(table) {
                    rows[index] = merged;
                }
                Ok(())
            }
            None => inner.insert_checked(table, row),
        }
    }

    async fn update(&self, table: &str, row: Row, filters: &[Filter]) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock().await;
        inner.begin(OpKind::Update, table, Some(&row))?;

        let Some(rows) = inner.tables.get_mut(table) else {
            return Ok(0);
        };

        let mut affected = 0;
        for existing in rows.iter_mut() {
            if filters.iter().all(|f| f.matches(existing)) {
                existing.extend(row.clone());
                affected += 1;
            }
        }
        Ok(affected)
    }

    async fn insert(&self, table: &str, row: Row) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;

        if let Some(position) = inner.interlopers.iter().position(|(t, _)| t == table)
            && let Some((_, competitor)) = inner.interlopers.remove(position)
        {
            inner
                .tables
                .entry(table.to_string())
                .or_default()
                .push(competitor);
        }

        inner.begin(OpKind::Insert, table, Some(&row))?;
        inner.insert_checked(table, row)
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.begin(OpKind::Delete, table, None)?;

        if let Some(rows) = inner.tables.get_mut(table) {
            rows.retain(|row| !filters.iter().all(|f| f.matches(row)));
        }
        Ok(())
    }
}

fn is_null(row: &Row, column: &str) -> bool {
    row.get(column).is_none_or(Value::is_null)
}

fn values_equal(a: &Row, b: &Row, column: &str) -> bool {
    match (a.get(column), b.get(column)) {
        (Some(x), Some(y)) if !x.is_null() && !y.is_null() => x == y,
        _ => false,
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(x), Some(y)) => x.is_null().cmp(&y.is_null()).reverse(),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
