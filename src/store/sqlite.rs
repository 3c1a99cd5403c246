//! Local SQLite backend for [`RemoteStore`], on sea-orm.
//!
//! Rows cross the boundary as JSON maps, so every column name and value is checked against
//! the `watch_progress` entity. Unknown columns surface as [`StoreError::MissingColumn`].

use super::{DEFAULT_TABLE, Filter, OrderBy, RemoteStore, Row, StoreError};
use crate::db::DatabaseConnection;
use crate::db::entities::{WatchProgress, WatchProgressActiveModel, WatchProgressColumn};
use crate::models::UserId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, Order, QueryFilter, QueryOrder,
    QuerySelect, Value as DbValue,
};
use serde_json::Value;
use tracing::trace;

#[derive(Debug, Clone)]
pub struct SqliteStore {
    db: DatabaseConnection,
    user: Option<UserId>,
}

impl SqliteStore {
    /// Store acting on behalf of `user`. Without a user every operation is a no-op upstream.
    pub fn new(db: DatabaseConnection, user: Option<UserId>) -> Self {
        Self { db, user }
    }

    fn check_table(table: &str) -> Result<(), StoreError> {
        if table == DEFAULT_TABLE {
            Ok(())
        } else {
            Err(StoreError::Database(format!("unknown table {}", table)))
        }
    }
}

fn column(name: &str) -> Result<WatchProgressColumn, StoreError> {
    WatchProgressColumn::from_name(name).ok_or_else(|| StoreError::MissingColumn(name.to_string()))
}

/// Typed database value for `column`.
fn column_value(column: WatchProgressColumn, value: &Value) -> Result<DbValue, StoreError> {
    let invalid = || StoreError::Decode(format!("invalid value {} for {:?}", value, column));

    let converted: Option<DbValue> = match column {
        WatchProgressColumn::Id => value.as_i64().map(|id| (id as i32).into()),
        WatchProgressColumn::UserId | WatchProgressColumn::ContentId => {
            text(value).map(DbValue::from)
        }
        WatchProgressColumn::UnitId => match value {
            Value::Null => Some(Option::<String>::None.into()),
            other => text(other).map(|s| Some(s).into()),
        },
        WatchProgressColumn::PositionSeconds => value.as_i64().map(DbValue::from),
        WatchProgressColumn::DurationSeconds => match value {
            Value::Null => Some(Option::<i64>::None.into()),
            other => other.as_i64().map(|d| Some(d).into()),
        },
        WatchProgressColumn::UpdatedAt => value
            .as_str()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc).into()),
    };

    converted.ok_or_else(invalid)
}

fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn condition(filters: &[Filter]) -> Result<Condition, StoreError> {
    let mut condition = Condition::all();
    for filter in filters {
        let col = column(filter.column())?;
        condition = match filter {
            Filter::IsNull(_) => condition.add(col.is_null()),
            Filter::Eq(_, value) => condition.add(col.eq(column_value(col, value)?)),
        };
    }
    Ok(condition)
}

fn active_model(row: &Row) -> Result<WatchProgressActiveModel, StoreError> {
    let mut model = <WatchProgressActiveModel as ActiveModelTrait>::default();
    for (key, value) in row {
        let col = column(key)?;
        if matches!(col, WatchProgressColumn::Id) {
            continue;
        }
        model.set(col, column_value(col, value)?);
    }
    if model.updated_at.is_not_set() {
        model.updated_at = sea_orm::Set(Utc::now());
    }
    Ok(model)
}

fn to_row(model: crate::db::entities::WatchProgressModel) -> Result<Row, StoreError> {
    match serde_json::to_value(model) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(StoreError::Decode("entity did not serialize to a map".to_string())),
        Err(e) => Err(StoreError::Decode(e.to_string())),
    }
}

#[async_trait]
impl RemoteStore for SqliteStore {
    async fn current_principal(&self) -> Result<Option<UserId>, StoreError> {
        Ok(self.user.clone())
    }

    async fn query(
        &self,
        table: &str,
        filters: &[Filter],
        order: Option<OrderBy>,
        limit: Option<usize>,
    ) -> Result<Vec<Row>, StoreError> {
        Self::check_table(table)?;

        let mut select = WatchProgress::find().filter(condition(filters)?);
        if let Some(order) = order {
            let direction = if order.descending {
                Order::Desc
            } else {
                Order::Asc
            };
            // Id breaks ties between writes stamped in the same instant
            select = select
                .order_by(column(&order.column)?, direction.clone())
                .order_by(WatchProgressColumn::Id, direction);
        }
        if let Some(limit) = limit {
            select = select.limit(limit as u64);
        }

        let models = select.all(self.db.as_ref()).await?;
        trace!("sqlite query on {} returned {} rows", table, models.len());
        models.into_iter().map(to_row).collect()
    }

    async fn upsert(
        &self,
        table: &str,
        row: Row,
        conflict_columns: &[&str],
    ) -> Result<(), StoreError> {
        Self::check_table(table)?;

        let conflict = conflict_columns
            .iter()
            .map(|name| column(name))
            .collect::<Result<Vec<_>, _>>()?;
        let updates = row
            .keys()
            .filter(|name| !conflict_columns.contains(&name.as_str()))
            .map(|name| column(name))
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .filter(|col| !matches!(col, WatchProgressColumn::Id))
            .collect::<Vec<_>>();

        let model = active_model(&row)?;
        WatchProgress::insert(model)
            .on_conflict(
                OnConflict::columns(conflict)
                    .update_columns(updates)
                    .to_owned(),
            )
            .exec(self.db.as_ref())
            .await?;
        Ok(())
    }

    async fn update(&self, table: &str, row: Row, filters: &[Filter]) -> Result<u64, StoreError> {
        Self::check_table(table)?;

        let mut statement = WatchProgress::update_many();
        for (key, value) in &row {
            let col = column(key)?;
            statement = statement.col_expr(col, Expr::value(column_value(col, value)?));
        }

        let result = statement
            .filter(condition(filters)?)
            .exec(self.db.as_ref())
            .await?;
        Ok(result.rows_affected)
    }

    async fn insert(&self, table: &str, row: Row) -> Result<(), StoreError> {
        Self::check_table(table)?;

        active_model(&row)?.insert(self.db.as_ref()).await?;
        Ok(())
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<(), StoreError> {
        Self::check_table(table)?;

        WatchProgress::delete_many()
            .filter(condition(filters)?)
            .exec(self.db.as_ref())
            .await?;
        Ok(())
    }
}
