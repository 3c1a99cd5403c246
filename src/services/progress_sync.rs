//! Watch-progress persistence against a [`RemoteStore`].
//!
//! Title rows (no unit) are written with update-then-insert because a NULL key column never
//! collides in a unique index. Episode rows use the store's native upsert. Store failures
//! are logged and swallowed: progress tracking must never interrupt playback.

use crate::config::ProgressConfig;
use crate::models::{ContentId, ContentIdentity, UserId, WatchProgressRecord};
use crate::store::{Filter, OrderBy, RemoteStore, Row, StoreError, columns};
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use thiserror::Error;
use tracing::{debug, info, trace, warn};

/// Whether the store schema has the optional `duration_seconds` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnCapability {
    Unknown,
    Present,
    Absent,
}

impl ColumnCapability {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => ColumnCapability::Present,
            2 => ColumnCapability::Absent,
            _ => ColumnCapability::Unknown,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            ColumnCapability::Unknown => 0,
            ColumnCapability::Present => 1,
            ColumnCapability::Absent => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoPrincipal,
    InvalidDuration,
    InvalidPosition,
    InvalidKey,
}

/// What a write request ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Written,
    /// The record was removed (finished playback, or an explicit delete)
    Cleared,
    Skipped(SkipReason),
    /// The store failed; the write was logged and dropped
    Dropped,
}

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Concurrent writers conflict on {identity}: {source}")]
    WriteConflict {
        identity: String,
        #[source]
        source: StoreError,
    },
}

type CapabilityCells = Mutex<HashMap<(String, String), Arc<AtomicU8>>>;

/// Duration-column capability per `(schema scope, table)`, kept for the process lifetime.
static DURATION_COLUMNS: OnceLock<CapabilityCells> = OnceLock::new();

fn duration_column_cell(store: &dyn RemoteStore, table: &str) -> Arc<AtomicU8> {
    let fresh = || Arc::new(AtomicU8::new(ColumnCapability::Unknown.as_u8()));
    let Some(scope) = store.schema_scope() else {
        return fresh();
    };
    DURATION_COLUMNS
        .get_or_init(Default::default)
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .entry((scope, table.to_string()))
        .or_insert_with(fresh)
        .clone()
}

enum WriteFailure {
    Store(StoreError),
    Conflict(StoreError),
}

#[derive(Clone)]
pub struct ProgressSync {
    store: Arc<dyn RemoteStore>,
    table: String,
    near_end_seconds: u64,
    min_progress_seconds: u64,
    duration_column: Arc<AtomicU8>,
    last_stamp: Arc<Mutex<Option<DateTime<Utc>>>>,
}

impl fmt::Debug for ProgressSync {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressSync")
            .field("table", &self.table)
            .field("near_end_seconds", &self.near_end_seconds)
            .field("min_progress_seconds", &self.min_progress_seconds)
            .field("duration_column", &self.duration_capability())
            .finish()
    }
}

impl ProgressSync {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        config: &ProgressConfig,
        table: impl Into<String>,
    ) -> Self {
        let table = table.into();
        Self {
            duration_column: duration_column_cell(store.as_ref(), &table),
            store,
            table,
            near_end_seconds: config.near_end_seconds,
            min_progress_seconds: config.min_progress_seconds,
            last_stamp: Arc::new(Mutex::new(None)),
        }
    }

    pub fn near_end_seconds(&self) -> u64 {
        self.near_end_seconds
    }

    pub fn min_progress_seconds(&self) -> u64 {
        self.min_progress_seconds
    }

    pub fn duration_capability(&self) -> ColumnCapability {
        ColumnCapability::from_u8(self.duration_column.load(Ordering::Acquire))
    }

    fn set_duration_capability(&self, capability: ColumnCapability) {
        self.duration_column.store(capability.as_u8(), Ordering::Release);
    }

    /// Whether `position` is close enough to the end to count as finished.
    pub fn is_near_end(&self, position: f64, duration: f64) -> bool {
        duration > 0.0 && duration - position <= self.near_end_seconds as f64
    }

    /// Resolve the principal for one operation. Failures read as "signed out".
    async fn principal(&self, operation: &str) -> Option<UserId> {
        match self.store.current_principal().await {
            Ok(Some(user)) => Some(user),
            Ok(None) => {
                trace!("No principal, skipping {}", operation);
                None
            }
            Err(e) => {
                warn!("Failed to resolve principal for {}: {}", operation, e);
                None
            }
        }
    }

    fn key_filters(user: &UserId, identity: &ContentIdentity) -> Vec<Filter> {
        vec![
            Filter::eq(columns::USER_ID, user.as_str()),
            Filter::eq(columns::CONTENT_ID, identity.content_id.as_str()),
            match &identity.unit_id {
                Some(unit) => Filter::eq(columns::UNIT_ID, unit.as_str()),
                None => Filter::is_null(columns::UNIT_ID),
            },
        ]
    }

    fn valid_identity(identity: &ContentIdentity) -> bool {
        identity.content_id.is_valid_key()
            && identity.unit_id.as_ref().is_none_or(|unit| unit.is_valid_key())
    }

    /// Client-assigned `updated_at`, strictly increasing at millisecond precision.
    fn next_stamp(&self) -> DateTime<Utc> {
        let mut last = self.last_stamp.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Utc::now().trunc_subsecs(3);
        let stamp = match *last {
            Some(previous) if now <= previous => previous + chrono::Duration::milliseconds(1),
            _ => now,
        };
        *last = Some(stamp);
        stamp
    }

    /// The most recent record for exactly this title or episode.
    ///
    /// A movie matches only the row with no unit; an episode matches only its own row.
    pub async fn load(&self, identity: &ContentIdentity) -> Option<WatchProgressRecord> {
        if !Self::valid_identity(identity) {
            return None;
        }
        let user = self.principal("load").await?;

        let rows = match self
            .store
            .query(
                &self.table,
                &Self::key_filters(&user, identity),
                Some(OrderBy::desc(columns::UPDATED_AT)),
                Some(1),
            )
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                warn!("Failed to load progress for {}: {}", identity, e);
                return None;
            }
        };

        let record = Self::decode(&rows)
            .into_iter()
            .find(|record| record.unit_id.as_ref() == identity.unit_id.as_ref());
        debug!(
            "Loaded progress for {}: {:?}",
            identity,
            record.as_ref().map(|r| r.position_seconds)
        );
        record
    }

    /// Latest record for a title across all of its units.
    ///
    /// For a title-level "continue watching" entry only; never use it to restore a unit.
    pub async fn load_latest_for_content(
        &self,
        content_id: &ContentId,
    ) -> Option<WatchProgressRecord> {
        if !content_id.is_valid_key() {
            return None;
        }
        let user = self.principal("load_latest_for_content").await?;

        let filters = [
            Filter::eq(columns::USER_ID, user.as_str()),
            Filter::eq(columns::CONTENT_ID, content_id.as_str()),
        ];
        match self
            .store
            .query(
                &self.table,
                &filters,
                Some(OrderBy::desc(columns::UPDATED_AT)),
                Some(1),
            )
            .await
        {
            Ok(rows) => Self::decode(&rows).into_iter().next(),
            Err(e) => {
                warn!("Failed to load latest progress for {}: {}", content_id, e);
                None
            }
        }
    }

    fn decode(rows: &[Row]) -> Vec<WatchProgressRecord> {
        rows.iter()
            .filter_map(|row| match WatchProgressRecord::from_row(row) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!("Ignoring malformed progress row: {}", e);
                    None
                }
            })
            .collect()
    }

    /// Record the playback position for `identity`.
    ///
    /// Near the end, or below the minimum progress, the record is deleted instead, so a finished
    /// unit drops out of "continue watching". Only an unresolvable insert race is returned as an
    /// error.
    pub async fn save(
        &self,
        identity: &ContentIdentity,
        position: f64,
        duration: f64,
    ) -> Result<SaveOutcome, SyncError> {
        if !duration.is_finite() || duration <= 0.0 {
            return Ok(SaveOutcome::Skipped(SkipReason::InvalidDuration));
        }
        if !position.is_finite() {
            return Ok(SaveOutcome::Skipped(SkipReason::InvalidPosition));
        }
        if !Self::valid_identity(identity) {
            return Ok(SaveOutcome::Skipped(SkipReason::InvalidKey));
        }

        let Some(user) = self.principal("save").await else {
            return Ok(SaveOutcome::Skipped(SkipReason::NoPrincipal));
        };

        if self.is_near_end(position, duration) {
            debug!(
                "{} finished at {:.1}/{:.1}, clearing progress",
                identity, position, duration
            );
            return Ok(self.delete_for(&user, identity).await);
        }

        let position_seconds = position.max(0.0).trunc() as i64;
        let duration_seconds = duration.trunc() as i64;

        // Too early to be worth resuming: no record is created, and a rewind clears the old one
        if position_seconds < self.min_progress_seconds as i64 {
            trace!(
                "Position {}s for {} below minimum, clearing progress",
                position_seconds, identity
            );
            return Ok(self.delete_for(&user, identity).await);
        }

        match self
            .write(&user, identity, position_seconds, duration_seconds)
            .await
        {
            Ok(()) => {
                trace!("Saved {}s/{}s for {}", position_seconds, duration_seconds, identity);
                Ok(SaveOutcome::Written)
            }
            Err(WriteFailure::Conflict(source)) => {
                warn!("Insert race for {} not resolved by update: {}", identity, source);
                Err(SyncError::WriteConflict {
                    identity: identity.to_string(),
                    source,
                })
            }
            Err(WriteFailure::Store(e)) => {
                warn!("Failed to save progress for {}: {}", identity, e);
                Ok(SaveOutcome::Dropped)
            }
        }
    }

    /// Remove exactly the record for `identity`, never other units of the same title.
    pub async fn delete(&self, identity: &ContentIdentity) -> SaveOutcome {
        if !Self::valid_identity(identity) {
            return SaveOutcome::Skipped(SkipReason::InvalidKey);
        }
        match self.principal("delete").await {
            Some(user) => self.delete_for(&user, identity).await,
            None => SaveOutcome::Skipped(SkipReason::NoPrincipal),
        }
    }

    async fn delete_for(&self, user: &UserId, identity: &ContentIdentity) -> SaveOutcome {
        match self
            .store
            .delete(&self.table, &Self::key_filters(user, identity))
            .await
        {
            Ok(()) => SaveOutcome::Cleared,
            Err(e) => {
                warn!("Failed to clear progress for {}: {}", identity, e);
                SaveOutcome::Dropped
            }
        }
    }

    fn build_row(
        &self,
        user: &UserId,
        identity: &ContentIdentity,
        position_seconds: i64,
        duration_seconds: Option<i64>,
        stamp: DateTime<Utc>,
    ) -> Row {
        let mut row = Row::new();
        row.insert(columns::USER_ID.to_string(), user.as_str().into());
        row.insert(
            columns::CONTENT_ID.to_string(),
            identity.content_id.as_str().into(),
        );
        row.insert(
            columns::UNIT_ID.to_string(),
            identity
                .unit_id
                .as_ref()
                .map_or(Value::Null, |unit| unit.as_str().into()),
        );
        row.insert(columns::POSITION_SECONDS.to_string(), position_seconds.into());
        if let Some(duration) = duration_seconds {
            row.insert(columns::DURATION_SECONDS.to_string(), duration.into());
        }
        row.insert(
            columns::UPDATED_AT.to_string(),
            stamp.to_rfc3339_opts(SecondsFormat::Millis, true).into(),
        );
        row
    }

    /// Write, dropping the duration column for good if the schema lacks it.
    async fn write(
        &self,
        user: &UserId,
        identity: &ContentIdentity,
        position_seconds: i64,
        duration_seconds: i64,
    ) -> Result<(), WriteFailure> {
        let stamp = self.next_stamp();
        let with_duration = self.duration_capability() != ColumnCapability::Absent;
        let row = self.build_row(
            user,
            identity,
            position_seconds,
            with_duration.then_some(duration_seconds),
            stamp,
        );

        match self.write_row(user, identity, row).await {
            Ok(()) => {
                if with_duration {
                    self.set_duration_capability(ColumnCapability::Present);
                }
                Ok(())
            }
            Err(WriteFailure::Store(e))
                if with_duration && e.missing_column() == Some(columns::DURATION_SECONDS) =>
            {
                info!(
                    "Store schema has no {} column, omitting it from now on",
                    columns::DURATION_SECONDS
                );
                self.set_duration_capability(ColumnCapability::Absent);
                let row = self.build_row(user, identity, position_seconds, None, stamp);
                self.write_row(user, identity, row).await
            }
            Err(e) => Err(e),
        }
    }

    async fn write_row(
        &self,
        user: &UserId,
        identity: &ContentIdentity,
        row: Row,
    ) -> Result<(), WriteFailure> {
        if identity.unit_id.is_some() {
            return self
                .store
                .upsert(
                    &self.table,
                    row,
                    &[columns::USER_ID, columns::CONTENT_ID, columns::UNIT_ID],
                )
                .await
                .map_err(WriteFailure::Store);
        }

        let filters = Self::key_filters(user, identity);
        let affected = self
            .store
            .update(&self.table, row.clone(), &filters)
            .await
            .map_err(WriteFailure::Store)?;
        if affected > 0 {
            return Ok(());
        }

        match self.store.insert(&self.table, row.clone()).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_unique_violation() => {
                debug!("Concurrent insert for {}, retrying as update", identity);
                match self.store.update(&self.table, row, &filters).await {
                    Ok(affected) if affected > 0 => Ok(()),
                    Ok(_) => Err(WriteFailure::Conflict(e)),
                    Err(retry) => Err(WriteFailure::Conflict(retry)),
                }
            }
            Err(e) => Err(WriteFailure::Store(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn sync(store: MemoryStore) -> ProgressSync {
        ProgressSync::new(Arc::new(store), &ProgressConfig::default(), "t")
    }

    #[test]
    fn test_near_end_boundary() {
        let sync = sync(MemoryStore::new("u1"));
        assert!(sync.is_near_end(95.0, 100.0));
        assert!(!sync.is_near_end(94.9, 100.0));
        assert!(!sync.is_near_end(0.0, 0.0));
    }

    #[test]
    fn test_stamps_strictly_increase() {
        let sync = sync(MemoryStore::new("u1"));
        let mut previous = sync.next_stamp();
        for _ in 0..50 {
            let next = sync.next_stamp();
            assert!(next > previous);
            previous = next;
        }
    }

    #[tokio::test]
    async fn test_rejects_invalid_input() {
        let sync = sync(MemoryStore::new("u1"));
        let movie = ContentIdentity::title("m1");

        for duration in [0.0, -5.0, f64::NAN, f64::INFINITY] {
            assert_eq!(
                sync.save(&movie, 10.0, duration).await.unwrap(),
                SaveOutcome::Skipped(SkipReason::InvalidDuration)
            );
        }
        assert_eq!(
            sync.save(&movie, f64::NAN, 100.0).await.unwrap(),
            SaveOutcome::Skipped(SkipReason::InvalidPosition)
        );
        assert_eq!(
            sync.save(&ContentIdentity::title(" "), 10.0, 100.0).await.unwrap(),
            SaveOutcome::Skipped(SkipReason::InvalidKey)
        );
    }

    #[tokio::test]
    async fn test_capability_starts_unknown_and_becomes_present() {
        let sync = sync(MemoryStore::new("u1"));
        assert_eq!(sync.duration_capability(), ColumnCapability::Unknown);

        sync.save(&ContentIdentity::title("m1"), 30.0, 100.0).await.unwrap();
        assert_eq!(sync.duration_capability(), ColumnCapability::Present);
    }

    #[tokio::test]
    async fn test_truncates_position() {
        let store = Arc::new(MemoryStore::new("u1"));
        let sync = ProgressSync::new(store.clone(), &ProgressConfig::default(), "t");

        sync.save(&ContentIdentity::episode("s", "e1"), 61.97, 1500.6)
            .await
            .unwrap();

        let rows = store.rows("t").await;
        assert_eq!(rows[0]["position_seconds"], serde_json::json!(61));
        assert_eq!(rows[0]["duration_seconds"], serde_json::json!(1500));
    }
}
