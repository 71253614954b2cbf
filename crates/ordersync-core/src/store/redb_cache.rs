//! Tracking cache persisted in a local redb database.
//!
//! # Table design
//!
//! ```text
//! tracking : order_id (u64) -> JSON TrackingRecord
//! history  : order_id (u64) -> JSON Vec<HistoryEntry>, newest first, capped
//! ```
//!
//! A status write updates both tables in one write transaction. redb is
//! synchronous, so every trait call hops onto `spawn_blocking`.

use async_trait::async_trait;
use chrono::Utc;
use redb::{Database, ReadableTable, TableDefinition};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use super::{
    push_history, HistoryEntry, MirrorStats, StoreResult, TrackingCache, TrackingRecord,
};
use crate::error::StoreError;
use crate::types::{MirrorStatus, OrderId, Status};

const TRACKING: TableDefinition<u64, &[u8]> = TableDefinition::new("tracking");
const HISTORY: TableDefinition<u64, &[u8]> = TableDefinition::new("history");

fn db_err(e: impl std::fmt::Display) -> StoreError {
    StoreError::Unavailable(format!("redb: {e}"))
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> StoreResult<T> {
    serde_json::from_slice(bytes).map_err(|e| StoreError::Corrupt(e.to_string()))
}

fn encode<T: serde::Serialize>(value: &T) -> StoreResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| StoreError::Corrupt(e.to_string()))
}

#[derive(Clone)]
pub struct RedbTrackingCache {
    db: Arc<Database>,
}

impl RedbTrackingCache {
    /// Open or create the database at `path`, creating both tables.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(db_err)?;
            }
        }
        let db = Database::create(path).map_err(db_err)?;
        let wt = db.begin_write().map_err(db_err)?;
        wt.open_table(TRACKING).map_err(db_err)?;
        wt.open_table(HISTORY).map_err(db_err)?;
        wt.commit().map_err(db_err)?;
        Ok(Self { db: Arc::new(db) })
    }

    async fn blocking<T, F>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Database) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| StoreError::Unavailable(format!("task join error: {e}")))?
    }
}

// ---------------------------------------------------------------------------
// Synchronous operations
// ---------------------------------------------------------------------------

fn read_status(db: &Database, id: OrderId) -> StoreResult<Option<Status>> {
    let rt = db.begin_read().map_err(db_err)?;
    let table = rt.open_table(TRACKING).map_err(db_err)?;
    match table.get(id).map_err(db_err)? {
        Some(guard) => Ok(Some(decode::<TrackingRecord>(guard.value())?.status)),
        None => Ok(None),
    }
}

fn read_many(db: &Database, ids: &[OrderId]) -> StoreResult<HashMap<OrderId, Status>> {
    let rt = db.begin_read().map_err(db_err)?;
    let table = rt.open_table(TRACKING).map_err(db_err)?;
    let mut found = HashMap::with_capacity(ids.len());
    for id in ids {
        if let Some(guard) = table.get(*id).map_err(db_err)? {
            found.insert(*id, decode::<TrackingRecord>(guard.value())?.status);
        }
    }
    Ok(found)
}

/// Write `status` for `id`. With `only_if_absent`, returns `None` and writes
/// nothing when an entry already exists.
fn write_status(
    db: &Database,
    id: OrderId,
    status: Status,
    only_if_absent: bool,
) -> StoreResult<Option<TrackingRecord>> {
    let now = Utc::now();
    let record = TrackingRecord {
        order_id: id,
        status,
        synced_at: now,
    };

    let wt = db.begin_write().map_err(db_err)?;
    {
        let mut tracking = wt.open_table(TRACKING).map_err(db_err)?;
        let previous = match tracking.get(id).map_err(db_err)? {
            Some(guard) => Some(decode::<TrackingRecord>(guard.value())?.status),
            None => None,
        };
        if only_if_absent && previous.is_some() {
            return Ok(None);
        }
        tracking
            .insert(id, encode(&record)?.as_slice())
            .map_err(db_err)?;

        let mut history_table = wt.open_table(HISTORY).map_err(db_err)?;
        let mut history: Vec<HistoryEntry> = match history_table.get(id).map_err(db_err)? {
            Some(guard) => decode(guard.value())?,
            None => Vec::new(),
        };
        push_history(
            &mut history,
            HistoryEntry {
                timestamp: now,
                previous,
                status,
            },
        );
        history_table
            .insert(id, encode(&history)?.as_slice())
            .map_err(db_err)?;
    }
    wt.commit().map_err(db_err)?;
    Ok(Some(record))
}

fn read_history(db: &Database, id: OrderId) -> StoreResult<Vec<HistoryEntry>> {
    let rt = db.begin_read().map_err(db_err)?;
    let table = rt.open_table(HISTORY).map_err(db_err)?;
    match table.get(id).map_err(db_err)? {
        Some(guard) => decode(guard.value()),
        None => Ok(Vec::new()),
    }
}

fn read_stats(db: &Database) -> StoreResult<MirrorStats> {
    let rt = db.begin_read().map_err(db_err)?;
    let table = rt.open_table(TRACKING).map_err(db_err)?;
    let mut statuses = Vec::new();
    for entry in table.iter().map_err(db_err)? {
        let (_, v) = entry.map_err(db_err)?;
        statuses.push(decode::<TrackingRecord>(v.value())?.status);
    }
    Ok(MirrorStats::from_statuses(statuses))
}

// ---------------------------------------------------------------------------
// TrackingCache
// ---------------------------------------------------------------------------

#[async_trait]
impl TrackingCache for RedbTrackingCache {
    async fn get_status(&self, id: OrderId) -> StoreResult<MirrorStatus> {
        self.blocking(move |db| read_status(db, id).map(MirrorStatus::from))
            .await
    }

    async fn list_all(&self, ids: &[OrderId]) -> StoreResult<HashMap<OrderId, Status>> {
        let ids = ids.to_vec();
        self.blocking(move |db| read_many(db, &ids)).await
    }

    async fn set_status(&self, id: OrderId, status: Status) -> StoreResult<TrackingRecord> {
        self.blocking(move |db| {
            write_status(db, id, status, false)?
                .ok_or_else(|| StoreError::Corrupt(format!("write for order {id} was skipped")))
        })
        .await
    }

    async fn insert_if_absent(&self, id: OrderId, status: Status) -> StoreResult<bool> {
        self.blocking(move |db| Ok(write_status(db, id, status, true)?.is_some()))
            .await
    }

    async fn history(&self, id: OrderId) -> StoreResult<Vec<HistoryEntry>> {
        self.blocking(move |db| read_history(db, id)).await
    }

    async fn stats(&self) -> StoreResult<MirrorStats> {
        self.blocking(read_stats).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
