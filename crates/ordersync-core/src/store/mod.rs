//! Narrow client interfaces to the two stores being reconciled, plus the
//! backends that implement them.
//!
//! ```text
//! OrderStore     (authoritative)   memory | postgres
//! TrackingCache  (mirror)          memory | redb | http
//! ```
//!
//! Every call the engine makes goes through [`bounded`], so a hung backend
//! surfaces as [`StoreError::Timeout`] instead of blocking forever.

pub mod http;
pub mod memory;
pub mod postgres;
pub mod redb_cache;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{Config, OrderStoreConfig, TrackingCacheConfig};
use crate::error::{Result, StoreError};
use crate::types::{MirrorStatus, OrderId, Order, Status};

pub use http::HttpTrackingCache;
pub use memory::{MemoryOrderStore, MemoryTrackingCache};
pub use postgres::PgOrderStore;
pub use redb_cache::RedbTrackingCache;

/// Per-order history depth kept by cache backends.
pub const TRACKING_HISTORY_LIMIT: usize = 50;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Mirrored status as held by the tracking cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingRecord {
    pub order_id: OrderId,
    pub status: Status,
    pub synced_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub previous: Option<Status>,
    pub status: Status,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorStats {
    pub total_tracked: usize,
    pub by_status: BTreeMap<Status, usize>,
    pub generated_at: DateTime<Utc>,
}

impl MirrorStats {
    pub fn from_statuses(statuses: impl IntoIterator<Item = Status>) -> Self {
        let mut by_status = BTreeMap::new();
        let mut total_tracked = 0;
        for s in statuses {
            *by_status.entry(s).or_insert(0) += 1;
            total_tracked += 1;
        }
        Self {
            total_tracked,
            by_status,
            generated_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Authoritative order records.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn get_status(&self, id: OrderId) -> StoreResult<Status>;

    /// Every known order with its status, in ascending id order.
    async fn list_all(&self) -> StoreResult<Vec<(OrderId, Status)>>;

    async fn set_status(&self, id: OrderId, status: Status) -> StoreResult<()>;
}

/// Fast key-value mirror of order statuses.
#[async_trait]
pub trait TrackingCache: Send + Sync {
    async fn get_status(&self, id: OrderId) -> StoreResult<MirrorStatus>;

    /// Mirrored statuses for `ids`. Ids with no entry are simply missing
    /// from the returned map.
    async fn list_all(&self, ids: &[OrderId]) -> StoreResult<HashMap<OrderId, Status>>;

    /// Overwrite the entry for `id`, recording a history entry.
    async fn set_status(&self, id: OrderId, status: Status) -> StoreResult<TrackingRecord>;

    /// Create the entry only if none exists. Returns `false` if one did.
    ///
    /// The default is a read followed by a write; backends that can do this
    /// in a single transaction override it.
    async fn insert_if_absent(&self, id: OrderId, status: Status) -> StoreResult<bool> {
        if let MirrorStatus::Present(_) = self.get_status(id).await? {
            return Ok(false);
        }
        self.set_status(id, status).await?;
        Ok(true)
    }

    /// Status changes for `id`, newest first.
    async fn history(&self, id: OrderId) -> StoreResult<Vec<HistoryEntry>>;

    async fn stats(&self) -> StoreResult<MirrorStats>;
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Run a store call under `limit`, mapping elapsed time to `Timeout`.
pub async fn bounded<T, F>(limit: Duration, call: F) -> StoreResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_elapsed) => Err(StoreError::Timeout(limit)),
    }
}

/// Prepend `entry` to `history`, keeping at most [`TRACKING_HISTORY_LIMIT`].
pub(crate) fn push_history(history: &mut Vec<HistoryEntry>, entry: HistoryEntry) {
    history.insert(0, entry);
    history.truncate(TRACKING_HISTORY_LIMIT);
}

/// Build both store clients from configuration.
pub async fn connect(config: &Config) -> Result<(Arc<dyn OrderStore>, Arc<dyn TrackingCache>)> {
    let timeout = config.store_timeout();

    let orders: Arc<dyn OrderStore> = match &config.order_store {
        OrderStoreConfig::Memory { seed } => match seed {
            Some(path) => Arc::new(MemoryOrderStore::from_seed_file(path)?),
            None => Arc::new(MemoryOrderStore::new()),
        },
        OrderStoreConfig::Postgres {
            url,
            max_connections,
        } => {
            let store = PgOrderStore::connect(url, *max_connections, timeout)
                .await
                .map_err(|e| e.unavailable_on(crate::error::Side::OrderStore))?;
            store
                .ensure_schema()
                .await
                .map_err(|e| e.unavailable_on(crate::error::Side::OrderStore))?;
            Arc::new(store)
        }
    };

    let cache: Arc<dyn TrackingCache> = match &config.tracking_cache {
        TrackingCacheConfig::Memory => Arc::new(MemoryTrackingCache::new()),
        TrackingCacheConfig::Redb { path } => Arc::new(
            RedbTrackingCache::open(path)
                .map_err(|e| e.unavailable_on(crate::error::Side::TrackingCache))?,
        ),
        TrackingCacheConfig::Http { base_url } => Arc::new(
            HttpTrackingCache::new(base_url, timeout)
                .map_err(|e| e.unavailable_on(crate::error::Side::TrackingCache))?,
        ),
    };

    tracing::debug!(
        order_store = config.order_store.kind(),
        tracking_cache = config.tracking_cache.kind(),
        "store clients ready"
    );
    Ok((orders, cache))
}

/// Build an [`Order`] list into the `(id, status)` pairs the engine consumes.
pub(crate) fn id_status_pairs<'a>(orders: impl IntoIterator<Item = &'a Order>) -> Vec<(OrderId, Status)> {
    let mut pairs: Vec<_> = orders.into_iter().map(|o| (o.id, o.status)).collect();
    pairs.sort_by_key(|(id, _)| *id);
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bounded_maps_elapsed_to_timeout() {
        let limit = Duration::from_millis(20);
        let result: StoreResult<()> = bounded(limit, async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert_eq!(result, Err(StoreError::Timeout(limit)));
    }

    #[tokio::test]
    async fn bounded_passes_through_fast_results() {
        let result = bounded(Duration::from_secs(1), async { Ok::<_, StoreError>(7) }).await;
        assert_eq!(result, Ok(7));
    }

    /// Runs against a live database when `ORDERSYNC_TEST_POSTGRES_URL` is set.
    #[tokio::test]
    async fn connect_prepares_postgres_schema() {
        let Ok(url) = std::env::var("ORDERSYNC_TEST_POSTGRES_URL") else {
            return;
        };
        let config = Config {
            order_store: OrderStoreConfig::Postgres {
                url,
                max_connections: 2,
            },
            ..Config::default()
        };
        let (orders, _cache) = connect(&config).await.unwrap();
        assert!(orders.list_all().await.is_ok());
    }

    #[test]
    fn history_is_capped_newest_first() {
        let mut history = Vec::new();
        for i in 0..60 {
            let status = if i % 2 == 0 { Status::Pending } else { Status::Shipped };
            push_history(
                &mut history,
                HistoryEntry {
                    timestamp: Utc::now(),
                    previous: None,
                    status,
                },
            );
        }
        assert_eq!(history.len(), TRACKING_HISTORY_LIMIT);
        // i = 59 was the last push and is odd.
        assert_eq!(history[0].status, Status::Shipped);
    }

    #[test]
    fn stats_count_by_status() {
        let stats = MirrorStats::from_statuses([Status::Pending, Status::Pending, Status::Shipped]);
        assert_eq!(stats.total_tracked, 3);
        assert_eq!(stats.by_status[&Status::Pending], 2);
        assert_eq!(stats.by_status[&Status::Shipped], 1);
        assert!(!stats.by_status.contains_key(&Status::Delivered));
    }
}
