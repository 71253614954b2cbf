//! In-memory store backends with fault injection.
//!
//! Both types are cheap to clone and share their state, so a test can keep a
//! handle for assertions and fault injection while the engine owns another.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::{
    id_status_pairs, push_history, HistoryEntry, MirrorStats, OrderStore, StoreResult,
    TrackingCache, TrackingRecord,
};
use crate::error::{Result, StoreError};
use crate::types::{MirrorStatus, Order, OrderId, Status};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

// ---------------------------------------------------------------------------
// MemoryOrderStore
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct MemoryOrderStore {
    orders: Arc<Mutex<BTreeMap<OrderId, Order>>>,
    unavailable: Arc<AtomicBool>,
    latency: Option<Duration>,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_orders(orders: impl IntoIterator<Item = Order>) -> Self {
        let store = Self::new();
        for order in orders {
            store.insert(order);
        }
        store
    }

    /// Shorthand for tests: orders with only an id and a status.
    pub fn with_statuses(statuses: impl IntoIterator<Item = (OrderId, Status)>) -> Self {
        Self::with_orders(statuses.into_iter().map(|(id, s)| Order::new(id, s)))
    }

    /// Load a YAML list of orders.
    pub fn from_seed_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let orders: Vec<Order> = if data.trim().is_empty() {
            Vec::new()
        } else {
            serde_yaml::from_str(&data)?
        };
        tracing::debug!(count = orders.len(), path = %path.display(), "seeded order store");
        Ok(Self::with_orders(orders))
    }

    /// Add `latency` to every call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn insert(&self, order: Order) {
        lock(&self.orders).insert(order.id, order);
    }

    /// Simulate an outage: every call fails with `Unavailable`.
    pub fn set_unavailable(&self, down: bool) {
        self.unavailable.store(down, Ordering::SeqCst);
    }

    pub fn status_of(&self, id: OrderId) -> Option<Status> {
        lock(&self.orders).get(&id).map(|o| o.status)
    }

    async fn enter(&self) -> StoreResult<()> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("order store offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn get_status(&self, id: OrderId) -> StoreResult<Status> {
        self.enter().await?;
        self.status_of(id).ok_or(StoreError::NotFound(id))
    }

    async fn list_all(&self) -> StoreResult<Vec<(OrderId, Status)>> {
        self.enter().await?;
        let orders = lock(&self.orders);
        Ok(id_status_pairs(orders.values()))
    }

    async fn set_status(&self, id: OrderId, status: Status) -> StoreResult<()> {
        self.enter().await?;
        let mut orders = lock(&self.orders);
        let order = orders.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        order.status = status;
        order.updated_at = Utc::now();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryTrackingCache
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct CacheState {
    records: BTreeMap<OrderId, TrackingRecord>,
    history: HashMap<OrderId, Vec<HistoryEntry>>,
}

impl CacheState {
    fn write(&mut self, id: OrderId, status: Status) -> TrackingRecord {
        let now = Utc::now();
        let previous = self.records.get(&id).map(|r| r.status);
        let record = TrackingRecord {
            order_id: id,
            status,
            synced_at: now,
        };
        self.records.insert(id, record.clone());
        push_history(
            self.history.entry(id).or_default(),
            HistoryEntry {
                timestamp: now,
                previous,
                status,
            },
        );
        record
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryTrackingCache {
    state: Arc<Mutex<CacheState>>,
    failing_writes: Arc<Mutex<HashSet<OrderId>>>,
    conflicting_writes: Arc<Mutex<HashSet<OrderId>>>,
    unavailable: Arc<AtomicBool>,
    writes: Arc<AtomicUsize>,
    latency: Option<Duration>,
}

impl MemoryTrackingCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_statuses(statuses: impl IntoIterator<Item = (OrderId, Status)>) -> Self {
        let cache = Self::new();
        for (id, status) in statuses {
            cache.put(id, status);
        }
        cache
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Write directly, as an external writer would. Not counted in
    /// [`write_count`](Self::write_count) and never fails.
    pub fn put(&self, id: OrderId, status: Status) {
        lock(&self.state).write(id, status);
    }

    pub fn status_of(&self, id: OrderId) -> MirrorStatus {
        lock(&self.state).records.get(&id).map(|r| r.status).into()
    }

    /// Make every write for `id` fail with `Unavailable`.
    pub fn inject_failure(&self, id: OrderId) {
        lock(&self.failing_writes).insert(id);
    }

    /// Make every write for `id` fail with `Conflict`.
    pub fn inject_conflict(&self, id: OrderId) {
        lock(&self.conflicting_writes).insert(id);
    }

    pub fn clear_failures(&self) {
        lock(&self.failing_writes).clear();
        lock(&self.conflicting_writes).clear();
    }

    pub fn set_unavailable(&self, down: bool) {
        self.unavailable.store(down, Ordering::SeqCst);
    }

    /// Number of successful writes made through the trait.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    async fn enter(&self) -> StoreResult<()> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("tracking cache offline".into()));
        }
        Ok(())
    }

    fn check_write(&self, id: OrderId) -> StoreResult<()> {
        if lock(&self.failing_writes).contains(&id) {
            return Err(StoreError::Unavailable(format!(
                "injected write failure for order {id}"
            )));
        }
        if lock(&self.conflicting_writes).contains(&id) {
            return Err(StoreError::Conflict(id));
        }
        Ok(())
    }
}

#[async_trait]
impl TrackingCache for MemoryTrackingCache {
    async fn get_status(&self, id: OrderId) -> StoreResult<MirrorStatus> {
        self.enter().await?;
        Ok(self.status_of(id))
    }

    async fn list_all(&self, ids: &[OrderId]) -> StoreResult<HashMap<OrderId, Status>> {
        self.enter().await?;
        let state = lock(&self.state);
        Ok(ids
            .iter()
            .filter_map(|id| state.records.get(id).map(|r| (*id, r.status)))
            .collect())
    }

    async fn set_status(&self, id: OrderId, status: Status) -> StoreResult<TrackingRecord> {
        self.enter().await?;
        self.check_write(id)?;
        let record = lock(&self.state).write(id, status);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(record)
    }

    async fn insert_if_absent(&self, id: OrderId, status: Status) -> StoreResult<bool> {
        self.enter().await?;
        self.check_write(id)?;
        let mut state = lock(&self.state);
        if state.records.contains_key(&id) {
            return Ok(false);
        }
        state.write(id, status);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }

    async fn history(&self, id: OrderId) -> StoreResult<Vec<HistoryEntry>> {
        self.enter().await?;
        Ok(lock(&self.state).history.get(&id).cloned().unwrap_or_default())
    }

    async fn stats(&self) -> StoreResult<MirrorStats> {
        self.enter().await?;
        let state = lock(&self.state);
        Ok(MirrorStats::from_statuses(
            state.records.values().map(|r| r.status),
        ))
    }
}
