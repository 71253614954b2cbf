//! Whole-population reconciliation: the consistency check and the forced
//! bulk resync, plus the single-order entry points re-exposed from the
//! repair executor.
//!
//! Neither pass holds a lock across the two stores. A report describes what
//! was read at the time and may already be stale when it is returned.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::detector::{detect, Discrepancy};
use crate::error::{ReconcileError, Result, Side, StoreError};
use crate::oplog::{LogKind, OperationLog, OperationLogEntry};
use crate::repair::{CreateOutcome, RepairExecutor, RepairOutcome, SyncOutcome};
use crate::store::{self, bounded, HistoryEntry, MirrorStats, OrderStore, TrackingCache};
use crate::types::{MirrorStatus, OrderId, Status};

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileSettings {
    pub store_timeout: Duration,
    pub repair_concurrency: usize,
    pub batch_size: usize,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for ReconcileSettings {
    fn from(cfg: &Config) -> Self {
        Self {
            store_timeout: cfg.store_timeout(),
            repair_concurrency: cfg.repair_concurrency.max(1),
            batch_size: cfg.batch_size.max(1),
        }
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Consistent,
    Inconsistent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyReport {
    pub total_orders: usize,
    pub discrepancies_found: usize,
    /// Inconsistent pairs only, in ascending order id.
    pub discrepancies: Vec<Discrepancy>,
    pub consistency_percentage: f64,
    pub verdict: Verdict,
    pub checked_at: DateTime<Utc>,
}

impl ConsistencyReport {
    pub fn new(total_orders: usize, discrepancies: Vec<Discrepancy>) -> Self {
        let found = discrepancies.len();
        let consistency_percentage = if total_orders == 0 {
            100.0
        } else {
            (total_orders - found) as f64 / total_orders as f64 * 100.0
        };
        Self {
            total_orders,
            discrepancies_found: found,
            discrepancies,
            consistency_percentage,
            verdict: if found == 0 {
                Verdict::Consistent
            } else {
                Verdict::Inconsistent
            },
            checked_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BulkOutcome {
    Success,
    PartialFailure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairFailure {
    pub order_id: OrderId,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkRepairResult {
    pub outcome: BulkOutcome,
    pub succeeded: Vec<OrderId>,
    pub failed: Vec<RepairFailure>,
}

impl BulkRepairResult {
    fn new(mut succeeded: Vec<OrderId>, mut failed: Vec<RepairFailure>) -> Self {
        succeeded.sort_unstable();
        failed.sort_by_key(|f| f.order_id);
        let outcome = if failed.is_empty() {
            BulkOutcome::Success
        } else {
            BulkOutcome::PartialFailure
        };
        Self {
            outcome,
            succeeded,
            failed,
        }
    }

    pub fn failed_ids(&self) -> Vec<OrderId> {
        self.failed.iter().map(|f| f.order_id).collect()
    }
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

pub struct Reconciler {
    orders: Arc<dyn OrderStore>,
    cache: Arc<dyn TrackingCache>,
    log: Arc<OperationLog>,
    executor: RepairExecutor,
    settings: ReconcileSettings,
}

impl Reconciler {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        cache: Arc<dyn TrackingCache>,
        settings: ReconcileSettings,
    ) -> Self {
        let settings = ReconcileSettings {
            repair_concurrency: settings.repair_concurrency.max(1),
            batch_size: settings.batch_size.max(1),
            ..settings
        };
        let log = Arc::new(OperationLog::new());
        let executor = RepairExecutor::new(
            Arc::clone(&orders),
            Arc::clone(&cache),
            Arc::clone(&log),
            settings.store_timeout,
        );
        Self {
            orders,
            cache,
            log,
            executor,
            settings,
        }
    }

    /// Validate `config`, connect both stores and build an engine over them.
    pub async fn from_config(config: &Config) -> Result<Self> {
        config.ensure_valid()?;
        let (orders, cache) = store::connect(config).await?;
        Ok(Self::new(orders, cache, ReconcileSettings::from(config)))
    }

    // -----------------------------------------------------------------------
    // Consistency check
    // -----------------------------------------------------------------------

    pub async fn check_all(&self) -> Result<ConsistencyReport> {
        self.check_all_with(&CancellationToken::new()).await
    }

    /// Read both stores and report every mismatch. Never writes.
    ///
    /// Fails as a whole if either store cannot be read; no partial report is
    /// produced.
    pub async fn check_all_with(&self, cancel: &CancellationToken) -> Result<ConsistencyReport> {
        let timeout = self.settings.store_timeout;

        let pairs = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(self.cancelled("Consistency check")),
            r = bounded(timeout, self.orders.list_all()) => r,
        };
        let pairs = pairs.map_err(|e| self.source_failure("Consistency check", Side::OrderStore, e))?;

        let mut discrepancies = Vec::new();
        for chunk in pairs.chunks(self.settings.batch_size) {
            let ids: Vec<OrderId> = chunk.iter().map(|(id, _)| *id).collect();
            let mirrored = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(self.cancelled("Consistency check")),
                r = bounded(timeout, self.cache.list_all(&ids)) => r,
            };
            let mirrored = mirrored
                .map_err(|e| self.source_failure("Consistency check", Side::TrackingCache, e))?;

            for (id, status) in chunk {
                let d = detect(*id, *status, MirrorStatus::from(mirrored.get(id).copied()));
                if !d.is_consistent {
                    tracing::warn!(
                        order_id = d.order_id,
                        status = %d.authoritative,
                        mirrored = %d.mirrored,
                        "discrepancy"
                    );
                    discrepancies.push(d);
                }
            }
        }

        let report = ConsistencyReport::new(pairs.len(), discrepancies);
        self.log.append(
            LogKind::Info,
            format!(
                "Consistency check: {} orders, {} discrepancies ({:.1}% consistent)",
                report.total_orders, report.discrepancies_found, report.consistency_percentage
            ),
        );
        Ok(report)
    }

    // -----------------------------------------------------------------------
    // Bulk repair
    // -----------------------------------------------------------------------

    pub async fn repair_all(&self) -> Result<BulkRepairResult> {
        self.repair_all_with(&CancellationToken::new()).await
    }

    /// Write every authoritative status into the mirror, matching or not.
    ///
    /// Up to `repair_concurrency` writes are in flight at once. A failed
    /// write is recorded against its order and the run carries on. On
    /// cancellation, writes that already landed stay in place.
    pub async fn repair_all_with(&self, cancel: &CancellationToken) -> Result<BulkRepairResult> {
        let pairs = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(self.cancelled("Bulk repair")),
            r = bounded(self.settings.store_timeout, self.orders.list_all()) => r,
        };
        let pairs = pairs.map_err(|e| self.source_failure("Bulk repair", Side::OrderStore, e))?;
        let total = pairs.len();

        let mut writes = stream::iter(pairs)
            .map(|(id, status)| async move { (id, self.executor.write_mirror(id, status).await) })
            .buffer_unordered(self.settings.repair_concurrency);

        let mut succeeded = Vec::with_capacity(total);
        let mut failed = Vec::new();
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.log.append(
                        LogKind::Failure,
                        format!(
                            "Bulk repair cancelled after {} of {total} orders",
                            succeeded.len() + failed.len()
                        ),
                    );
                    return Err(ReconcileError::Cancelled);
                }
                next = writes.next() => match next {
                    Some((id, Ok(_))) => succeeded.push(id),
                    Some((id, Err(e))) => {
                        tracing::warn!(order_id = id, error = %e, "mirror write failed");
                        failed.push(RepairFailure { order_id: id, reason: e.to_string() });
                    }
                    None => break,
                },
            }
        }

        let result = BulkRepairResult::new(succeeded, failed);
        match result.outcome {
            BulkOutcome::Success => self.log.append(
                LogKind::Success,
                format!("Bulk repair completed: {total} orders mirrored"),
            ),
            BulkOutcome::PartialFailure => {
                let ids: Vec<String> = result.failed_ids().iter().map(|id| id.to_string()).collect();
                self.log.append(
                    LogKind::Failure,
                    format!(
                        "Bulk repair partially failed: {} succeeded, {} failed (orders {})",
                        result.succeeded.len(),
                        result.failed.len(),
                        ids.join(", ")
                    ),
                );
            }
        }
        Ok(result)
    }

    // -----------------------------------------------------------------------
    // Single-order operations
    // -----------------------------------------------------------------------

    pub async fn repair(&self, id: OrderId) -> Result<RepairOutcome> {
        self.executor.repair(id).await
    }

    pub async fn sync_from_mirror(&self, id: OrderId) -> Result<SyncOutcome> {
        self.executor.sync_from_mirror(id).await
    }

    pub async fn create_mirror(&self, id: OrderId) -> Result<CreateOutcome> {
        self.executor.create_mirror(id).await
    }

    /// Compare one order without touching either store's contents.
    pub async fn check_one(&self, id: OrderId) -> Result<Option<Discrepancy>> {
        let timeout = self.settings.store_timeout;
        let status: Status = match bounded(timeout, self.orders.get_status(id)).await {
            Ok(s) => s,
            Err(StoreError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e.unavailable_on(Side::OrderStore)),
        };
        let mirrored = bounded(timeout, self.cache.get_status(id))
            .await
            .map_err(|e| e.unavailable_on(Side::TrackingCache))?;
        Ok(Some(detect(id, status, mirrored)))
    }

    pub async fn history(&self, id: OrderId) -> Result<Vec<HistoryEntry>> {
        bounded(self.settings.store_timeout, self.cache.history(id))
            .await
            .map_err(|e| e.unavailable_on(Side::TrackingCache))
    }

    pub async fn mirror_stats(&self) -> Result<MirrorStats> {
        bounded(self.settings.store_timeout, self.cache.stats())
            .await
            .map_err(|e| e.unavailable_on(Side::TrackingCache))
    }

    /// Operation log snapshot, most recent first.
    pub fn log_entries(&self) -> Vec<OperationLogEntry> {
        self.log.entries()
    }

    fn source_failure(
        &self,
        operation: &str,
        side: Side,
        e: StoreError,
    ) -> ReconcileError {
        let err = e.unavailable_on(side);
        self.log
            .append(LogKind::Failure, format!("{operation} failed: {err}"));
        err
    }

    fn cancelled(&self, operation: &str) -> ReconcileError {
        self.log
            .append(LogKind::Failure, format!("{operation} cancelled"));
        ReconcileError::Cancelled
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryOrderStore, MemoryTrackingCache};

    fn engine(orders: &MemoryOrderStore, cache: &MemoryTrackingCache) -> Reconciler {
        engine_with(orders, cache, ReconcileSettings::default())
    }

    fn engine_with(
        orders: &MemoryOrderStore,
        cache: &MemoryTrackingCache,
        settings: ReconcileSettings,
    ) -> Reconciler {
        Reconciler::new(Arc::new(orders.clone()), Arc::new(cache.clone()), settings)
    }

    fn ten_orders() -> Vec<(OrderId, Status)> {
        (1..=10)
            .map(|id| (id, Status::all()[(id as usize) % Status::all().len()]))
            .collect()
    }

    #[tokio::test]
    async fn mixed_population_reports_two_of_three() {
        let orders = MemoryOrderStore::with_statuses([
            (1, Status::Pending),
            (2, Status::Shipped),
            (3, Status::Delivered),
        ]);
        let cache = MemoryTrackingCache::with_statuses([(1, Status::Pending), (2, Status::Pending)]);
        let engine = engine(&orders, &cache);

        let report = engine.check_all().await.unwrap();
        assert_eq!(report.total_orders, 3);
        assert_eq!(report.discrepancies_found, 2);
        assert!((report.consistency_percentage - 33.3).abs() < 0.1);
        assert_eq!(report.verdict, Verdict::Inconsistent);
        assert_eq!(report.discrepancies[0].order_id, 2);
        assert_eq!(report.discrepancies[1].mirrored, MirrorStatus::Absent);
    }

    #[tokio::test]
    async fn empty_population_is_fully_consistent() {
        let engine = engine(&MemoryOrderStore::new(), &MemoryTrackingCache::new());
        let report = engine.check_all().await.unwrap();
        assert_eq!(report.total_orders, 0);
        assert_eq!(report.consistency_percentage, 100.0);
        assert_eq!(report.verdict, Verdict::Consistent);
    }

    #[tokio::test]
    async fn check_batches_cache_reads() {
        let pairs = ten_orders();
        let orders = MemoryOrderStore::with_statuses(pairs.clone());
        let cache = MemoryTrackingCache::with_statuses(pairs);
        let engine = engine_with(
            &orders,
            &cache,
            ReconcileSettings {
                batch_size: 3,
                ..ReconcileSettings::default()
            },
        );

        let report = engine.check_all().await.unwrap();
        assert_eq!(report.total_orders, 10);
        assert_eq!(report.discrepancies_found, 0);
    }

    #[tokio::test]
    async fn check_does_not_write() {
        let orders = MemoryOrderStore::with_statuses([(1, Status::Shipped)]);
        let cache = MemoryTrackingCache::new();
        let engine = engine(&orders, &cache);

        engine.check_all().await.unwrap();
        assert_eq!(cache.write_count(), 0);
        assert_eq!(cache.status_of(1), MirrorStatus::Absent);
    }

    #[tokio::test]
    async fn check_fails_whole_when_cache_is_down() {
        let orders = MemoryOrderStore::with_statuses([(1, Status::Shipped)]);
        let cache = MemoryTrackingCache::new();
        cache.set_unavailable(true);
        let engine = engine(&orders, &cache);

        let err = engine.check_all().await.unwrap_err();
        assert!(matches!(
            err,
            ReconcileError::SourceUnavailable {
                side: Side::TrackingCache,
                ..
            }
        ));
        assert_eq!(engine.log_entries()[0].kind, LogKind::Failure);
    }

    #[tokio::test]
    async fn check_fails_when_order_store_is_down() {
        let orders = MemoryOrderStore::with_statuses([(1, Status::Shipped)]);
        orders.set_unavailable(true);
        let engine = engine(&orders, &MemoryTrackingCache::new());

        assert!(matches!(
            engine.check_all().await,
            Err(ReconcileError::SourceUnavailable {
                side: Side::OrderStore,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn scenario_42_repair_then_recheck() {
        let orders = MemoryOrderStore::with_statuses([(42, Status::Shipped)]);
        let cache = MemoryTrackingCache::with_statuses([(42, Status::Pending)]);
        let engine = engine(&orders, &cache);

        let before = engine.check_one(42).await.unwrap().unwrap();
        assert!(!before.is_consistent);

        assert!(engine.repair(42).await.unwrap().is_success());
        assert_eq!(cache.status_of(42), MirrorStatus::Present(Status::Shipped));

        let after = engine.check_one(42).await.unwrap().unwrap();
        assert!(after.is_consistent);
    }

    #[tokio::test]
    async fn bulk_repair_isolates_single_failure() {
        let pairs = ten_orders();
        let orders = MemoryOrderStore::with_statuses(pairs.clone());
        let cache = MemoryTrackingCache::new();
        cache.inject_failure(7);
        let engine = engine(&orders, &cache);

        let result = engine.repair_all().await.unwrap();
        assert_eq!(result.outcome, BulkOutcome::PartialFailure);
        assert_eq!(result.succeeded.len(), 9);
        assert_eq!(result.failed_ids(), vec![7]);
        for (id, status) in pairs {
            let expected = if id == 7 {
                MirrorStatus::Absent
            } else {
                MirrorStatus::Present(status)
            };
            assert_eq!(cache.status_of(id), expected, "order {id}");
        }

        let entry = &engine.log_entries()[0];
        assert_eq!(entry.kind, LogKind::Failure);
        assert!(entry.message.contains("orders 7"));
    }

    #[tokio::test]
    async fn bulk_repair_overwrites_consistent_entries_too() {
        let orders = MemoryOrderStore::with_statuses([(1, Status::Pending), (2, Status::Shipped)]);
        let cache = MemoryTrackingCache::with_statuses([(1, Status::Pending)]);
        let engine = engine(&orders, &cache);

        let result = engine.repair_all().await.unwrap();
        assert_eq!(result.outcome, BulkOutcome::Success);
        assert_eq!(result.succeeded, vec![1, 2]);
        assert_eq!(cache.write_count(), 2);
        assert_eq!(engine.log_entries()[0].kind, LogKind::Success);

        let report = engine.check_all().await.unwrap();
        assert_eq!(report.verdict, Verdict::Consistent);
    }

    #[tokio::test]
    async fn bulk_repair_on_empty_store_succeeds() {
        let engine = engine(&MemoryOrderStore::new(), &MemoryTrackingCache::new());
        let result = engine.repair_all().await.unwrap();
        assert_eq!(result.outcome, BulkOutcome::Success);
        assert!(result.succeeded.is_empty());
    }

    #[tokio::test]
    async fn zero_batch_and_concurrency_are_treated_as_one() {
        let pairs = ten_orders();
        let orders = MemoryOrderStore::with_statuses(pairs);
        let cache = MemoryTrackingCache::new();
        let engine = engine_with(
            &orders,
            &cache,
            ReconcileSettings {
                batch_size: 0,
                repair_concurrency: 0,
                ..ReconcileSettings::default()
            },
        );

        let report = engine.check_all().await.unwrap();
        assert_eq!(report.discrepancies_found, 10);

        let result = engine.repair_all().await.unwrap();
        assert_eq!(result.succeeded.len(), 10);
        assert_eq!(engine.check_all().await.unwrap().verdict, Verdict::Consistent);
    }

    #[tokio::test]
    async fn repeated_bulk_repair_changes_nothing() {
        let pairs = ten_orders();
        let orders = MemoryOrderStore::with_statuses(pairs.clone());
        let cache = MemoryTrackingCache::with_statuses([(1, Status::Cancelled)]);
        let engine = engine(&orders, &cache);

        let first = engine.repair_all().await.unwrap();
        let mirrored: Vec<_> = pairs.iter().map(|(id, _)| cache.status_of(*id)).collect();

        let second = engine.repair_all().await.unwrap();
        assert_eq!(first.outcome, BulkOutcome::Success);
        assert_eq!(second.outcome, BulkOutcome::Success);
        assert_eq!(first.succeeded, second.succeeded);
        assert!(second.failed.is_empty());

        let after: Vec<_> = pairs.iter().map(|(id, _)| cache.status_of(*id)).collect();
        assert_eq!(mirrored, after);
        for (id, status) in &pairs {
            assert_eq!(orders.status_of(*id), Some(*status));
        }
        assert_eq!(engine.check_all().await.unwrap().verdict, Verdict::Consistent);
    }

    #[tokio::test]
    async fn bulk_repair_honours_write_timeout() {
        let orders = MemoryOrderStore::with_statuses([(1, Status::Pending)]);
        let cache = MemoryTrackingCache::new().with_latency(Duration::from_millis(300));
        let engine = engine_with(
            &orders,
            &cache,
            ReconcileSettings {
                store_timeout: Duration::from_millis(20),
                ..ReconcileSettings::default()
            },
        );

        let result = engine.repair_all().await.unwrap();
        assert_eq!(result.failed_ids(), vec![1]);
        assert!(result.failed[0].reason.contains("timed out"));
    }

    #[tokio::test]
    async fn pre_cancelled_check_returns_cancelled() {
        let orders = MemoryOrderStore::with_statuses([(1, Status::Pending)]);
        let engine = engine(&orders, &MemoryTrackingCache::new());
        let token = CancellationToken::new();
        token.cancel();

        assert!(matches!(
            engine.check_all_with(&token).await,
            Err(ReconcileError::Cancelled)
        ));
        assert_eq!(engine.log_entries()[0].kind, LogKind::Failure);
    }

    #[tokio::test]
    async fn cancelling_bulk_repair_keeps_completed_writes() {
        let pairs: Vec<_> = (1..=40).map(|id| (id, Status::Shipped)).collect();
        let orders = MemoryOrderStore::with_statuses(pairs);
        let cache = MemoryTrackingCache::new().with_latency(Duration::from_millis(50));
        let engine = Arc::new(engine_with(
            &orders,
            &cache,
            ReconcileSettings {
                repair_concurrency: 2,
                ..ReconcileSettings::default()
            },
        ));

        let token = CancellationToken::new();
        let task = {
            let engine = Arc::clone(&engine);
            let token = token.clone();
            tokio::spawn(async move { engine.repair_all_with(&token).await })
        };
        tokio::time::sleep(Duration::from_millis(180)).await;
        token.cancel();

        let result = task.await.unwrap();
        assert!(matches!(result, Err(ReconcileError::Cancelled)));
        let written = cache.write_count();
        assert!(written > 0 && written < 40, "wrote {written}");
        assert!(engine.log_entries()[0].message.contains("cancelled"));
    }

    #[tokio::test]
    async fn history_and_stats_pass_through() {
        let orders = MemoryOrderStore::with_statuses([(1, Status::Pending), (2, Status::Shipped)]);
        let cache = MemoryTrackingCache::new();
        let engine = engine(&orders, &cache);

        engine.repair_all().await.unwrap();
        orders.insert(crate::types::Order::new(1, Status::Delivered));
        engine.repair(1).await.unwrap();

        let history = engine.history(1).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].previous, Some(Status::Pending));

        let stats = engine.mirror_stats().await.unwrap();
        assert_eq!(stats.total_tracked, 2);
    }

    #[tokio::test]
    async fn from_config_rejects_invalid_settings() {
        let cfg = Config {
            batch_size: 0,
            ..Config::default()
        };
        assert!(matches!(
            Reconciler::from_config(&cfg).await,
            Err(ReconcileError::InvalidConfig(_))
        ));
    }
}
