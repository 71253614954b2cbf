//! Single-order corrections between the two stores.
//!
//! `repair` is the normal direction (order store into the tracking cache).
//! `sync_from_mirror` is the reverse path and only runs when asked for by
//! name. Every call leaves exactly one entry in the operation log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Result, Side, StoreError};
use crate::oplog::{LogKind, OperationLog};
use crate::store::{bounded, OrderStore, StoreResult, TrackingCache, TrackingRecord};
use crate::types::{MirrorStatus, OrderId, Status};

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RepairOutcome {
    Repaired {
        order_id: OrderId,
        status: Status,
        synced_at: DateTime<Utc>,
    },
    OrderNotFound {
        order_id: OrderId,
    },
    /// The cache saw a concurrent overwrite. Safe to retry.
    WriteConflict {
        order_id: OrderId,
    },
}

impl RepairOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RepairOutcome::Repaired { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncOutcome {
    Synced { order_id: OrderId, status: Status },
    /// Nothing mirrored, so there is nothing to copy back.
    MirrorAbsent { order_id: OrderId },
    OrderNotFound { order_id: OrderId },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CreateOutcome {
    Created { order_id: OrderId, status: Status },
    AlreadyTracked { order_id: OrderId },
    OrderNotFound { order_id: OrderId },
    WriteConflict { order_id: OrderId },
}

// ---------------------------------------------------------------------------
// RepairExecutor
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct RepairExecutor {
    orders: Arc<dyn OrderStore>,
    cache: Arc<dyn TrackingCache>,
    log: Arc<OperationLog>,
    timeout: Duration,
}

impl RepairExecutor {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        cache: Arc<dyn TrackingCache>,
        log: Arc<OperationLog>,
        timeout: Duration,
    ) -> Self {
        Self {
            orders,
            cache,
            log,
            timeout,
        }
    }

    /// Overwrite the mirror with the authoritative status for `id`.
    ///
    /// Does not look at the current mirror value, so running it twice is
    /// harmless and an absent mirror is filled in.
    pub async fn repair(&self, id: OrderId) -> Result<RepairOutcome> {
        let status = match self.authoritative(id).await {
            Ok(Some(status)) => status,
            Ok(None) => {
                self.log.append(
                    LogKind::Failure,
                    format!("Repair of order {id} failed: order not found"),
                );
                return Ok(RepairOutcome::OrderNotFound { order_id: id });
            }
            Err(e) => {
                self.log
                    .append(LogKind::Failure, format!("Repair of order {id} failed: {e}"));
                return Err(e);
            }
        };

        match self.write_mirror(id, status).await {
            Ok(record) => {
                self.log.append(
                    LogKind::Success,
                    format!("Order {id} repaired: mirror set to {status}"),
                );
                Ok(RepairOutcome::Repaired {
                    order_id: id,
                    status,
                    synced_at: record.synced_at,
                })
            }
            Err(StoreError::Conflict(_)) => {
                self.log.append(
                    LogKind::Failure,
                    format!("Repair of order {id} failed: concurrent write to the mirror"),
                );
                Ok(RepairOutcome::WriteConflict { order_id: id })
            }
            Err(e) => {
                let err = e.unavailable_on(Side::TrackingCache);
                self.log
                    .append(LogKind::Failure, format!("Repair of order {id} failed: {err}"));
                Err(err)
            }
        }
    }

    /// Copy the mirrored status back into the order store.
    ///
    /// An order missing from the order store is reported as not found even
    /// when the mirror has no entry either.
    pub async fn sync_from_mirror(&self, id: OrderId) -> Result<SyncOutcome> {
        match self.authoritative(id).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                self.log.append(
                    LogKind::Failure,
                    format!("Sync from mirror for order {id} failed: order not found"),
                );
                return Ok(SyncOutcome::OrderNotFound { order_id: id });
            }
            Err(e) => {
                self.log.append(
                    LogKind::Failure,
                    format!("Sync from mirror for order {id} failed: {e}"),
                );
                return Err(e);
            }
        }

        let mirrored = match bounded(self.timeout, self.cache.get_status(id)).await {
            Ok(m) => m,
            Err(e) => {
                let err = e.unavailable_on(Side::TrackingCache);
                self.log.append(
                    LogKind::Failure,
                    format!("Sync from mirror for order {id} failed: {err}"),
                );
                return Err(err);
            }
        };
        let MirrorStatus::Present(status) = mirrored else {
            self.log.append(
                LogKind::Failure,
                format!("Sync from mirror for order {id} failed: order is not tracked"),
            );
            return Ok(SyncOutcome::MirrorAbsent { order_id: id });
        };

        match bounded(self.timeout, self.orders.set_status(id, status)).await {
            Ok(()) => {
                self.log.append(
                    LogKind::Success,
                    format!("Order {id} synced from mirror: status set to {status}"),
                );
                Ok(SyncOutcome::Synced {
                    order_id: id,
                    status,
                })
            }
            Err(StoreError::NotFound(_)) => {
                self.log.append(
                    LogKind::Failure,
                    format!("Sync from mirror for order {id} failed: order not found"),
                );
                Ok(SyncOutcome::OrderNotFound { order_id: id })
            }
            Err(e) => {
                let err = e.unavailable_on(Side::OrderStore);
                self.log.append(
                    LogKind::Failure,
                    format!("Sync from mirror for order {id} failed: {err}"),
                );
                Err(err)
            }
        }
    }

    /// Seed a mirror entry from the authoritative status, leaving any
    /// existing entry untouched.
    pub async fn create_mirror(&self, id: OrderId) -> Result<CreateOutcome> {
        let status = match self.authoritative(id).await {
            Ok(Some(status)) => status,
            Ok(None) => {
                self.log.append(
                    LogKind::Failure,
                    format!("Tracking creation for order {id} failed: order not found"),
                );
                return Ok(CreateOutcome::OrderNotFound { order_id: id });
            }
            Err(e) => {
                self.log.append(
                    LogKind::Failure,
                    format!("Tracking creation for order {id} failed: {e}"),
                );
                return Err(e);
            }
        };

        match bounded(self.timeout, self.cache.insert_if_absent(id, status)).await {
            Ok(true) => {
                self.log.append(
                    LogKind::Success,
                    format!("Tracking created for order {id} with status {status}"),
                );
                Ok(CreateOutcome::Created {
                    order_id: id,
                    status,
                })
            }
            Ok(false) => {
                self.log
                    .append(LogKind::Info, format!("Order {id} is already tracked"));
                Ok(CreateOutcome::AlreadyTracked { order_id: id })
            }
            Err(StoreError::Conflict(_)) => {
                self.log.append(
                    LogKind::Failure,
                    format!("Tracking creation for order {id} failed: concurrent write"),
                );
                Ok(CreateOutcome::WriteConflict { order_id: id })
            }
            Err(e) => {
                let err = e.unavailable_on(Side::TrackingCache);
                self.log.append(
                    LogKind::Failure,
                    format!("Tracking creation for order {id} failed: {err}"),
                );
                Err(err)
            }
        }
    }

    /// Raw bounded mirror write, without logging. Bulk runs log once per run.
    pub(crate) async fn write_mirror(
        &self,
        id: OrderId,
        status: Status,
    ) -> StoreResult<TrackingRecord> {
        bounded(self.timeout, self.cache.set_status(id, status)).await
    }

    async fn authoritative(&self, id: OrderId) -> Result<Option<Status>> {
        match bounded(self.timeout, self.orders.get_status(id)).await {
            Ok(status) => Ok(Some(status)),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.unavailable_on(Side::OrderStore)),
        }
    }
}
