use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use ordersync_core::detector::Discrepancy;
use ordersync_core::oplog::OperationLogEntry;
use ordersync_core::{BulkOutcome, ConsistencyReport, OrderId, RepairOutcome, SyncOutcome};

use super::positive_id;
use crate::error::AppError;
use crate::state::AppState;

/// GET /api/reconcile/check: read-only consistency report over every order.
pub async fn check_all(State(app): State<AppState>) -> Result<Json<ConsistencyReport>, AppError> {
    let report = app.reconciler.check_all_with(&app.shutdown).await?;
    Ok(Json(report))
}

/// GET /api/reconcile/check/{id}: compare a single order.
pub async fn check_one(
    State(app): State<AppState>,
    Path(id): Path<OrderId>,
) -> Result<Json<Discrepancy>, AppError> {
    let id = positive_id(id)?;
    match app.reconciler.check_one(id).await? {
        Some(d) => Ok(Json(d)),
        None => Err(AppError::not_found(format!("order {id} not found"))),
    }
}

/// POST /api/reconcile/repair: forced resync of every order into the mirror.
///
/// Answers 207 when some orders could not be written.
pub async fn repair_all(State(app): State<AppState>) -> Result<Response, AppError> {
    let result = app.reconciler.repair_all_with(&app.shutdown).await?;
    let status = match result.outcome {
        BulkOutcome::Success => StatusCode::OK,
        BulkOutcome::PartialFailure => StatusCode::MULTI_STATUS,
    };
    Ok((status, Json(result)).into_response())
}

/// POST /api/reconcile/repair/{id}
pub async fn repair_one(
    State(app): State<AppState>,
    Path(id): Path<OrderId>,
) -> Result<Response, AppError> {
    let outcome = app.reconciler.repair(positive_id(id)?).await?;
    let status = match outcome {
        RepairOutcome::Repaired { .. } => StatusCode::OK,
        RepairOutcome::OrderNotFound { .. } => StatusCode::NOT_FOUND,
        RepairOutcome::WriteConflict { .. } => StatusCode::CONFLICT,
    };
    Ok((status, Json(outcome)).into_response())
}

/// POST /api/reconcile/sync-from-mirror/{id}: copy the mirrored status back
/// into the order store.
pub async fn sync_from_mirror(
    State(app): State<AppState>,
    Path(id): Path<OrderId>,
) -> Result<Response, AppError> {
    let outcome = app.reconciler.sync_from_mirror(positive_id(id)?).await?;
    let status = match outcome {
        SyncOutcome::Synced { .. } => StatusCode::OK,
        SyncOutcome::OrderNotFound { .. } => StatusCode::NOT_FOUND,
        SyncOutcome::MirrorAbsent { .. } => StatusCode::UNPROCESSABLE_ENTITY,
    };
    Ok((status, Json(outcome)).into_response())
}

/// GET /api/reconcile/log: operation log, most recent first.
pub async fn log(State(app): State<AppState>) -> Json<Vec<OperationLogEntry>> {
    Json(app.reconciler.log_entries())
}
