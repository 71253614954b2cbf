use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use ordersync_core::store::{HistoryEntry, MirrorStats};
use ordersync_core::{CreateOutcome, OrderId};

use super::positive_id;
use crate::error::AppError;
use crate::state::AppState;

/// POST /api/tracking/{id}/create: seed a mirror entry if none exists.
pub async fn create(
    State(app): State<AppState>,
    Path(id): Path<OrderId>,
) -> Result<Response, AppError> {
    let outcome = app.reconciler.create_mirror(positive_id(id)?).await?;
    let status = match outcome {
        CreateOutcome::Created { .. } => StatusCode::CREATED,
        CreateOutcome::AlreadyTracked { .. } => StatusCode::OK,
        CreateOutcome::OrderNotFound { .. } => StatusCode::NOT_FOUND,
        CreateOutcome::WriteConflict { .. } => StatusCode::CONFLICT,
    };
    Ok((status, Json(outcome)).into_response())
}

/// GET /api/tracking/{id}/history: mirror status changes, newest first.
pub async fn history(
    State(app): State<AppState>,
    Path(id): Path<OrderId>,
) -> Result<Json<Vec<HistoryEntry>>, AppError> {
    let entries = app.reconciler.history(positive_id(id)?).await?;
    Ok(Json(entries))
}

/// GET /api/tracking/stats
pub async fn stats(State(app): State<AppState>) -> Result<Json<MirrorStats>, AppError> {
    Ok(Json(app.reconciler.mirror_stats().await?))
}
