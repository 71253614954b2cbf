pub mod health;
pub mod reconcile;
pub mod tracking;

use crate::error::AppError;
use ordersync_core::OrderId;

/// Order ids are positive; reject 0 before it reaches a store.
pub(crate) fn positive_id(id: OrderId) -> Result<OrderId, AppError> {
    if id == 0 {
        return Err(AppError::bad_request("order id must be a positive integer"));
    }
    Ok(id)
}
