use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::types::OrderId;

/// Which collaborator a store error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    OrderStore,
    TrackingCache,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::OrderStore => f.write_str("order store"),
            Side::TrackingCache => f.write_str("tracking cache"),
        }
    }
}

/// Errors returned by an Order Store or Tracking Cache client.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("order {0} not found")]
    NotFound(OrderId),

    #[error("unreachable: {0}")]
    Unavailable(String),

    #[error("timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("concurrent write detected for order {0}")]
    Conflict(OrderId),

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Lift a collaborator failure into the engine's transport-level error.
    pub fn unavailable_on(self, side: Side) -> ReconcileError {
        ReconcileError::SourceUnavailable {
            side,
            reason: self.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("{side} unavailable: {reason}")]
    SourceUnavailable { side: Side, reason: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error("not configured: {} not found (run 'ordersync init')", .0.display())]
    NotConfigured(PathBuf),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid status '{0}'")]
    InvalidStatus(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ReconcileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_on_names_the_side() {
        let err = StoreError::Unavailable("connection refused".into())
            .unavailable_on(Side::TrackingCache);
        assert_eq!(
            err.to_string(),
            "tracking cache unavailable: unreachable: connection refused"
        );
    }

    #[test]
    fn timeout_renders_millis() {
        let err = StoreError::Timeout(Duration::from_millis(250));
        assert_eq!(err.to_string(), "timed out after 250ms");
    }
}
