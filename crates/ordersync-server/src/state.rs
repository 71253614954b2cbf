use ordersync_core::Reconciler;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub reconciler: Arc<Reconciler>,
    /// Cancelled on shutdown so in-flight bulk runs stop early.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(reconciler: Arc<Reconciler>) -> Self {
        Self {
            reconciler,
            shutdown: CancellationToken::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ordersync_core::store::{MemoryOrderStore, MemoryTrackingCache};
    use ordersync_core::ReconcileSettings;

    #[test]
    fn clones_share_the_shutdown_token() {
        let reconciler = Reconciler::new(
            Arc::new(MemoryOrderStore::new()),
            Arc::new(MemoryTrackingCache::new()),
            ReconcileSettings::default(),
        );
        let state = AppState::new(Arc::new(reconciler));
        let clone = state.clone();
        state.shutdown.cancel();
        assert!(clone.shutdown.is_cancelled());
    }
}
