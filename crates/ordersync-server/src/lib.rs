pub mod error;
pub mod routes;
pub mod state;

use axum::routing::{get, post};
use axum::Router;
use ordersync_core::Reconciler;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Router over the reconciliation engine. Shared by `serve_on` and the
/// integration tests.
pub fn build_router(app_state: state::AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(routes::health::health))
        // Reconciliation
        .route("/api/reconcile/check", get(routes::reconcile::check_all))
        .route(
            "/api/reconcile/check/{id}",
            get(routes::reconcile::check_one),
        )
        .route("/api/reconcile/repair", post(routes::reconcile::repair_all))
        .route(
            "/api/reconcile/repair/{id}",
            post(routes::reconcile::repair_one),
        )
        .route(
            "/api/reconcile/sync-from-mirror/{id}",
            post(routes::reconcile::sync_from_mirror),
        )
        .route("/api/reconcile/log", get(routes::reconcile::log))
        // Tracking mirror
        .route("/api/tracking/stats", get(routes::tracking::stats))
        .route(
            "/api/tracking/{id}/create",
            post(routes::tracking::create),
        )
        .route(
            "/api/tracking/{id}/history",
            get(routes::tracking::history),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

/// Start the admin server on `host:port` and run until Ctrl-C.
pub async fn serve(reconciler: Arc<Reconciler>, host: &str, port: u16) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind((host, port)).await?;
    serve_on(reconciler, listener).await
}

/// Start the admin server on a pre-bound listener.
///
/// Lets the caller read the actual port first when binding to port 0.
pub async fn serve_on(
    reconciler: Arc<Reconciler>,
    listener: tokio::net::TcpListener,
) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    let app_state = state::AppState::new(reconciler);
    let shutdown = app_state.shutdown.clone();
    let app = build_router(app_state);

    tracing::info!("ordersync admin server listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if tokio::signal::ctrl_c().await.is_err() {
                // No signal handler available: run until the process is killed.
                std::future::pending::<()>().await;
            }
            tracing::info!("shutdown requested");
            shutdown.cancel();
        })
        .await?;
    Ok(())
}
