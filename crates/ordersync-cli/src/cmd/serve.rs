use super::load_config;
use anyhow::Context;
use ordersync_core::Reconciler;
use std::path::Path;
use std::sync::Arc;

pub fn run(config_path: &Path, port: Option<u16>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    for w in config.validate() {
        tracing::warn!("config: {}", w.message);
    }
    let port = port.unwrap_or(config.server.port);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let engine = Reconciler::from_config(&config)
            .await
            .context("failed to connect to stores")?;
        tracing::info!(
            order_store = config.order_store.kind(),
            tracking_cache = config.tracking_cache.kind(),
            "stores connected"
        );
        ordersync_server::serve(Arc::new(engine), &config.server.host, port).await
    })
}
