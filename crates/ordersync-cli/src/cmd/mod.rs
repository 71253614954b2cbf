pub mod check;
pub mod config;
pub mod init;
pub mod repair;
pub mod serve;
pub mod tracking;

use anyhow::Context;
use ordersync_core::config::Config;
use ordersync_core::Reconciler;
use std::path::Path;
use tokio_util::sync::CancellationToken;

pub(crate) fn load_config(path: &Path) -> anyhow::Result<Config> {
    Config::load(path).with_context(|| format!("failed to load {}", path.display()))
}

/// Load the config, start a runtime, connect both stores and run `f`
/// against the engine.
pub(crate) fn with_engine<F, Fut, T>(config_path: &Path, f: F) -> anyhow::Result<T>
where
    F: FnOnce(Reconciler) -> Fut,
    Fut: std::future::Future<Output = anyhow::Result<T>>,
{
    let config = load_config(config_path)?;
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let engine = Reconciler::from_config(&config)
            .await
            .context("failed to connect to stores")?;
        f(engine).await
    })
}

/// Token cancelled on the first Ctrl-C.
pub(crate) fn ctrl_c_token() -> CancellationToken {
    let token = CancellationToken::new();
    let guard = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("cancelling...");
            guard.cancel();
        }
    });
    token
}
