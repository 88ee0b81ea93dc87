//! Serve command - run the watch bridge until Ctrl-C.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::bridge::{ServerError, WatchServer, publisher_for};
use crate::config::Settings;
use crate::watcher::{NotifyEngine, WatchEngine};

/// Run the serve command with the native `notify` engine.
pub async fn run(config: Settings) -> Result<(), ServerError> {
    let engine = NotifyEngine::new()?;
    run_with_engine(config, Arc::new(engine)).await
}

/// Bind, publish the address, and serve until Ctrl-C.
pub async fn run_with_engine(
    config: Settings,
    engine: Arc<dyn WatchEngine>,
) -> Result<(), ServerError> {
    let shutdown = CancellationToken::new();

    crate::log_event!("serve", "starting", "engine {}", engine.name());

    let server = WatchServer::bind(&config.server, engine)
        .await?
        .with_shutdown(shutdown.clone());

    let publisher = publisher_for(&config.publish);
    server.publish(&config.publish.plugin, publisher.as_ref());

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                crate::log_event!("serve", "interrupted");
                signal_token.cancel();
            }
            Err(e) => tracing::warn!("[serve] cannot listen for Ctrl-C: {e}"),
        }
    });

    server.serve().await;
    crate::log_event!("serve", "stopped");

    Ok(())
}
