use tracing::{error, info};

/// Resolves once Ctrl-C is received. Used to drain the server gracefully.
pub async fn shutdown_signal() {
    wait_for(tokio::signal::ctrl_c()).await
}

/// Never resolves when the listener fails, so a broken signal handler cannot stop the server.
async fn wait_for<F>(signal: F)
where
    F: std::future::Future<Output = std::io::Result<()>>,
{
    match signal.await {
        Ok(()) => info!("Shutdown requested"),
        Err(e) => {
            error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
