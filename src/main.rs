use anyhow::Result;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use edge_panel::auth::seed_password;
use edge_panel::shutdown::shutdown_signal;
use edge_panel::{routes, AppState, Config, FileKvStore, KvStore, MemoryKvStore, ReqwestFetch};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("edge_panel=debug,warp=info")),
        )
        .init();

    info!("Starting edge panel...");

    // Load configuration
    let config = Config::load()?;
    info!(
        "Configuration loaded: bind={} doh={} store={:?}",
        config.bind_address, config.doh_endpoint, config.store_path
    );

    let store: Arc<dyn KvStore> = match &config.store_path {
        Some(path) => Arc::new(FileKvStore::open(path).await?),
        None => {
            info!("No store_path configured, settings will not survive a restart");
            Arc::new(MemoryKvStore::new())
        }
    };

    if let Some(password) = &config.password {
        seed_password(store.as_ref(), password).await?;
    }

    let fetch = Arc::new(ReqwestFetch::new(config.http_timeout())?);
    let state = AppState::new(&config, store, fetch)?;

    let (addr, server) =
        warp::serve(routes(state)).try_bind_with_graceful_shutdown(config.bind_addr()?, shutdown_signal())?;
    info!("Panel listening on {}", addr);

    server.await;
    info!("Panel stopped");

    Ok(())
}
