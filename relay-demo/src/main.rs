use relay::adapters::InMemoryStoreFactory;
use relay::{
    attach_operation_with, cache, AdapterConfig, AttachConfig, CacheAdapter, CacheOptions, Event,
    Query,
};
use serde::{Deserialize, Serialize};
use shared::config::{CacheBackend, Config};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use storage_engine::SledStoreFactory;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct User {
    id: u32,
    name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ProfileRoute {
    user_id: u32,
}

const DEFAULT_STALE_AFTER: &str = "1s";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env first so RUST_LOG can come from it
    let dotenv = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match dotenv {
        Ok(_) => info!("Loaded environment variables from .env file"),
        Err(_) => info!("No .env file found, using system environment variables"),
    }

    let config = Config::from_env();
    info!(backend = config.backend.label(), "Starting relay demo");

    // ============================================
    // STEP 1: Build the cache adapter
    // ============================================
    let adapter = build_adapter(&config)?;

    // ============================================
    // STEP 2: Define the remote query
    // ============================================
    let remote_calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&remote_calls);
    let user_by_id: Query<u32, User> = Query::new("userById", move |id: u32| {
        let call = counter.fetch_add(1, Ordering::SeqCst) + 1;
        async move {
            // Simulated network latency
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(User {
                id,
                name: format!("user-{}-v{}", id, call),
            })
        }
    });

    // ============================================
    // STEP 3: Install the cache
    // ============================================
    let purge: Event<()> = Event::new("purge");
    let mut options = CacheOptions::from_config(&config)
        .with_adapter(adapter)
        .with_purge(purge.clone());
    if options.stale_after.is_none() {
        options = options.with_stale_after(DEFAULT_STALE_AFTER);
    }
    cache(&user_by_id, options)?;

    // ============================================
    // STEP 4: Exercise it
    // ============================================
    let user = user_by_id.start(1).await?;
    info!(?user, "First call goes to the remote");

    let user = user_by_id.start(1).await?;
    info!(?user, "Second call is a fresh cache hit");

    tokio::time::sleep(Duration::from_millis(1100)).await;
    let user = user_by_id.start(1).await?;
    info!(
        ?user,
        stale = user_by_id.stale().get(),
        "Stale hit was refreshed from the remote"
    );

    let profile = attach_operation_with(
        &user_by_id,
        AttachConfig::map_params(|route: ProfileRoute| route.user_id).named("profileRoute"),
    )?;
    let user = profile.start(ProfileRoute { user_id: 2 }).await?;
    info!(?user, "Attached query called through its own params");

    purge.emit(()).await?;
    let user = user_by_id.start(1).await?;
    info!(?user, "After purge the remote is called again");

    info!(
        remote_calls = remote_calls.load(Ordering::SeqCst),
        "Relay demo finished"
    );

    Ok(())
}

fn build_adapter(config: &Config) -> shared::Result<CacheAdapter> {
    let adapter_config = AdapterConfig::from_config(config)?;

    match &config.backend {
        CacheBackend::Memory => {
            CacheAdapter::from_factory(&InMemoryStoreFactory::default(), &adapter_config)
        }
        CacheBackend::Persistent(data_dir) => {
            info!(data_dir = %data_dir, "Using persistent cache adapter");
            let factory = SledStoreFactory::open(format!("{}/cache.sled", data_dir))?;
            CacheAdapter::from_factory(&factory, &adapter_config)
        }
        CacheBackend::Void => Ok(CacheAdapter::void()),
    }
}
