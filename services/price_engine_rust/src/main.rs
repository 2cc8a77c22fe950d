//! Price Engine Rust Service
//!
//! Maintains per-product best-price aggregates from the listing change
//! stream.
//!
//! This service:
//! - Rebuilds all aggregates from active listings on startup (bootstrap)
//! - Polls the change stream and applies inserts/updates/deletes in order
//! - Writes an aggregate row back only when min/max/count actually changed
//! - Leaves the cursor untouched on a failed tick so the delta is retried

mod config;

use anyhow::Result;
use bestprice_rust_core::db::{check_pool_health, create_pool};
use bestprice_rust_core::store::PgPriceStore;
use bestprice_rust_core::ChangeStreamConsumer;
use config::EngineConfig;
use dotenv::dotenv;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    info!("Starting Price Engine Rust Service...");

    let config = EngineConfig::from_env()?;

    let pool = create_pool(&config.database_url, &config.pool).await?;
    check_pool_health(&pool).await?;

    let store = Arc::new(PgPriceStore::new(pool));
    let mut consumer = ChangeStreamConsumer::new(store);

    // Shutdown channel, fired by ctrl-c and observed between ticks
    let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received shutdown signal");
                let _ = shutdown_tx.send(());
            }
            Err(err) => {
                error!("Unable to listen for shutdown signal: {}", err);
            }
        }
    });

    // The engine cannot serve without initial state
    let summary = consumer.bootstrap().await?;
    info!(
        "Engine ready: {} products from {} listings, cursor at {}",
        summary.products, summary.listings_loaded, summary.cursor
    );

    loop {
        if let Err(e) = consumer.process_updates().await {
            // Cursor was not advanced; the next tick retries the same delta
            error!("Change processing tick failed: {:#}", e);
        }

        tokio::select! {
            _ = tokio::time::sleep(config.poll_interval) => {}
            _ = &mut shutdown_rx => {
                break;
            }
        }
    }

    info!("Price engine stopped");
    Ok(())
}
