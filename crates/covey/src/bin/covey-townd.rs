//! Covey town server.
//!
//! Configured through `COVEY_*` environment variables (see
//! [`ServerConfig::from_env`]); log filtering through `RUST_LOG`.

use covey::prelude::*;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("covey=info,covey_town=info,covey_transport=info"));
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let config = ServerConfig::from_env()?;
    tracing::info!(
        bind = %config.bind_addr,
        idle_timeout = ?config.idle_timeout,
        max_occupancy = config.towns.max_occupancy,
        "starting covey-townd"
    );

    let server = CoveyServerBuilder::from_config(config).build().await?;

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down");
        }
    }

    Ok(())
}
