//! Data producers - periodically republishes CRM customers and inventory
//! products onto RabbitMQ queues.
//!
//! Each source is polled on its own fixed-delay schedule, fetched with
//! bounded retries, and every record is published as a persistent JSON
//! message.

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use producers::{supervisor, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    tracing::info!("producers_starting");

    // Load configuration from environment
    let config = Config::from_env();
    config.validate().context("Invalid configuration")?;
    tracing::info!(
        cloudamqp_url_set = !config.cloudamqp_url.is_empty(),
        crm_base_url = %config.crm_base_url,
        inventory_base_url = %config.inventory_base_url,
        customer_queue = %config.customer_queue,
        inventory_queue = %config.inventory_queue,
        crm_fetch_delay_ms = config.crm_fetch_delay_ms,
        inventory_fetch_delay_ms = config.inventory_fetch_delay_ms,
        fetch_max_attempts = config.fetch_max_attempts,
        "config_loaded"
    );

    supervisor::run(config).await?;

    Ok(())
}
