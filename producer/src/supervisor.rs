//! Process supervisor wiring the CRM and inventory pipelines.
//!
//! This module:
//! 1. Builds the shared HTTP client and RabbitMQ publisher
//! 2. Creates one pipeline per upstream source
//! 3. Runs both pipelines concurrently on their own tasks
//! 4. Stops them between ticks on SIGINT/SIGTERM

use std::sync::Arc;

use anyhow::{Context, Result};
use reqwest::Client;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};

use crate::config::Config;
use crate::fetch::HttpFetcher;
use crate::pipeline::{Pipeline, PipelineConfig};
use crate::queue::{Customer, Product, Publisher, RecordPublisher};

/// Path of the CRM customer list, relative to the CRM base URL.
pub const CUSTOMERS_PATH: &str = "/customers";

/// Path of the inventory product list, relative to the inventory base URL.
pub const PRODUCTS_PATH: &str = "/products";

/// The two pipelines run by the producer process.
pub struct Pipelines {
    pub crm: Pipeline<Customer>,
    pub inventory: Pipeline<Product>,
}

/// Build the shared HTTP client used by both fetchers.
pub fn build_http_client(config: &Config) -> Result<Client> {
    Client::builder()
        .timeout(config.request_timeout())
        .gzip(true)
        .build()
        .context("Failed to create HTTP client")
}

/// Build both pipelines around shared clients.
pub fn build_pipelines<P>(config: &Config, client: Client, publisher: Arc<P>) -> Result<Pipelines>
where
    P: RecordPublisher<Customer> + RecordPublisher<Product> + 'static,
{
    let customers =
        HttpFetcher::<Customer>::new(client.clone(), &config.crm_base_url, CUSTOMERS_PATH)
            .context("Invalid CRM endpoint")?;
    let products = HttpFetcher::<Product>::new(client, &config.inventory_base_url, PRODUCTS_PATH)
        .context("Invalid inventory endpoint")?;

    let crm: Pipeline<Customer> = Pipeline::new(
        PipelineConfig {
            name: "crm".to_string(),
            destination: config.customer_queue.clone(),
            fixed_delay: config.crm_fetch_delay(),
            retry: config.retry_policy(),
        },
        Arc::new(customers),
        publisher.clone(),
    );

    let inventory: Pipeline<Product> = Pipeline::new(
        PipelineConfig {
            name: "inventory".to_string(),
            destination: config.inventory_queue.clone(),
            fixed_delay: config.inventory_fetch_delay(),
            retry: config.retry_policy(),
        },
        Arc::new(products),
        publisher,
    );

    Ok(Pipelines { crm, inventory })
}

/// Run both producers until the process is signalled.
pub async fn run(config: Config) -> Result<()> {
    let client = build_http_client(&config)?;

    info!(url_length = config.cloudamqp_url.len(), "rabbitmq_publisher_created");
    let publisher = Arc::new(Publisher::new(config.cloudamqp_url.clone()));

    let Pipelines { crm, inventory } = build_pipelines(&config, client, publisher.clone())?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handles = vec![crm.spawn(shutdown_rx.clone()), inventory.spawn(shutdown_rx)];

    info!("producers_ready");

    shutdown_signal().await;
    info!("producers_stopping");

    let _ = shutdown_tx.send(true);
    for result in futures::future::join_all(handles).await {
        if let Err(e) = result {
            error!(error = %e, "pipeline_task_failed");
        }
    }

    publisher.close().await;

    info!("producers_shutdown_complete");
    Ok(())
}

/// Resolve on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
