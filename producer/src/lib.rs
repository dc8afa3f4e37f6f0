//! Data producers - scheduled CRM and inventory publishers.
//!
//! This library provides the poll-retry-publish pipeline used by the
//! `data-producers` binary:
//! - `fetch`: HTTP list fetchers and the retry/backoff decorator
//! - `queue`: Record types and the RabbitMQ publisher
//! - `pipeline`: Fixed-delay fetch and publish loop
//! - `supervisor`: Wiring of the two pipelines and process shutdown
//!
//! ## Architecture
//!
//! ```text
//! CRM /customers      → crm pipeline       → customer_data queue
//! Inventory /products → inventory pipeline → inventory_data queue
//! ```

pub mod config;
pub mod error;
pub mod fetch;
pub mod pipeline;
pub mod queue;
pub mod supervisor;

// Re-export commonly used types
pub use config::Config;
pub use error::{FetchError, PublishError};
pub use fetch::{Fetcher, HttpFetcher, RetryPolicy, RetryingFetcher};
pub use pipeline::{Pipeline, PipelineConfig, PipelineStats, TickReport};
pub use queue::{
    Customer, Product, Publisher, Record, RecordPublisher, CUSTOMER_QUEUE, INVENTORY_QUEUE,
};
