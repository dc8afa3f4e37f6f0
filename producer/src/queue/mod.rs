//! Queue module for RabbitMQ operations.
//!
//! This module provides:
//! - Record types for the customer and inventory queues
//! - Async publisher for enqueueing records
//!
//! ## Architecture
//!
//! ```text
//! CRM /customers      → customer_data queue
//! Inventory /products → inventory_data queue
//! ```

pub mod publisher;
pub mod types;

pub use publisher::{Publisher, RecordPublisher};
pub use types::{Customer, Product, Record, CUSTOMER_QUEUE, INVENTORY_QUEUE};
