//! Record types published to the producer queues.
//!
//! This module defines the message formats for:
//! - `customer_data` queue: Customers fetched from the CRM
//! - `inventory_data` queue: Products fetched from the inventory service

use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Default queue name for CRM customer records.
pub const CUSTOMER_QUEUE: &str = "customer_data";

/// Default queue name for inventory product records.
pub const INVENTORY_QUEUE: &str = "inventory_data";

/// A record that can be fetched from an upstream list endpoint and
/// published as a single queue message.
pub trait Record: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Short lowercase name used in message ids and log fields.
    const KIND: &'static str;

    /// Upstream identifier of this record.
    fn id(&self) -> i64;

    /// Message id attached to the published message, e.g. `customer-1`.
    fn message_id(&self) -> String {
        format!("{}-{}", Self::KIND, self.id())
    }
}

// =============================================================================
// CRM Types (customer_data queue)
// =============================================================================

/// Customer as returned by `GET {crm}/customers`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    /// CRM identifier
    pub id: i64,
    /// Display name
    pub name: String,
    /// Contact email address
    pub email: String,
    /// Creation timestamp as reported by the CRM
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl Customer {
    /// Create a customer without a creation timestamp.
    pub fn new(id: i64, name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            email: email.into(),
            created_at: None,
        }
    }
}

impl Record for Customer {
    const KIND: &'static str = "customer";

    fn id(&self) -> i64 {
        self.id
    }
}

// =============================================================================
// Inventory Types (inventory_data queue)
// =============================================================================

/// Product as returned by `GET {inventory}/products`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    /// Inventory identifier
    pub id: i64,
    /// Stock keeping unit
    pub sku: String,
    /// Display name
    pub name: String,
    /// Units in stock
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stock: Option<i64>,
    /// Unit price
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
}

impl Product {
    /// Create a product without stock or price information.
    pub fn new(id: i64, sku: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id,
            sku: sku.into(),
            name: name.into(),
            stock: None,
            price: None,
        }
    }
}

impl Record for Product {
    const KIND: &'static str = "product";

    fn id(&self) -> i64 {
        self.id
    }
}
