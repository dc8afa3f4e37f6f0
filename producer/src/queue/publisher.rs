//! Async RabbitMQ publisher for producer records.
//!
//! The publisher holds one lazily-opened connection and channel that are
//! shared by every pipeline, reconnecting when the channel drops.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use lapin::{
    options::{BasicPublishOptions, ConfirmSelectOptions},
    BasicProperties, Channel, Connection, ConnectionProperties,
};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::types::Record;
use crate::error::PublishError;

/// Destination-addressed publishing of single records.
///
/// Implementations return once the messaging client has accepted the
/// record; they never retry.
#[async_trait]
pub trait RecordPublisher<T>: Send + Sync {
    async fn publish(&self, destination: &str, record: &T) -> Result<(), PublishError>;
}

/// Async RabbitMQ publisher with connection management.
///
/// Cloning is cheap; all clones share the same connection.
#[derive(Clone)]
pub struct Publisher {
    inner: Arc<PublisherInner>,
}

struct PublisherInner {
    url: String,
    connection: RwLock<Option<Connection>>,
    channel: RwLock<Option<Channel>>,
}

/// Properties for a persistent JSON message.
fn message_properties(message_id: &str) -> BasicProperties {
    BasicProperties::default()
        .with_delivery_mode(2) // Persistent
        .with_content_type("application/json".into())
        .with_message_id(message_id.into())
}

impl Publisher {
    /// Create a new publisher with the given RabbitMQ URL.
    ///
    /// No connection is made until the first publish.
    pub fn new(url: String) -> Self {
        Self {
            inner: Arc::new(PublisherInner {
                url,
                connection: RwLock::new(None),
                channel: RwLock::new(None),
            }),
        }
    }

    /// Ensure we have a valid connection and a confirm-mode channel.
    async fn ensure_connected(&self) -> Result<Channel> {
        {
            let channel = self.inner.channel.read().await;
            if let Some(ch) = channel.as_ref() {
                if ch.status().connected() {
                    return Ok(ch.clone());
                }
            }
        }

        let mut connection = self.inner.connection.write().await;
        let mut channel = self.inner.channel.write().await;

        // Another task may have reconnected while we waited for the lock
        if let Some(ch) = channel.as_ref() {
            if ch.status().connected() {
                return Ok(ch.clone());
            }
        }

        // Release the stale pair before opening a new one
        release(channel.take(), connection.take(), "Reconnecting").await;

        info!("rabbitmq_publisher_connecting");

        let conn = Connection::connect(&self.inner.url, ConnectionProperties::default())
            .await
            .context("Failed to connect to RabbitMQ")?;

        info!("rabbitmq_publisher_connected");

        let ch = conn
            .create_channel()
            .await
            .context("Failed to create channel")?;

        ch.confirm_select(ConfirmSelectOptions::default())
            .await
            .context("Failed to enable publisher confirms")?;

        info!("rabbitmq_publisher_channel_ready");

        *connection = Some(conn);
        *channel = Some(ch.clone());

        Ok(ch)
    }

    /// Publish one record as a persistent JSON message to `queue`.
    ///
    /// Uses the default exchange, so `queue` is the routing key.
    pub async fn publish_record<T: Record>(
        &self,
        queue: &str,
        record: &T,
    ) -> Result<(), PublishError> {
        let body = serde_json::to_vec(record)?;
        let message_id = record.message_id();

        let channel = self
            .ensure_connected()
            .await
            .map_err(PublishError::Connection)?;

        let confirmation = channel
            .basic_publish(
                "",
                queue,
                BasicPublishOptions::default(),
                &body,
                message_properties(&message_id),
            )
            .await
            .map_err(|source| PublishError::Publish {
                queue: queue.to_string(),
                source,
            })?
            .await
            .map_err(|source| PublishError::Publish {
                queue: queue.to_string(),
                source,
            })?;

        if confirmation.is_nack() {
            return Err(PublishError::Nacked {
                queue: queue.to_string(),
                message_id,
            });
        }

        debug!(
            queue = queue,
            message_id = %message_id,
            body_length = body.len(),
            "rabbitmq_record_published"
        );

        Ok(())
    }

    /// Close the connection gracefully.
    pub async fn close(&self) {
        let mut connection = self.inner.connection.write().await;
        let mut channel = self.inner.channel.write().await;

        release(channel.take(), connection.take(), "Normal shutdown").await;

        info!("rabbitmq_publisher_closed");
    }
}

/// Close whichever of `channel` and `connection` is still open.
async fn release(channel: Option<Channel>, connection: Option<Connection>, reason: &str) {
    if let Some(ch) = channel {
        if ch.status().connected() {
            if let Err(e) = ch.close(200, reason).await {
                warn!(error = %e, "rabbitmq_channel_close_error");
            }
        }
    }

    if let Some(conn) = connection {
        if conn.status().connected() {
            if let Err(e) = conn.close(200, reason).await {
                warn!(error = %e, "rabbitmq_connection_close_error");
            }
        }
    }
}

#[async_trait]
impl<T: Record> RecordPublisher<T> for Publisher {
    async fn publish(&self, destination: &str, record: &T) -> Result<(), PublishError> {
        self.publish_record(destination, record).await
    }
}
