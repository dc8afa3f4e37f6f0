//! Error types for fetching upstream records and publishing them.

use thiserror::Error;

/// Failure of a single fetch from an upstream list endpoint.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The endpoint URL could not be built from the configured base URL
    #[error("invalid endpoint url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Connection, timeout or body transfer failure
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Upstream answered with a non-success status
    #[error("unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    /// Body was not a JSON array of the expected records
    #[error("malformed response body: {0}")]
    Decode(#[from] serde_json::Error),

    /// Failure reported by a non-HTTP fetcher
    #[error("{0}")]
    Other(String),
}

/// Failure to hand a single record to the message broker.
#[derive(Debug, Error)]
pub enum PublishError {
    /// Record could not be encoded as JSON
    #[error("failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),

    /// No usable connection or channel to the broker
    #[error("broker connection failed: {0:#}")]
    Connection(anyhow::Error),

    /// The broker rejected or dropped the publish
    #[error("publish to {queue} failed: {source}")]
    Publish {
        queue: String,
        #[source]
        source: lapin::Error,
    },

    /// The broker negatively acknowledged the message
    #[error("broker nacked message {message_id} on {queue}")]
    Nacked { queue: String, message_id: String },

    /// Failure reported by a non-AMQP publisher
    #[error("{0}")]
    Other(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_display() {
        let err = FetchError::Status {
            status: 503,
            url: "http://crm/customers".to_string(),
        };
        assert_eq!(err.to_string(), "unexpected status 503 from http://crm/customers");
    }

    #[test]
    fn test_decode_error_from_serde() {
        let err: FetchError = serde_json::from_str::<Vec<i64>>("{").unwrap_err().into();
        assert!(matches!(err, FetchError::Decode(_)));
    }

    #[test]
    fn test_nacked_error_display() {
        let err = PublishError::Nacked {
            queue: "customer_data".to_string(),
            message_id: "customer-1".to_string(),
        };
        assert_eq!(err.to_string(), "broker nacked message customer-1 on customer_data");
    }
}
