//! Outbound operator notifications.
//!
//! - [`WebhookNotifier`] posts each message to an HTTP endpoint
//! - [`LogNotifier`] writes messages to the log when no sink is configured

mod webhook;

use async_trait::async_trait;
use tracing::info;

pub use webhook::WebhookNotifier;

/// Errors that can occur while publishing a notification.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// HTTP request to the sink failed.
    #[error("Notification request error: {0}")]
    Request(String),

    /// The sink returned a non-success status code.
    #[error("Notification sink error (status {status}): {body}")]
    ApiError {
        /// HTTP status code returned by the sink.
        status: u16,
        /// Response body from the sink.
        body: String,
    },

    /// Sink misconfiguration.
    #[error("Notification configuration error: {0}")]
    Config(String),
}

/// A fire-and-forget message sink.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Publish a message; returns the sink's message id.
    async fn publish(&self, subject: &str, body: &str) -> Result<String, NotifyError>;
}

/// Notifier that only logs. Used when no webhook is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn publish(&self, subject: &str, body: &str) -> Result<String, NotifyError> {
        let message_id = uuid::Uuid::new_v4().to_string();
        info!(%message_id, subject, body, "Notification");
        Ok(message_id)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn log_notifier_returns_fresh_ids() {
        let n = LogNotifier;
        let a = n.publish("s", "b").await.unwrap();
        let b = n.publish("s", "b").await.unwrap();
        assert_ne!(a, b);
        assert_eq!(a.len(), 36);
    }
}
