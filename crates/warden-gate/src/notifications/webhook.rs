//! Webhook notification sink.
//!
//! Posts `{"subject": ..., "message": ...}` as JSON. If the response body is
//! JSON with a `messageId` string, that becomes the message id; otherwise a
//! fresh UUID is returned.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{Notifier, NotifyError};

#[derive(Debug, Serialize)]
struct WebhookMessage<'a> {
    subject: &'a str,
    message: &'a str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WebhookReceipt {
    #[serde(default)]
    message_id: Option<String>,
}

/// Client for a generic JSON webhook.
#[derive(Debug)]
pub struct WebhookNotifier {
    http: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Result<Self, NotifyError> {
        let url = url.into();
        if url.trim().is_empty() {
            return Err(NotifyError::Config("webhook URL is empty".into()));
        }
        // `Err` means a provider is already installed.
        let _ = rustls::crypto::ring::default_provider().install_default();
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| NotifyError::Config(e.to_string()))?;
        Ok(Self { http, url })
    }
}

fn message_id_from(body: &str) -> String {
    serde_json::from_str::<WebhookReceipt>(body)
        .ok()
        .and_then(|r| r.message_id)
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn publish(&self, subject: &str, body: &str) -> Result<String, NotifyError> {
        let response = self
            .http
            .post(&self.url)
            .json(&WebhookMessage {
                subject,
                message: body,
            })
            .send()
            .await
            .map_err(|e| NotifyError::Request(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message_id = message_id_from(&text);
            debug!(%message_id, "Webhook notification sent");
            Ok(message_id)
        } else {
            let status_code = status.as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read body>".to_string());
            warn!(status = status_code, body = %body, "Webhook returned error");
            Err(NotifyError::ApiError {
                status: status_code,
                body,
            })
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn empty_url_is_rejected() {
        let err = WebhookNotifier::new("").unwrap_err();
        assert!(matches!(err, NotifyError::Config(_)));
    }

    #[test]
    fn message_serializes_to_json() {
        let json = serde_json::to_value(WebhookMessage {
            subject: "S",
            message: "M",
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"subject": "S", "message": "M"}));
    }

    #[test]
    fn message_id_taken_from_receipt() {
        assert_eq!(message_id_from(r#"{"messageId":"abc-1"}"#), "abc-1");
    }

    #[test]
    fn message_id_generated_when_absent() {
        let id = message_id_from("accepted");
        assert_eq!(id.len(), 36);
        let id = message_id_from(r#"{"messageId":""}"#);
        assert_eq!(id.len(), 36);
    }

    #[tokio::test]
    async fn unreachable_sink_is_request_error() {
        let n = WebhookNotifier::new("http://127.0.0.1:9/hook").unwrap();
        let err = n.publish("s", "b").await.unwrap_err();
        assert!(matches!(err, NotifyError::Request(_)));
    }
}
