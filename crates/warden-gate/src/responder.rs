//! Incident responder: the detection-event pipeline.
//!
//! normalize → quarantine → issue approval link → notify

use std::sync::Arc;

use serde_json::Value;
use tracing::{error, info, instrument, warn};
use warden_core::{Finding, NormalizeError};

use crate::issuer::TokenIssuer;
use crate::notifications::{Notifier, NotifyError};
use crate::quarantine::QuarantineOrchestrator;
use crate::resources::ResourceError;

#[derive(Debug, thiserror::Error)]
pub enum ResponderError {
    #[error("Invalid detection event: {0}")]
    Normalize(#[from] NormalizeError),

    #[error("Quarantine failed: {0}")]
    Quarantine(#[from] ResourceError),

    #[error("Notification failed: {0}")]
    Notify(#[from] NotifyError),
}

/// Result of handling one detection event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncidentReport {
    pub finding: Finding,
    pub approval_link: Option<String>,
    pub message_id: String,
}

pub struct IncidentResponder {
    quarantine: Arc<QuarantineOrchestrator>,
    issuer: Option<Arc<TokenIssuer>>,
    notifier: Arc<dyn Notifier>,
    subject: String,
    sample_override: Option<String>,
}

impl IncidentResponder {
    /// `issuer` is `None` when no approval base URL is configured; the
    /// notification then carries no link.
    pub fn new(
        quarantine: Arc<QuarantineOrchestrator>,
        issuer: Option<Arc<TokenIssuer>>,
        notifier: Arc<dyn Notifier>,
        subject: impl Into<String>,
    ) -> Self {
        Self {
            quarantine,
            issuer,
            notifier,
            subject: subject.into(),
            sample_override: None,
        }
    }

    /// Instance substituted for synthetic sample findings.
    #[must_use]
    pub fn with_sample_override(mut self, instance_id: Option<String>) -> Self {
        self.sample_override = instance_id.filter(|id| !id.is_empty());
        self
    }

    #[instrument(skip_all)]
    pub async fn handle_event(&self, event: &Value) -> Result<IncidentReport, ResponderError> {
        let finding = Finding::from_event(event, self.sample_override.as_deref())?;
        info!(
            instance_id = %finding.instance_id,
            finding_id = %finding.finding_id,
            "Handling detection event"
        );

        let report = self.quarantine.quarantine(&finding.instance_id).await?;
        info!(
            instance_id = %report.instance_id,
            interfaces = report.interfaces.len(),
            "Instance quarantined"
        );

        let approval_link = self.approval_link(&finding).await;
        let action = match (&self.issuer, &approval_link) {
            (_, Some(link)) => format!(
                "\n\nAction:\nApprove restore (opens confirmation page):\n{link}\n"
            ),
            (Some(_), None) => "\n\nAction:\nApproval link unavailable due to an error.\n".to_string(),
            (None, None) => String::new(),
        };

        let body = format!(
            "Security finding alert:\nInstance {} quarantined.\nTitle: {}{action}",
            finding.instance_id, finding.finding_title
        );
        let message_id = self.notifier.publish(&self.subject, &body).await?;
        info!(%message_id, "Quarantine notification sent");

        Ok(IncidentReport {
            finding,
            approval_link,
            message_id,
        })
    }

    async fn approval_link(&self, finding: &Finding) -> Option<String> {
        let Some(issuer) = &self.issuer else {
            warn!("No approval base URL configured; notification will not include an approval link");
            return None;
        };
        match issuer
            .issue(&finding.instance_id, &finding.finding_id, &finding.finding_title)
            .await
        {
            Ok(issued) => Some(issued.link),
            Err(e) => {
                error!(error = %e, "Failed to create approval token/link");
                None
            }
        }
    }
}
