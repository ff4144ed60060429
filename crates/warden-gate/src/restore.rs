//! Restore orchestrator: reapply the security groups recorded at quarantine
//! time and clear the snapshot tag.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use warden_core::Config;

use crate::notifications::Notifier;
use crate::resources::{ResourceControl, ResourceError};

/// Source label for restores requested through a signed approval link.
pub const APPROVAL_SOURCE: &str = "email-approval-signed";

/// Restore request payload.
///
/// Accepts `instanceIds`/`InstanceIds` or a single `instanceId`/`InstanceId`,
/// in any mix. A non-empty list wins over a single id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreRequest {
    #[serde(rename = "instanceId", default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
    #[serde(rename = "InstanceId", default, skip_serializing)]
    pub legacy_instance_id: Option<String>,
    #[serde(rename = "instanceIds", default, skip_serializing_if = "Vec::is_empty")]
    pub instance_ids: Vec<String>,
    #[serde(rename = "InstanceIds", default, skip_serializing)]
    pub legacy_instance_ids: Vec<String>,
    #[serde(rename = "findingId", default, skip_serializing_if = "Option::is_none")]
    pub finding_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl RestoreRequest {
    /// Request produced by an authorized approval.
    pub fn from_approval(instance_id: &str, finding_id: &str) -> Self {
        Self {
            instance_id: Some(instance_id.to_string()),
            instance_ids: vec![instance_id.to_string()],
            finding_id: Some(finding_id.to_string()),
            source: Some(APPROVAL_SOURCE.to_string()),
            ..Self::default()
        }
    }

    /// Instances to restore. Empty means the payload named none.
    pub fn instance_ids(&self) -> Vec<String> {
        for list in [&self.instance_ids, &self.legacy_instance_ids] {
            let ids: Vec<String> = list
                .iter()
                .map(|id| id.trim())
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .collect();
            if !ids.is_empty() {
                return ids;
            }
        }
        [&self.instance_id, &self.legacy_instance_id]
            .into_iter()
            .filter_map(|id| id.as_deref().map(str::trim))
            .find(|id| !id.is_empty())
            .map(|id| vec![id.to_string()])
            .unwrap_or_default()
    }
}

/// Per-instance result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    Restored { groups: Vec<String> },
    /// No snapshot tag; nothing was changed.
    Skipped,
}

/// Batch result returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreSummary {
    pub event: String,
    pub restored: Vec<String>,
    pub skipped_no_original_sgs: Vec<String>,
    pub failed: Vec<String>,
    pub source: Option<String>,
    #[serde(rename = "findingId")]
    pub finding_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreSettings {
    pub status_tag_key: String,
    pub restored_value: String,
    pub original_groups_tag_key: String,
    pub restored_subject: String,
    pub skipped_subject: String,
    pub failed_subject: String,
}

impl RestoreSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            status_tag_key: config.quarantine.status_tag_key.clone(),
            restored_value: config.quarantine.restored_value.clone(),
            original_groups_tag_key: config.quarantine.original_groups_tag_key.clone(),
            restored_subject: config.notifications.restored_subject.clone(),
            skipped_subject: config.notifications.skipped_subject.clone(),
            failed_subject: config.notifications.failed_subject.clone(),
        }
    }
}

impl Default for RestoreSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

fn parse_groups(tag: &str) -> Vec<String> {
    tag.split(',')
        .map(str::trim)
        .filter(|g| !g.is_empty())
        .map(str::to_string)
        .collect()
}

pub struct RestoreOrchestrator {
    resources: Arc<dyn ResourceControl>,
    notifier: Arc<dyn Notifier>,
    settings: RestoreSettings,
}

impl RestoreOrchestrator {
    pub fn new(
        resources: Arc<dyn ResourceControl>,
        notifier: Arc<dyn Notifier>,
        settings: RestoreSettings,
    ) -> Self {
        Self {
            resources,
            notifier,
            settings,
        }
    }

    /// Restore every instance in the request. One instance failing does not
    /// stop the others.
    #[instrument(skip(self, request), fields(source = ?request.source, finding_id = ?request.finding_id))]
    pub async fn restore(&self, request: &RestoreRequest) -> RestoreSummary {
        let mut summary = RestoreSummary {
            event: "RestoreApproved".to_string(),
            restored: Vec::new(),
            skipped_no_original_sgs: Vec::new(),
            failed: Vec::new(),
            source: request.source.clone(),
            finding_id: request.finding_id.clone(),
        };

        for instance_id in request.instance_ids() {
            match self.restore_instance(&instance_id).await {
                Ok(RestoreOutcome::Restored { .. }) => summary.restored.push(instance_id),
                Ok(RestoreOutcome::Skipped) => summary.skipped_no_original_sgs.push(instance_id),
                Err(e) => {
                    error!(instance_id = %instance_id, error = %e, "Restore failed");
                    self.notify(
                        &self.settings.failed_subject,
                        &format!("Restore failed for {instance_id}: {e}"),
                    )
                    .await;
                    summary.failed.push(instance_id);
                }
            }
        }

        #[cfg(feature = "metrics")]
        {
            for _ in &summary.restored {
                warden_core::metrics::record_restore_result("restored");
            }
            for _ in &summary.skipped_no_original_sgs {
                warden_core::metrics::record_restore_result("skipped");
            }
            for _ in &summary.failed {
                warden_core::metrics::record_restore_result("failed");
            }
        }

        summary
    }

    #[instrument(skip_all, fields(instance_id = %instance_id))]
    pub async fn restore_instance(&self, instance_id: &str) -> Result<RestoreOutcome, ResourceError> {
        let description = self.resources.describe_instance(instance_id).await?;
        let key = &self.settings.original_groups_tag_key;

        let groups = description.tag(key).map(parse_groups).unwrap_or_default();
        if groups.is_empty() {
            warn!(tag = %key, "No original groups recorded, skipping");
            self.notify(
                &self.settings.skipped_subject,
                &format!("Restore skipped for {instance_id}: missing {key} tag"),
            )
            .await;
            return Ok(RestoreOutcome::Skipped);
        }

        for eni in &description.network_interfaces {
            self.resources.set_interface_groups(&eni.id, &groups).await?;
            info!(eni = %eni.id, groups = ?groups, "Interface restored");
        }

        self.resources
            .delete_tags(instance_id, std::slice::from_ref(key))
            .await?;
        let status = BTreeMap::from([(
            self.settings.status_tag_key.clone(),
            self.settings.restored_value.clone(),
        )]);
        self.resources.set_tags(instance_id, &status).await?;
        info!(
            tag = %self.settings.status_tag_key,
            value = %self.settings.restored_value,
            "Instance tags updated"
        );

        self.notify(
            &self.settings.restored_subject,
            &format!(
                "Instance {instance_id} restored to original security groups ({}) and tagged {}={}.",
                groups.join(", "),
                self.settings.status_tag_key,
                self.settings.restored_value,
            ),
        )
        .await;

        Ok(RestoreOutcome::Restored { groups })
    }

    /// Publish, logging instead of failing.
    async fn notify(&self, subject: &str, body: &str) {
        match self.notifier.publish(subject, body).await {
            Ok(message_id) => info!(%message_id, "Notification sent"),
            Err(e) => warn!(error = %e, "Notification publish failed"),
        }
    }
}

/// Errors handing a restore off for background execution.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Restore dispatcher unavailable: {0}")]
    Unavailable(String),
}

/// Fire-and-forget hand-off of a restore request.
pub trait RestoreDispatcher: Send + Sync {
    fn dispatch(&self, request: RestoreRequest) -> Result<(), DispatchError>;
}

/// Runs each restore as a task on the current tokio runtime.
pub struct SpawnDispatcher {
    orchestrator: Arc<RestoreOrchestrator>,
}

impl SpawnDispatcher {
    pub const fn new(orchestrator: Arc<RestoreOrchestrator>) -> Self {
        Self { orchestrator }
    }
}

impl RestoreDispatcher for SpawnDispatcher {
    fn dispatch(&self, request: RestoreRequest) -> Result<(), DispatchError> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| DispatchError::Unavailable(e.to_string()))?;
        let orchestrator = Arc::clone(&self.orchestrator);
        handle.spawn(async move {
            let summary = orchestrator.restore(&request).await;
            info!(
                restored = ?summary.restored,
                skipped = ?summary.skipped_no_original_sgs,
                failed = ?summary.failed,
                "Background restore finished"
            );
        });
        Ok(())
    }
}
