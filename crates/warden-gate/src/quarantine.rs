//! Quarantine orchestrator: snapshot an instance's security groups onto its
//! tags, then swap every interface onto the blocking group.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, instrument, warn};
use warden_core::Config;

use crate::resources::{ResourceControl, ResourceError};

/// Tag vocabulary and blocking group used by quarantine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuarantineSettings {
    pub blocking_group_id: String,
    pub status_tag_key: String,
    pub quarantined_value: String,
    pub original_groups_tag_key: String,
}

impl QuarantineSettings {
    pub fn from_config(config: &Config) -> warden_core::Result<Self> {
        config.validate_for_quarantine()?;
        let q = &config.quarantine;
        Ok(Self {
            blocking_group_id: config.blocking_group_id().unwrap_or_default().to_string(),
            status_tag_key: q.status_tag_key.clone(),
            quarantined_value: q.quarantined_value.clone(),
            original_groups_tag_key: q.original_groups_tag_key.clone(),
        })
    }
}

/// An interface moved onto the blocking group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IsolatedInterface {
    pub interface_id: String,
    pub original_groups: Vec<String>,
}

/// What a quarantine run changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuarantineReport {
    pub instance_id: String,
    pub interfaces: Vec<IsolatedInterface>,
}

pub struct QuarantineOrchestrator {
    resources: Arc<dyn ResourceControl>,
    settings: QuarantineSettings,
}

impl QuarantineOrchestrator {
    pub fn new(resources: Arc<dyn ResourceControl>, settings: QuarantineSettings) -> Self {
        Self {
            resources,
            settings,
        }
    }

    /// Isolate `instance_id`.
    ///
    /// The `OriginalSGs` snapshot lives on the instance, so with several
    /// interfaces carrying different groups the last interface's set wins.
    /// Any control-plane error aborts the run; interfaces already isolated
    /// stay isolated.
    #[instrument(skip_all, fields(instance_id = %instance_id))]
    pub async fn quarantine(&self, instance_id: &str) -> Result<QuarantineReport, ResourceError> {
        let description = self.resources.describe_instance(instance_id).await?;
        let blocking = vec![self.settings.blocking_group_id.clone()];
        let mut isolated = Vec::with_capacity(description.network_interfaces.len());

        for eni in &description.network_interfaces {
            info!(eni = %eni.id, groups = ?eni.groups, "Original security groups");

            let mut tags = BTreeMap::new();
            if eni.groups == blocking {
                // Already isolated by an earlier run; keep the existing snapshot.
                warn!(eni = %eni.id, "Interface already on blocking group, snapshot kept");
            } else {
                tags.insert(
                    self.settings.original_groups_tag_key.clone(),
                    eni.groups.join(","),
                );
            }
            tags.insert(
                self.settings.status_tag_key.clone(),
                self.settings.quarantined_value.clone(),
            );
            self.resources.set_tags(instance_id, &tags).await?;

            self.resources
                .set_interface_groups(&eni.id, &blocking)
                .await?;
            info!(eni = %eni.id, blocking_group = %self.settings.blocking_group_id, "Interface quarantined");

            isolated.push(IsolatedInterface {
                interface_id: eni.id.clone(),
                original_groups: eni.groups.clone(),
            });
        }

        if isolated.is_empty() {
            warn!("Instance has no network interfaces");
        }

        Ok(QuarantineReport {
            instance_id: instance_id.to_string(),
            interfaces: isolated,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::testing::MemoryResourceControl;

    fn settings() -> QuarantineSettings {
        QuarantineSettings {
            blocking_group_id: "sg-block".into(),
            status_tag_key: "IncidentStatus".into(),
            quarantined_value: "Quarantined".into(),
            original_groups_tag_key: "OriginalSGs".into(),
        }
    }

    #[test]
    fn settings_require_blocking_group() {
        let mut config = Config::default();
        assert!(QuarantineSettings::from_config(&config).is_err());
        config.quarantine.blocking_group_id = Some("sg-block".into());
        let s = QuarantineSettings::from_config(&config).unwrap();
        assert_eq!(s, settings());
    }

    #[tokio::test]
    async fn isolates_every_interface_and_tags_snapshot() {
        let resources = Arc::new(MemoryResourceControl::new());
        resources.add_instance("i-1", &[("eni-a", &["sg-1", "sg-2"])]);
        let q = QuarantineOrchestrator::new(resources.clone(), settings());

        let report = q.quarantine("i-1").await.unwrap();

        assert_eq!(report.interfaces.len(), 1);
        assert_eq!(report.interfaces[0].original_groups, vec!["sg-1", "sg-2"]);
        assert_eq!(resources.groups("eni-a"), vec!["sg-block"]);
        assert_eq!(resources.tag("i-1", "OriginalSGs").as_deref(), Some("sg-1,sg-2"));
        assert_eq!(
            resources.tag("i-1", "IncidentStatus").as_deref(),
            Some("Quarantined")
        );
    }

    #[tokio::test]
    async fn last_interface_snapshot_wins() {
        let resources = Arc::new(MemoryResourceControl::new());
        resources.add_instance("i-1", &[("eni-a", &["sg-1"]), ("eni-b", &["sg-2", "sg-3"])]);
        let q = QuarantineOrchestrator::new(resources.clone(), settings());

        q.quarantine("i-1").await.unwrap();

        assert_eq!(resources.groups("eni-a"), vec!["sg-block"]);
        assert_eq!(resources.groups("eni-b"), vec!["sg-block"]);
        assert_eq!(resources.tag("i-1", "OriginalSGs").as_deref(), Some("sg-2,sg-3"));
    }

    #[tokio::test]
    async fn second_run_keeps_original_snapshot() {
        let resources = Arc::new(MemoryResourceControl::new());
        resources.add_instance("i-1", &[("eni-a", &["sg-1"])]);
        let q = QuarantineOrchestrator::new(resources.clone(), settings());

        q.quarantine("i-1").await.unwrap();
        q.quarantine("i-1").await.unwrap();

        assert_eq!(resources.tag("i-1", "OriginalSGs").as_deref(), Some("sg-1"));
    }

    #[tokio::test]
    async fn unknown_instance_propagates() {
        let resources = Arc::new(MemoryResourceControl::new());
        let q = QuarantineOrchestrator::new(resources, settings());
        let err = q.quarantine("i-missing").await.unwrap_err();
        assert!(matches!(err, ResourceError::InstanceNotFound(_)));
    }

    #[tokio::test]
    async fn mutation_failure_aborts() {
        let resources = Arc::new(MemoryResourceControl::new());
        resources.add_instance("i-1", &[("eni-a", &["sg-1"])]);
        resources.fail_interface_updates(true);
        let q = QuarantineOrchestrator::new(resources.clone(), settings());

        assert!(q.quarantine("i-1").await.is_err());
        assert_eq!(resources.groups("eni-a"), vec!["sg-1"]);
    }
}
