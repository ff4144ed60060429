//! Resource-control capability: instance description, interface security
//! groups and instance tags.

mod http;

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use http::{HttpResourceConfig, HttpResourceControl};

/// One network interface and its current security groups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInterface {
    pub id: String,
    pub groups: Vec<String>,
}

/// What the control plane reports about an instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceDescription {
    pub instance_id: String,
    #[serde(default)]
    pub network_interfaces: Vec<NetworkInterface>,
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

impl InstanceDescription {
    /// Value of a tag, treating an empty value as absent.
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str).filter(|v| !v.is_empty())
    }
}

/// Resource-control errors.
#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    #[error("Instance not found: {0}")]
    InstanceNotFound(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Resource API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Resource control failure: {0}")]
    Other(String),
}

/// Mutations and lookups against the compute control plane.
#[async_trait]
pub trait ResourceControl: Send + Sync {
    async fn describe_instance(&self, instance_id: &str) -> Result<InstanceDescription, ResourceError>;

    /// Replace the interface's security groups with exactly `group_ids`.
    async fn set_interface_groups(
        &self,
        interface_id: &str,
        group_ids: &[String],
    ) -> Result<(), ResourceError>;

    /// Create or overwrite tags on an instance.
    async fn set_tags(
        &self,
        instance_id: &str,
        tags: &BTreeMap<String, String>,
    ) -> Result<(), ResourceError>;

    async fn delete_tags(&self, instance_id: &str, keys: &[String]) -> Result<(), ResourceError>;
}
