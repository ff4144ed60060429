//! Configuration resolution for Warden.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (~/.config/warden/settings.json)
//! 3. Explicit config file (`--config`)
//! 4. Environment variables (`WARDEN_*`)
//! 5. CLI arguments (highest priority, applied by the binary)
//!
//! Files are merged as JSON objects before deserialization, so a file only
//! needs to mention the keys it overrides.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Complete Warden configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub quarantine: QuarantineConfig,
    #[serde(default)]
    pub approval: ApprovalConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub resource_control: ResourceControlConfig,
}

/// Isolation settings and the tag vocabulary written onto instances.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct QuarantineConfig {
    /// Security group that replaces every interface's groups on quarantine.
    pub blocking_group_id: Option<String>,
    /// Tag key carrying the incident status.
    pub status_tag_key: String,
    /// Status value written on quarantine.
    pub quarantined_value: String,
    /// Status value written on restore.
    pub restored_value: String,
    /// Tag key carrying the comma-joined pre-quarantine groups.
    pub original_groups_tag_key: String,
    /// Real instance substituted for synthetic sample findings.
    pub sample_instance_override: Option<String>,
}

impl Default for QuarantineConfig {
    fn default() -> Self {
        Self {
            blocking_group_id: None,
            status_tag_key: "IncidentStatus".to_string(),
            quarantined_value: "Quarantined".to_string(),
            restored_value: "Healthy".to_string(),
            original_groups_tag_key: "OriginalSGs".to_string(),
            sample_instance_override: None,
        }
    }
}

/// Approval link and token settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ApprovalConfig {
    /// Public URL of the approval endpoint. Without it no link is issued.
    pub base_url: Option<String>,
    /// Token lifetime in minutes. Negative values behave as zero.
    pub ttl_minutes: i64,
    /// Reference handed to the secret store (a file path for the file store).
    pub secret_ref: Option<String>,
    /// Token database location.
    pub database_path: Option<PathBuf>,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            ttl_minutes: 60,
            secret_ref: None,
            database_path: None,
        }
    }
}

impl ApprovalConfig {
    /// Token lifetime in seconds, clamped at zero.
    pub const fn ttl_secs(&self) -> i64 {
        let minutes = if self.ttl_minutes < 0 {
            0
        } else {
            self.ttl_minutes
        };
        minutes.saturating_mul(60)
    }
}

/// Notification channel settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NotificationConfig {
    /// Webhook receiving `{subject, message}` JSON. Logs only when unset.
    pub webhook_url: Option<String>,
    pub quarantined_subject: String,
    pub restored_subject: String,
    pub skipped_subject: String,
    pub failed_subject: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            quarantined_subject: "[Warden] Instance quarantined".to_string(),
            restored_subject: "[Warden] Instance restored".to_string(),
            skipped_subject: "[Warden] Restore skipped".to_string(),
            failed_subject: "[Warden] Restore failed".to_string(),
        }
    }
}

/// Resource-control API settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct ResourceControlConfig {
    pub endpoint: Option<String>,
    pub api_token: Option<String>,
}

impl Config {
    /// Check the settings the quarantine path cannot run without.
    pub fn validate_for_quarantine(&self) -> Result<()> {
        if is_blank(self.quarantine.blocking_group_id.as_deref()) {
            return Err(Error::Config("quarantine.blocking_group_id is not set".into()));
        }
        Ok(())
    }

    /// Blocking group, if configured and non-empty.
    pub fn blocking_group_id(&self) -> Option<&str> {
        self.quarantine
            .blocking_group_id
            .as_deref()
            .filter(|s| !s.trim().is_empty())
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.is_none_or(|v| v.trim().is_empty())
}

/// Load configuration with hierarchical resolution.
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let mut merged = serde_json::to_value(Config::default())?;

    if let Some(global_path) = global_config_path() {
        if global_path.exists() {
            merge_json(&mut merged, load_config_file(&global_path)?);
        }
    }

    if let Some(path) = explicit {
        merge_json(&mut merged, load_config_file(path)?);
    }

    let mut config: Config = serde_json::from_value(merged)?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .ok()
            .map(|h| PathBuf::from(h).join(".warden").join("settings.json"))
    }
    #[cfg(target_os = "macos")]
    {
        std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join("Library/Application Support/warden/settings.json"))
    }
    #[cfg(target_os = "linux")]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| std::env::var("HOME").ok().map(|h| PathBuf::from(h).join(".config")))
            .map(|p| p.join("warden").join("settings.json"))
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
    {
        None
    }
}

/// Default location of the approval-token database.
pub fn default_database_path() -> Option<PathBuf> {
    global_config_path().and_then(|p| p.parent().map(|dir| dir.join("tokens.db")))
}

fn load_config_file(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    let value: Value = serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })?;
    if !value.is_object() {
        return Err(Error::Config(format!(
            "Config file {} must contain a JSON object",
            path.display()
        )));
    }
    Ok(value)
}

/// Recursively overlay `overlay` onto `base`; objects merge, everything else replaces.
fn merge_json(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(slot) => merge_json(slot, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

/// Apply `WARDEN_*` overrides read through `lookup`.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(val) = lookup("WARDEN_BLOCKING_SG_ID") {
        config.quarantine.blocking_group_id = Some(val);
    }
    if let Some(val) = lookup("WARDEN_INSTANCE_TAG_KEY") {
        config.quarantine.status_tag_key = val;
    }
    if let Some(val) = lookup("WARDEN_QUARANTINED_VALUE") {
        config.quarantine.quarantined_value = val;
    }
    if let Some(val) = lookup("WARDEN_RESTORED_VALUE") {
        config.quarantine.restored_value = val;
    }
    if let Some(val) = lookup("WARDEN_SAMPLE_INSTANCE_ID") {
        config.quarantine.sample_instance_override = Some(val);
    }
    if let Some(val) = lookup("WARDEN_APPROVAL_BASE_URL") {
        config.approval.base_url = Some(val);
    }
    if let Some(val) = lookup("WARDEN_EXPIRE_MINUTES") {
        if let Ok(n) = val.trim().parse() {
            config.approval.ttl_minutes = n;
        }
    }
    if let Some(val) = lookup("WARDEN_APPROVAL_SECRET_REF") {
        config.approval.secret_ref = Some(val);
    }
    if let Some(val) = lookup("WARDEN_TOKENS_DB") {
        config.approval.database_path = Some(PathBuf::from(val));
    }
    if let Some(val) = lookup("WARDEN_NOTIFY_WEBHOOK_URL") {
        config.notifications.webhook_url = Some(val);
    }
    if let Some(val) = lookup("WARDEN_RESOURCE_ENDPOINT") {
        config.resource_control.endpoint = Some(val);
    }
    if let Some(val) = lookup("WARDEN_RESOURCE_TOKEN") {
        config.resource_control.api_token = Some(val);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_config_has_60_minute_ttl() {
        let config = Config::default();
        assert_eq!(config.approval.ttl_minutes, 60);
        assert_eq!(config.approval.ttl_secs(), 3600);
    }

    #[test]
    fn negative_ttl_clamps_to_zero() {
        let approval = ApprovalConfig {
            ttl_minutes: -5,
            ..ApprovalConfig::default()
        };
        assert_eq!(approval.ttl_secs(), 0);
    }

    #[test]
    fn default_tag_vocabulary() {
        let q = QuarantineConfig::default();
        assert_eq!(q.status_tag_key, "IncidentStatus");
        assert_eq!(q.quarantined_value, "Quarantined");
        assert_eq!(q.restored_value, "Healthy");
        assert_eq!(q.original_groups_tag_key, "OriginalSGs");
    }

    #[test]
    fn missing_blocking_group_is_config_error() {
        let config = Config::default();
        assert!(matches!(config.validate_for_quarantine(), Err(Error::Config(_))));

        let mut config = Config::default();
        config.quarantine.blocking_group_id = Some("  ".into());
        assert!(config.validate_for_quarantine().is_err());

        config.quarantine.blocking_group_id = Some("sg-block".into());
        assert!(config.validate_for_quarantine().is_ok());
        assert_eq!(config.blocking_group_id(), Some("sg-block"));
    }

    #[test]
    fn partial_file_overrides_only_named_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"approval": {"ttl_minutes": 15}, "quarantine": {"blocking_group_id": "sg-1"}}"#,
        )
        .unwrap();

        let mut merged = serde_json::to_value(Config::default()).unwrap();
        merge_json(&mut merged, load_config_file(&path).unwrap());
        let config: Config = serde_json::from_value(merged).unwrap();

        assert_eq!(config.approval.ttl_minutes, 15);
        assert_eq!(config.quarantine.blocking_group_id.as_deref(), Some("sg-1"));
        assert_eq!(config.quarantine.status_tag_key, "IncidentStatus");
    }

    #[test]
    fn non_object_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "[1, 2]").unwrap();
        assert!(matches!(load_config_file(&path), Err(Error::Config(_))));
    }

    #[test]
    fn env_overrides_apply() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("WARDEN_BLOCKING_SG_ID", "sg-env"),
            ("WARDEN_EXPIRE_MINUTES", "-3"),
            ("WARDEN_APPROVAL_SECRET_REF", "/run/secrets/approval"),
            ("WARDEN_INSTANCE_TAG_KEY", "Status"),
        ]);
        let mut config = Config::default();
        apply_env_overrides(&mut config, |k| env.get(k).map(|v| (*v).to_string()));

        assert_eq!(config.quarantine.blocking_group_id.as_deref(), Some("sg-env"));
        assert_eq!(config.approval.ttl_minutes, -3);
        assert_eq!(config.approval.ttl_secs(), 0);
        assert_eq!(
            config.approval.secret_ref.as_deref(),
            Some("/run/secrets/approval")
        );
        assert_eq!(config.quarantine.status_tag_key, "Status");
    }

    #[test]
    fn unparsable_ttl_env_is_ignored() {
        let mut config = Config::default();
        apply_env_overrides(&mut config, |k| {
            (k == "WARDEN_EXPIRE_MINUTES").then(|| "soon".to_string())
        });
        assert_eq!(config.approval.ttl_minutes, 60);
    }
}
