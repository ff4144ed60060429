//! Detection-event normalization.
//!
//! Upstream detectors deliver findings in two shapes: a single finding under
//! `detail` (camelCase keys) or a batch under `detail.findings[]`
//! (PascalCase keys). Everything downstream only sees [`Finding`].

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

/// Synthetic instance ids emitted by detector sample findings.
static SAMPLE_INSTANCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^i-9{8,17}$").expect("static regex is valid"));

/// A normalized detection record identifying the affected instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub instance_id: String,
    pub finding_id: String,
    pub finding_title: String,
}

/// Reasons a raw event cannot be turned into a [`Finding`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("event is not a JSON object")]
    NotAnObject,

    #[error("event carries an empty findings list")]
    EmptyFindings,

    #[error("no instanceId found in finding")]
    MissingInstanceId,
}

/// Returns true for placeholder ids such as `i-99999999`.
pub fn is_sample_instance_id(instance_id: &str) -> bool {
    SAMPLE_INSTANCE_RE.is_match(instance_id)
}

impl Finding {
    /// Extract a finding from a raw detection event.
    ///
    /// `sample_override` replaces synthetic sample instance ids so that
    /// sample findings exercise a real test instance.
    pub fn from_event(event: &Value, sample_override: Option<&str>) -> Result<Self, NormalizeError> {
        let event = event.as_object().ok_or(NormalizeError::NotAnObject)?;

        let empty = Map::new();
        let detail = event
            .get("detail")
            .and_then(Value::as_object)
            .unwrap_or(&empty);

        let finding = match detail.get("findings") {
            Some(findings) => findings
                .as_array()
                .and_then(|list| list.first())
                .and_then(Value::as_object)
                .ok_or(NormalizeError::EmptyFindings)?,
            None => detail,
        };

        let instance_details = nested(finding, "resource", "instanceDetails")
            .or_else(|| nested(finding, "Resource", "InstanceDetails"));

        let mut instance_id = instance_details
            .and_then(|d| first_str(d, &["instanceId", "InstanceId"]))
            .filter(|id| !id.is_empty())
            .ok_or(NormalizeError::MissingInstanceId)?
            .to_string();

        if is_sample_instance_id(&instance_id) {
            match sample_override {
                Some(replacement) if !replacement.is_empty() => {
                    warn!(
                        sample = %instance_id,
                        replacement,
                        "Sample finding detected, substituting test instance"
                    );
                    instance_id = replacement.to_string();
                }
                _ => {
                    warn!(
                        sample = %instance_id,
                        "Sample finding detected but no override instance configured"
                    );
                }
            }
        }

        let finding_id = first_str(finding, &["id", "Id", "findingId", "FindingId"])
            .unwrap_or_default()
            .to_string();
        let finding_title = first_str(finding, &["title", "Title"])
            .unwrap_or_default()
            .to_string();

        Ok(Self {
            instance_id,
            finding_id,
            finding_title,
        })
    }
}

fn nested<'a>(obj: &'a Map<String, Value>, outer: &str, inner: &str) -> Option<&'a Map<String, Value>> {
    obj.get(outer)?.as_object()?.get(inner)?.as_object()
}

fn first_str<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|key| obj.get(*key).and_then(Value::as_str).filter(|s| !s.is_empty()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn single_finding_shape() {
        let event = json!({
            "detail": {
                "id": "f-123",
                "title": "Crypto mining detected",
                "resource": {"instanceDetails": {"instanceId": "i-0abc"}}
            }
        });
        let finding = Finding::from_event(&event, None).unwrap();
        assert_eq!(finding.instance_id, "i-0abc");
        assert_eq!(finding.finding_id, "f-123");
        assert_eq!(finding.finding_title, "Crypto mining detected");
    }

    #[test]
    fn batched_findings_shape() {
        let event = json!({
            "detail": {
                "findings": [{
                    "Id": "arn:finding/1",
                    "Title": "Port probe",
                    "Resource": {"InstanceDetails": {"InstanceId": "i-0def"}}
                }, {
                    "Id": "ignored"
                }]
            }
        });
        let finding = Finding::from_event(&event, None).unwrap();
        assert_eq!(finding.instance_id, "i-0def");
        assert_eq!(finding.finding_id, "arn:finding/1");
        assert_eq!(finding.finding_title, "Port probe");
    }

    #[test]
    fn finding_id_falls_back_through_aliases() {
        let event = json!({
            "detail": {
                "FindingId": "legacy-id",
                "resource": {"instanceDetails": {"InstanceId": "i-1"}}
            }
        });
        let finding = Finding::from_event(&event, None).unwrap();
        assert_eq!(finding.finding_id, "legacy-id");
        assert_eq!(finding.finding_title, "");
    }

    #[test]
    fn missing_instance_is_an_error() {
        let event = json!({"detail": {"id": "f-1", "resource": {}}});
        assert_eq!(
            Finding::from_event(&event, None),
            Err(NormalizeError::MissingInstanceId)
        );
        assert_eq!(
            Finding::from_event(&json!({}), None),
            Err(NormalizeError::MissingInstanceId)
        );
    }

    #[test]
    fn empty_findings_list_is_an_error() {
        let event = json!({"detail": {"findings": []}});
        assert_eq!(
            Finding::from_event(&event, None),
            Err(NormalizeError::EmptyFindings)
        );
    }

    #[test]
    fn non_object_event_is_rejected() {
        assert_eq!(
            Finding::from_event(&json!("hello"), None),
            Err(NormalizeError::NotAnObject)
        );
    }

    #[test]
    fn sample_ids_are_recognised() {
        assert!(is_sample_instance_id("i-99999999"));
        assert!(is_sample_instance_id("i-99999999999999999"));
        assert!(!is_sample_instance_id("i-9999999"));
        assert!(!is_sample_instance_id("i-999999999999999999"));
        assert!(!is_sample_instance_id("i-0999999999"));
    }

    #[test]
    fn sample_id_is_substituted_when_override_configured() {
        let event = json!({
            "detail": {"id": "f", "resource": {"instanceDetails": {"instanceId": "i-99999999"}}}
        });
        let finding = Finding::from_event(&event, Some("i-0real")).unwrap();
        assert_eq!(finding.instance_id, "i-0real");

        let kept = Finding::from_event(&event, None).unwrap();
        assert_eq!(kept.instance_id, "i-99999999");
    }
}
