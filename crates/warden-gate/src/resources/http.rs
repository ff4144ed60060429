//! REST client for the compute control plane.
//!
//! Endpoints (relative to the configured base URL):
//! - `GET    /instances/{id}`
//! - `PUT    /network-interfaces/{id}/groups`  body `{"groups": [...]}`
//! - `POST   /instances/{id}/tags`             body `{"tags": {...}}`
//! - `DELETE /instances/{id}/tags`             body `{"keys": [...]}`

use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde_json::json;
use tracing::debug;
use url::Url;

use super::{InstanceDescription, ResourceControl, ResourceError};

/// Connection settings for [`HttpResourceControl`].
#[derive(Debug, Clone)]
pub struct HttpResourceConfig {
    /// Control-plane base URL, e.g. `https://compute.internal/v1`.
    pub endpoint: String,
    /// Bearer token, if the API requires one.
    pub api_token: Option<String>,
}

/// reqwest-backed [`ResourceControl`].
#[derive(Debug)]
pub struct HttpResourceControl {
    http: reqwest::Client,
    base: Url,
}

impl HttpResourceControl {
    pub fn new(config: &HttpResourceConfig) -> Result<Self, ResourceError> {
        if config.endpoint.trim().is_empty() {
            return Err(ResourceError::Config("endpoint is empty".into()));
        }
        let base = Url::parse(config.endpoint.trim_end_matches('/'))
            .map_err(|e| ResourceError::Config(format!("invalid endpoint: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(ResourceError::Config(format!(
                "endpoint {base} cannot carry a path"
            )));
        }

        let mut headers = HeaderMap::new();
        if let Some(token) = config.api_token.as_deref().filter(|t| !t.is_empty()) {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| ResourceError::Config("Invalid token format".into()))?;
            headers.insert(AUTHORIZATION, value);
        }

        // reqwest is built with rustls-no-provider; `Err` means a provider is
        // already installed.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self { http, base })
    }

    /// Build an endpoint URL from path segments, percent-encoding each one.
    pub(crate) fn endpoint(&self, segments: &[&str]) -> Result<Url, ResourceError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| ResourceError::Config("endpoint cannot carry a path".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, ResourceError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        let message = if body.is_empty() {
            status.canonical_reason().unwrap_or("Unknown").to_string()
        } else {
            body
        };
        Err(ResourceError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl ResourceControl for HttpResourceControl {
    async fn describe_instance(&self, instance_id: &str) -> Result<InstanceDescription, ResourceError> {
        let url = self.endpoint(&["instances", instance_id])?;
        debug!(%url, "describe instance");
        let resp = self.http.get(url).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(ResourceError::InstanceNotFound(instance_id.to_string()));
        }
        let resp = Self::check_status(resp).await?;
        Ok(resp.json().await?)
    }

    async fn set_interface_groups(
        &self,
        interface_id: &str,
        group_ids: &[String],
    ) -> Result<(), ResourceError> {
        let url = self.endpoint(&["network-interfaces", interface_id, "groups"])?;
        let resp = self
            .http
            .put(url)
            .json(&json!({ "groups": group_ids }))
            .send()
            .await?;
        Self::check_status(resp).await?;
        Ok(())
    }

    async fn set_tags(
        &self,
        instance_id: &str,
        tags: &BTreeMap<String, String>,
    ) -> Result<(), ResourceError> {
        let url = self.endpoint(&["instances", instance_id, "tags"])?;
        let resp = self
            .http
            .post(url)
            .json(&json!({ "tags": tags }))
            .send()
            .await?;
        Self::check_status(resp).await?;
        Ok(())
    }

    async fn delete_tags(&self, instance_id: &str, keys: &[String]) -> Result<(), ResourceError> {
        let url = self.endpoint(&["instances", instance_id, "tags"])?;
        let resp = self
            .http
            .delete(url)
            .json(&json!({ "keys": keys }))
            .send()
            .await?;
        Self::check_status(resp).await?;
        Ok(())
    }
}
