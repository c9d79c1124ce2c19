//! HTTP control-plane client
//!
//! Talks JSON to a control-plane gateway that fronts the instance directory,
//! the alarm directory, lifecycle hooks and the route tables.

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::backend::traits::{
    AlarmState, AlarmSummary, ControlPlane, GroupDescription, HealthStatus, LifecycleResult,
    RouteTable,
};
use crate::config::ControlPlaneConfig;
use crate::error::{AppError, Result};

/// Control plane reached over HTTP
pub struct HttpControlPlane {
    base_url: Url,
    client: Client,
}

#[derive(Debug, Serialize)]
struct HealthUpdate {
    status: HealthStatus,
}

#[derive(Debug, Serialize)]
struct LifecycleCompletion<'a> {
    hook: &'a str,
    instance_id: &'a str,
    result: LifecycleResult,
}

#[derive(Debug, Serialize)]
struct RouteSpec<'a> {
    destination: &'a str,
    instance_id: &'a str,
}

#[derive(Debug, Serialize)]
struct TagSpec<'a> {
    key: &'a str,
    value: &'a str,
}

#[derive(Debug, Deserialize)]
struct HookList {
    #[serde(default)]
    hooks: Vec<HookEntry>,
}

#[derive(Debug, Deserialize)]
struct HookEntry {
    name: String,
}

impl HttpControlPlane {
    /// Create a new client from configuration
    pub fn new(config: &ControlPlaneConfig) -> Result<Self> {
        let endpoint = config
            .endpoint
            .as_deref()
            .ok_or_else(|| AppError::Internal("control_plane.endpoint is not set".to_string()))?;
        Self::with_endpoint(endpoint, Duration::from_millis(config.timeout_ms))
    }

    pub fn with_endpoint(endpoint: &str, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(endpoint)
            .map_err(|e| AppError::Internal(format!("Invalid control plane endpoint '{}': {}", endpoint, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(AppError::Internal(format!("Control plane endpoint '{}' cannot be a base URL", endpoint)));
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { base_url, client })
    }

    /// Base URL extended by `segments`, each percent-encoded as a single path segment
    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| AppError::Internal(format!("Control plane endpoint {} cannot be a base URL", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Turn a non-success response into a control-plane error carrying its status
    async fn check(response: Response, what: &str) -> Result<Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(AppError::ControlPlaneStatus {
            operation: what.to_string(),
            status,
            body,
        })
    }
}

#[async_trait]
impl ControlPlane for HttpControlPlane {
    fn name(&self) -> &str {
        self.base_url.as_str()
    }

    async fn describe_group(&self, group: &str) -> Result<Option<GroupDescription>> {
        let response = self.client.get(self.url(&["groups", group])?).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = Self::check(response, "describe_group").await?;
        Ok(Some(response.json().await?))
    }

    async fn set_instance_health(&self, instance_id: &str, status: HealthStatus) -> Result<()> {
        let response = self
            .client
            .put(self.url(&["instances", instance_id, "health"])?)
            .json(&HealthUpdate { status })
            .send()
            .await?;
        Self::check(response, "set_instance_health").await?;
        Ok(())
    }

    async fn describe_alarms(
        &self,
        name_prefix: &str,
        action_prefix: &str,
        state: AlarmState,
    ) -> Result<Vec<AlarmSummary>> {
        let response = self
            .client
            .get(self.url(&["alarms"])?)
            .query(&[
                ("name_prefix", name_prefix),
                ("action_prefix", action_prefix),
                ("state", state.as_str()),
            ])
            .send()
            .await?;
        let response = Self::check(response, "describe_alarms").await?;
        Ok(response.json().await?)
    }

    async fn describe_lifecycle_hooks(&self, group: &str) -> Result<Vec<String>> {
        let response = self
            .client
            .get(self.url(&["groups", group, "lifecycle-hooks"])?)
            .send()
            .await?;
        let response = Self::check(response, "describe_lifecycle_hooks").await?;
        let list: HookList = response.json().await?;
        Ok(list.hooks.into_iter().map(|h| h.name).collect())
    }

    async fn complete_lifecycle_action(
        &self,
        hook: &str,
        group: &str,
        instance_id: &str,
        result: LifecycleResult,
    ) -> Result<()> {
        let response = self
            .client
            .post(self.url(&["groups", group, "lifecycle-actions"])?)
            .json(&LifecycleCompletion {
                hook,
                instance_id,
                result,
            })
            .send()
            .await?;
        Self::check(response, "complete_lifecycle_action").await?;
        Ok(())
    }

    async fn describe_route_tables(&self, tag_key: &str, tag_value: &str) -> Result<Vec<RouteTable>> {
        let response = self
            .client
            .get(self.url(&["route-tables"])?)
            .query(&[("tag_key", tag_key), ("tag_value", tag_value)])
            .send()
            .await?;
        let response = Self::check(response, "describe_route_tables").await?;
        Ok(response.json().await?)
    }

    async fn replace_route(&self, table_id: &str, destination: &str, instance_id: &str) -> Result<()> {
        let response = self
            .client
            .put(self.url(&["route-tables", table_id, "routes"])?)
            .json(&RouteSpec {
                destination,
                instance_id,
            })
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!(table = %table_id, destination = %destination, "No route to replace");
            return Err(AppError::RouteNotFound {
                table: table_id.to_string(),
                destination: destination.to_string(),
            });
        }
        Self::check(response, "replace_route").await?;
        Ok(())
    }

    async fn create_route(&self, table_id: &str, destination: &str, instance_id: &str) -> Result<()> {
        let response = self
            .client
            .post(self.url(&["route-tables", table_id, "routes"])?)
            .json(&RouteSpec {
                destination,
                instance_id,
            })
            .send()
            .await?;
        if response.status() == StatusCode::CONFLICT {
            return Err(AppError::RouteAlreadyExists {
                table: table_id.to_string(),
                destination: destination.to_string(),
            });
        }
        Self::check(response, "create_route").await?;
        Ok(())
    }

    async fn create_tags(&self, table_id: &str, key: &str, value: &str) -> Result<()> {
        let response = self
            .client
            .put(self.url(&["route-tables", table_id, "tags"])?)
            .json(&TagSpec { key, value })
            .send()
            .await?;
        Self::check(response, "create_tags").await?;
        Ok(())
    }
}
