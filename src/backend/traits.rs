//! Control-plane trait and the resource types it exchanges

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::Result;

/// Health and lifecycle status of a gateway instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HealthStatus {
    Pending,
    Healthy,
    Unhealthy,
    Terminating,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HealthStatus::Pending => "Pending",
            HealthStatus::Healthy => "Healthy",
            HealthStatus::Unhealthy => "Unhealthy",
            HealthStatus::Terminating => "Terminating",
        };
        f.write_str(s)
    }
}

/// One member of a gateway group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayInstance {
    pub id: String,
    pub health_status: HealthStatus,
}

impl GatewayInstance {
    pub fn new(id: impl Into<String>, health_status: HealthStatus) -> Self {
        Self {
            id: id.into(),
            health_status,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.health_status == HealthStatus::Healthy
    }
}

/// A gateway group as the instance directory reports it
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupDescription {
    pub name: String,
    #[serde(default)]
    pub instances: Vec<GatewayInstance>,
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

/// Alarm state values emitted by the health alarms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlarmState {
    #[serde(rename = "ALARM")]
    Alarm,
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "INSUFFICIENT_DATA")]
    InsufficientData,
}

impl AlarmState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlarmState::Alarm => "ALARM",
            AlarmState::Ok => "OK",
            AlarmState::InsufficientData => "INSUFFICIENT_DATA",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ALARM" => Some(AlarmState::Alarm),
            "OK" => Some(AlarmState::Ok),
            "INSUFFICIENT_DATA" => Some(AlarmState::InsufficientData),
            _ => None,
        }
    }
}

impl fmt::Display for AlarmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-group health alarm as listed by the alarm directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmSummary {
    pub name: String,
    pub state: AlarmState,
    /// Notification channels the alarm publishes to
    #[serde(default)]
    pub actions: Vec<String>,
}

/// A single route entry inside a route table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub destination: String,
    pub instance_id: String,
}

/// Route table with its routes and tags
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteTable {
    pub id: String,
    #[serde(default)]
    pub routes: Vec<Route>,
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

impl RouteTable {
    /// Target of the route for `destination`, if any
    pub fn route_target(&self, destination: &str) -> Option<&str> {
        self.routes
            .iter()
            .find(|r| r.destination == destination)
            .map(|r| r.instance_id.as_str())
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }
}

/// Result reported when completing a lifecycle action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleResult {
    Continue,
}

/// Every external call the failover controller makes.
///
/// Implementations hold no controller state; each call is a live read or a
/// single write against the authoritative directory.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Human readable name used in logs
    fn name(&self) -> &str;

    /// Read a gateway group; `None` when it does not exist
    async fn describe_group(&self, group: &str) -> Result<Option<GroupDescription>>;

    /// Overwrite an instance's health status
    async fn set_instance_health(&self, instance_id: &str, status: HealthStatus) -> Result<()>;

    /// List alarms whose name starts with `name_prefix`, that publish to a
    /// channel starting with `action_prefix` and that are in `state`.
    /// Order is whatever the directory enumerates.
    async fn describe_alarms(
        &self,
        name_prefix: &str,
        action_prefix: &str,
        state: AlarmState,
    ) -> Result<Vec<AlarmSummary>>;

    /// Names of the lifecycle hooks attached to a group
    async fn describe_lifecycle_hooks(&self, group: &str) -> Result<Vec<String>>;

    /// Resolve the pending lifecycle action of `instance_id`
    async fn complete_lifecycle_action(
        &self,
        hook: &str,
        group: &str,
        instance_id: &str,
        result: LifecycleResult,
    ) -> Result<()>;

    /// Route tables carrying tag `key = value`
    async fn describe_route_tables(&self, tag_key: &str, tag_value: &str) -> Result<Vec<RouteTable>>;

    /// Point an existing route at `instance_id`; fails with `RouteNotFound`
    async fn replace_route(&self, table_id: &str, destination: &str, instance_id: &str) -> Result<()>;

    /// Add a new route; fails with `RouteAlreadyExists`
    async fn create_route(&self, table_id: &str, destination: &str, instance_id: &str) -> Result<()>;

    /// Create or overwrite a tag on a route table
    async fn create_tags(&self, table_id: &str, key: &str, value: &str) -> Result<()>;
}
