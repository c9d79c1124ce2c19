//! Gateway group membership, health marking and healthy-peer discovery

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::backend::traits::{AlarmState, ControlPlane, GatewayInstance, GroupDescription, HealthStatus};
use crate::error::{AppError, Result};
use crate::event::AlarmNameConvention;
use crate::gateway::call::{best_effort, BestEffort, CallPolicy};

/// A gateway group as provisioned: its members and its home route tables
#[derive(Debug, Clone)]
pub struct GatewayGroup {
    pub name: String,
    pub instances: Vec<GatewayInstance>,
    /// `None` when the group carries no home-tables tag
    pub home_route_table_ids: Option<Vec<String>>,
}

impl GatewayGroup {
    fn from_description(description: GroupDescription, home_tag_key: &str) -> Self {
        let home_route_table_ids = description.tags.get(home_tag_key).map(|value| {
            value
                .split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(String::from)
                .collect()
        });

        Self {
            name: description.name,
            instances: description.instances,
            home_route_table_ids,
        }
    }

    /// First member whose status is `Healthy`
    pub fn first_healthy(&self) -> Option<&GatewayInstance> {
        self.instances.iter().find(|i| i.is_healthy())
    }
}

/// Healthy gateway picked to take over traffic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthyPeer {
    pub group: String,
    pub instance_id: String,
}

/// Live view of gateway groups; nothing is cached between calls
pub struct InstanceDirectory {
    control_plane: Arc<dyn ControlPlane>,
    policy: CallPolicy,
    convention: AlarmNameConvention,
    topic: String,
    home_tag_key: String,
}

impl InstanceDirectory {
    pub fn new(
        control_plane: Arc<dyn ControlPlane>,
        policy: CallPolicy,
        convention: AlarmNameConvention,
        topic: impl Into<String>,
        home_tag_key: impl Into<String>,
    ) -> Self {
        Self {
            control_plane,
            policy,
            convention,
            topic: topic.into(),
            home_tag_key: home_tag_key.into(),
        }
    }

    /// Read a group with its members and home route tables
    pub async fn group(&self, name: &str) -> Result<GatewayGroup> {
        let cp = &self.control_plane;
        let description = self
            .policy
            .retry("describe_group", move || cp.describe_group(name))
            .await?
            .ok_or_else(|| AppError::GroupNotFound(name.to_string()))?;
        Ok(GatewayGroup::from_description(description, &self.home_tag_key))
    }

    /// Current members of a group and their health
    pub async fn list_instances(&self, group: &str) -> Result<Vec<GatewayInstance>> {
        Ok(self.group(group).await?.instances)
    }

    /// Mark an instance unhealthy. Failures are logged and swallowed.
    pub async fn mark_unhealthy(&self, instance_id: &str) -> BestEffort {
        let outcome = best_effort(
            "set_instance_health",
            self.policy.call(
                "set_instance_health",
                self.control_plane.set_instance_health(instance_id, HealthStatus::Unhealthy),
            ),
        )
        .await;

        match &outcome {
            BestEffort::Done => info!(instance = %instance_id, "Marked instance unhealthy"),
            BestEffort::Skipped(reason) => {
                warn!(instance = %instance_id, reason = %reason, "Could not mark instance unhealthy")
            }
        }
        outcome
    }

    /// First group, in directory order, whose alarm on our topic is `OK` and
    /// that has a `Healthy` instance. No ranking beyond enumeration order.
    pub async fn find_first_healthy_peer(&self, name_prefix: &str, exclude_group: Option<&str>) -> Result<HealthyPeer> {
        let cp = &self.control_plane;
        let topic = self.topic.as_str();
        let alarms = self
            .policy
            .retry("describe_alarms", move || cp.describe_alarms(name_prefix, topic, AlarmState::Ok))
            .await?;

        debug!(candidates = alarms.len(), prefix = %name_prefix, "Scanning healthy alarms for a peer");

        for alarm in alarms {
            let Some(group_name) = self.convention.group_of(&alarm.name) else {
                warn!(alarm = %alarm.name, "Skipping alarm outside the naming convention");
                continue;
            };
            if exclude_group == Some(group_name) {
                continue;
            }

            let group = match self.group(group_name).await {
                Ok(group) => group,
                Err(e) => {
                    warn!(group = %group_name, error = %e, "Skipping peer candidate");
                    continue;
                }
            };

            match group.first_healthy() {
                Some(instance) => {
                    info!(group = %group.name, instance = %instance.id, "Found healthy peer");
                    return Ok(HealthyPeer {
                        group: group.name.clone(),
                        instance_id: instance.id.clone(),
                    });
                }
                None => debug!(group = %group.name, "Peer candidate has no healthy instance"),
            }
        }

        Err(AppError::NoHealthyPeer(name_prefix.to_string()))
    }
}
