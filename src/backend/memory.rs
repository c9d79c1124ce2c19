//! In-process control plane
//!
//! Holds a complete, consistent topology (groups, alarms, lifecycle hooks and
//! route tables) behind a lock. Used for local runs seeded from a TOML file and
//! as the directory the failover tests run against. Every successful mutation
//! is journaled so callers can check exactly what a handler changed.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::backend::traits::{
    AlarmState, AlarmSummary, ControlPlane, GatewayInstance, GroupDescription, HealthStatus,
    LifecycleResult, Route, RouteTable,
};
use crate::error::{AppError, Result};

/// Lifecycle hook with the instances currently waiting on it
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HookState {
    pub group: String,
    pub name: String,
    #[serde(default)]
    pub pending: Vec<String>,
}

/// Full topology; also the shape of a seed file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Topology {
    #[serde(default)]
    pub groups: Vec<GroupDescription>,
    #[serde(default)]
    pub alarms: Vec<AlarmSummary>,
    #[serde(default)]
    pub hooks: Vec<HookState>,
    #[serde(default)]
    pub route_tables: Vec<RouteTable>,
}

/// A write that reached the topology
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    SetInstanceHealth { instance_id: String, status: HealthStatus },
    CompleteLifecycleAction { group: String, hook: String, instance_id: String, result: LifecycleResult },
    ReplaceRoute { table_id: String, instance_id: String },
    CreateRoute { table_id: String, instance_id: String },
    CreateTags { table_id: String, key: String, value: String },
}

impl Mutation {
    /// Whether this mutation touched a route table
    pub fn is_route_change(&self) -> bool {
        matches!(
            self,
            Mutation::ReplaceRoute { .. } | Mutation::CreateRoute { .. } | Mutation::CreateTags { .. }
        )
    }
}

/// Control-plane operations that can be made to fail on demand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    DescribeGroup,
    SetInstanceHealth,
    DescribeAlarms,
    DescribeLifecycleHooks,
    CompleteLifecycleAction,
    DescribeRouteTables,
    ReplaceRoute,
    CreateRoute,
    CreateTags,
}

/// Control plane backed by process memory
pub struct InMemoryControlPlane {
    topology: RwLock<Topology>,
    journal: Mutex<Vec<Mutation>>,
    failures: Mutex<HashMap<Operation, u32>>,
    latency: Mutex<Option<Duration>>,
}

impl Default for InMemoryControlPlane {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryControlPlane {
    pub fn new() -> Self {
        Self::from_topology(Topology::default())
    }

    pub fn from_topology(topology: Topology) -> Self {
        Self {
            topology: RwLock::new(topology),
            journal: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
            latency: Mutex::new(None),
        }
    }

    /// Load a topology from a TOML seed file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let topology: Topology = toml::from_str(&raw)
            .map_err(|e| AppError::Internal(format!("Invalid topology seed file: {}", e)))?;
        Ok(Self::from_topology(topology))
    }

    /// Add a gateway group with its home route tables tag
    pub fn with_group(self, name: &str, instances: Vec<GatewayInstance>, home_tables: &[&str]) -> Self {
        let mut tags = HashMap::new();
        if !home_tables.is_empty() {
            tags.insert("RouteTableIds".to_string(), home_tables.join(","));
        }
        self.topology.write().groups.push(GroupDescription {
            name: name.to_string(),
            instances,
            tags,
        });
        self
    }

    /// Add a health alarm publishing to `actions`
    pub fn with_alarm(self, name: &str, state: AlarmState, actions: &[&str]) -> Self {
        self.topology.write().alarms.push(AlarmSummary {
            name: name.to_string(),
            state,
            actions: actions.iter().map(|a| a.to_string()).collect(),
        });
        self
    }

    /// Add a route table whose default route targets `target` and is tagged as served by `serving_group`
    pub fn with_route_table(self, id: &str, destination: &str, target: Option<&str>, serving_group: &str) -> Self {
        let routes = target
            .map(|t| {
                vec![Route {
                    destination: destination.to_string(),
                    instance_id: t.to_string(),
                }]
            })
            .unwrap_or_default();
        let mut tags = HashMap::new();
        tags.insert("AutoScalingGroupName".to_string(), serving_group.to_string());
        self.topology.write().route_tables.push(RouteTable {
            id: id.to_string(),
            routes,
            tags,
        });
        self
    }

    /// Attach a lifecycle hook with instances waiting on it
    pub fn with_hook(self, group: &str, hook: &str, pending: &[&str]) -> Self {
        self.topology.write().hooks.push(HookState {
            group: group.to_string(),
            name: hook.to_string(),
            pending: pending.iter().map(|p| p.to_string()).collect(),
        });
        self
    }

    /// Make the next `times` calls of `operation` fail with a transient error
    pub fn fail_next(&self, operation: Operation, times: u32) {
        self.failures.lock().insert(operation, times);
    }

    /// Delay every call by `latency`
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock() = latency;
    }

    pub fn set_alarm_state(&self, alarm: &str, state: AlarmState) {
        if let Some(a) = self.topology.write().alarms.iter_mut().find(|a| a.name == alarm) {
            a.state = state;
        }
    }

    /// Replace the members of a group, e.g. after the group launched a new instance
    pub fn replace_instances(&self, group: &str, instances: Vec<GatewayInstance>) {
        if let Some(g) = self.topology.write().groups.iter_mut().find(|g| g.name == group) {
            g.instances = instances;
        }
    }

    pub fn add_pending_action(&self, group: &str, instance_id: &str) {
        let mut topology = self.topology.write();
        if let Some(h) = topology.hooks.iter_mut().find(|h| h.group == group) {
            h.pending.push(instance_id.to_string());
        }
    }

    pub fn route_table(&self, id: &str) -> Option<RouteTable> {
        self.topology.read().route_tables.iter().find(|t| t.id == id).cloned()
    }

    pub fn instance_health(&self, instance_id: &str) -> Option<HealthStatus> {
        self.topology
            .read()
            .groups
            .iter()
            .flat_map(|g| g.instances.iter())
            .find(|i| i.id == instance_id)
            .map(|i| i.health_status)
    }

    pub fn pending_actions(&self, group: &str) -> Vec<String> {
        self.topology
            .read()
            .hooks
            .iter()
            .filter(|h| h.group == group)
            .flat_map(|h| h.pending.iter().cloned())
            .collect()
    }

    /// All mutations applied so far, oldest first
    pub fn mutations(&self) -> Vec<Mutation> {
        self.journal.lock().clone()
    }

    pub fn route_mutations(&self) -> Vec<Mutation> {
        self.mutations().into_iter().filter(Mutation::is_route_change).collect()
    }

    async fn enter(&self, operation: Operation) -> Result<()> {
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut failures = self.failures.lock();
        if let Some(remaining) = failures.get_mut(&operation) {
            if *remaining > 0 {
                *remaining -= 1;
                debug!(operation = ?operation, "Injected control plane failure");
                return Err(AppError::ControlPlane(format!("injected failure in {:?}", operation)));
            }
        }
        Ok(())
    }

    fn record(&self, mutation: Mutation) {
        self.journal.lock().push(mutation);
    }
}

#[async_trait]
impl ControlPlane for InMemoryControlPlane {
    fn name(&self) -> &str {
        "memory"
    }

    async fn describe_group(&self, group: &str) -> Result<Option<GroupDescription>> {
        self.enter(Operation::DescribeGroup).await?;
        Ok(self.topology.read().groups.iter().find(|g| g.name == group).cloned())
    }

    async fn set_instance_health(&self, instance_id: &str, status: HealthStatus) -> Result<()> {
        self.enter(Operation::SetInstanceHealth).await?;
        {
            let mut topology = self.topology.write();
            let instance = topology
                .groups
                .iter_mut()
                .flat_map(|g| g.instances.iter_mut())
                .find(|i| i.id == instance_id)
                .ok_or_else(|| AppError::ResourceNotFound(format!("instance {}", instance_id)))?;
            instance.health_status = status;
        }
        self.record(Mutation::SetInstanceHealth {
            instance_id: instance_id.to_string(),
            status,
        });
        Ok(())
    }

    async fn describe_alarms(
        &self,
        name_prefix: &str,
        action_prefix: &str,
        state: AlarmState,
    ) -> Result<Vec<AlarmSummary>> {
        self.enter(Operation::DescribeAlarms).await?;
        Ok(self
            .topology
            .read()
            .alarms
            .iter()
            .filter(|a| a.name.starts_with(name_prefix))
            .filter(|a| a.state == state)
            .filter(|a| a.actions.iter().any(|action| action.starts_with(action_prefix)))
            .cloned()
            .collect())
    }

    async fn describe_lifecycle_hooks(&self, group: &str) -> Result<Vec<String>> {
        self.enter(Operation::DescribeLifecycleHooks).await?;
        Ok(self
            .topology
            .read()
            .hooks
            .iter()
            .filter(|h| h.group == group)
            .map(|h| h.name.clone())
            .collect())
    }

    async fn complete_lifecycle_action(
        &self,
        hook: &str,
        group: &str,
        instance_id: &str,
        result: LifecycleResult,
    ) -> Result<()> {
        self.enter(Operation::CompleteLifecycleAction).await?;
        {
            let mut topology = self.topology.write();
            let state = topology
                .hooks
                .iter_mut()
                .find(|h| h.group == group && h.name == hook)
                .ok_or_else(|| AppError::ResourceNotFound(format!("lifecycle hook {}", hook)))?;
            let position = state.pending.iter().position(|p| p == instance_id).ok_or_else(|| {
                AppError::ResourceNotFound(format!("active lifecycle action for instance {}", instance_id))
            })?;
            state.pending.remove(position);
        }
        self.record(Mutation::CompleteLifecycleAction {
            group: group.to_string(),
            hook: hook.to_string(),
            instance_id: instance_id.to_string(),
            result,
        });
        Ok(())
    }

    async fn describe_route_tables(&self, tag_key: &str, tag_value: &str) -> Result<Vec<RouteTable>> {
        self.enter(Operation::DescribeRouteTables).await?;
        Ok(self
            .topology
            .read()
            .route_tables
            .iter()
            .filter(|t| t.tag(tag_key) == Some(tag_value))
            .cloned()
            .collect())
    }

    async fn replace_route(&self, table_id: &str, destination: &str, instance_id: &str) -> Result<()> {
        self.enter(Operation::ReplaceRoute).await?;
        {
            let mut topology = self.topology.write();
            let table = find_table(&mut topology, table_id)?;
            let route = table
                .routes
                .iter_mut()
                .find(|r| r.destination == destination)
                .ok_or_else(|| AppError::RouteNotFound {
                    table: table_id.to_string(),
                    destination: destination.to_string(),
                })?;
            route.instance_id = instance_id.to_string();
        }
        self.record(Mutation::ReplaceRoute {
            table_id: table_id.to_string(),
            instance_id: instance_id.to_string(),
        });
        Ok(())
    }

    async fn create_route(&self, table_id: &str, destination: &str, instance_id: &str) -> Result<()> {
        self.enter(Operation::CreateRoute).await?;
        {
            let mut topology = self.topology.write();
            let table = find_table(&mut topology, table_id)?;
            if table.routes.iter().any(|r| r.destination == destination) {
                return Err(AppError::RouteAlreadyExists {
                    table: table_id.to_string(),
                    destination: destination.to_string(),
                });
            }
            table.routes.push(Route {
                destination: destination.to_string(),
                instance_id: instance_id.to_string(),
            });
        }
        self.record(Mutation::CreateRoute {
            table_id: table_id.to_string(),
            instance_id: instance_id.to_string(),
        });
        Ok(())
    }

    async fn create_tags(&self, table_id: &str, key: &str, value: &str) -> Result<()> {
        self.enter(Operation::CreateTags).await?;
        {
            let mut topology = self.topology.write();
            let table = find_table(&mut topology, table_id)?;
            table.tags.insert(key.to_string(), value.to_string());
        }
        self.record(Mutation::CreateTags {
            table_id: table_id.to_string(),
            key: key.to_string(),
            value: value.to_string(),
        });
        Ok(())
    }
}

fn find_table<'a>(topology: &'a mut Topology, table_id: &str) -> Result<&'a mut RouteTable> {
    topology
        .route_tables
        .iter_mut()
        .find(|t| t.id == table_id)
        .ok_or_else(|| AppError::ResourceNotFound(format!("route table {}", table_id)))
}
