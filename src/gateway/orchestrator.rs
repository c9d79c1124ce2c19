//! Failover orchestrator
//!
//! Runs once per alarm transition and keeps no state between runs:
//!
//! - `ALARM` for group F: mark F's instances unhealthy (best-effort), find the
//!   first healthy peer H, then move every table currently served by F onto
//!   H's instance and tag it as served by H.
//! - `OK` for group G: take G's healthy instance, complete its pending launch
//!   action (best-effort), then reclaim all of G's home tables.
//!
//! Route writes are idempotent, so concurrent or repeated runs converge.
//! Concurrent runs are not mutually excluded unless the per-group advisory
//! lock is switched on, and even then only within this process. Lock entries
//! live only while a run for that group holds or awaits them.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::backend::traits::{AlarmState, ControlPlane};
use crate::config::ControllerConfig;
use crate::error::{AppError, Result};
use crate::event::{AlarmEvent, AlarmNameConvention};
use crate::gateway::call::CallPolicy;
use crate::gateway::instance_directory::InstanceDirectory;
use crate::gateway::lifecycle::LifecycleCoordinator;
use crate::gateway::route_registry::RouteTableRegistry;

/// What a run did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailoverAction {
    FailedOver,
    Reclaimed,
    Ignored,
}

/// Summary of one orchestrator run
#[derive(Debug, Clone, Serialize)]
pub struct FailoverReport {
    pub invocation_id: Uuid,
    pub group: String,
    pub state: AlarmState,
    pub action: FailoverAction,
    pub target_instance: Option<String>,
    pub serving_group: Option<String>,
    pub tables_updated: Vec<String>,
    pub instances_marked_unhealthy: usize,
    pub lifecycle_completed: bool,
    pub finished_at: DateTime<Utc>,
}

impl FailoverReport {
    fn new(invocation_id: Uuid, event: &AlarmEvent, action: FailoverAction) -> Self {
        Self {
            invocation_id,
            group: event.group_name.clone(),
            state: event.new_state,
            action,
            target_instance: None,
            serving_group: None,
            tables_updated: Vec::new(),
            instances_marked_unhealthy: 0,
            lifecycle_completed: false,
            finished_at: Utc::now(),
        }
    }
}

/// Sequences directory, registry and lifecycle calls for each alarm event
pub struct FailoverOrchestrator {
    directory: InstanceDirectory,
    routes: RouteTableRegistry,
    lifecycle: LifecycleCoordinator,
    alarm_prefix: String,
    deadline: Duration,
    group_locks: Option<DashMap<String, Arc<Mutex<()>>>>,
}

impl FailoverOrchestrator {
    pub fn new(control_plane: Arc<dyn ControlPlane>, config: &ControllerConfig) -> Self {
        let policy = CallPolicy::from_config(config);
        let convention = AlarmNameConvention::from_config(config);

        Self {
            directory: InstanceDirectory::new(
                control_plane.clone(),
                policy.clone(),
                convention,
                config.topic_arn.clone(),
                config.home_tables_tag_key.clone(),
            ),
            routes: RouteTableRegistry::new(
                control_plane.clone(),
                policy.clone(),
                config.route_tag_key.clone(),
                config.default_destination.clone(),
            ),
            lifecycle: LifecycleCoordinator::new(control_plane, policy),
            alarm_prefix: config.alarm_prefix.clone(),
            deadline: config.handler_deadline(),
            group_locks: config.per_group_lock.then(DashMap::new),
        }
    }

    /// Number of groups with a run holding or awaiting the advisory lock
    pub fn locked_groups(&self) -> usize {
        self.group_locks.as_ref().map_or(0, DashMap::len)
    }

    /// Handle one alarm transition within the handler deadline
    pub async fn handle(&self, event: &AlarmEvent) -> Result<FailoverReport> {
        let invocation_id = Uuid::new_v4();
        let span = info_span!(
            "failover",
            invocation = %invocation_id,
            group = %event.group_name,
            state = %event.new_state
        );

        async {
            // Waiting for the group lock counts against the deadline.
            let run = async {
                let _guard = match &self.group_locks {
                    Some(locks) => {
                        let lock = locks.entry(event.group_name.clone()).or_default().clone();
                        Some(lock.lock_owned().await)
                    }
                    None => None,
                };
                self.dispatch(invocation_id, event).await
            };

            let result = match tokio::time::timeout(self.deadline, run).await {
                Ok(result) => result,
                Err(_) => Err(AppError::Timeout(format!(
                    "handling {} for group {} exceeded {}ms",
                    event.new_state,
                    event.group_name,
                    self.deadline.as_millis()
                ))),
            };

            if let Some(locks) = &self.group_locks {
                locks.remove_if(&event.group_name, |_, lock| Arc::strong_count(lock) == 1);
            }

            match &result {
                Ok(report) => info!(
                    action = ?report.action,
                    tables = ?report.tables_updated,
                    target = ?report.target_instance,
                    "Alarm transition handled"
                ),
                Err(e) => warn!(error = %e, "Alarm transition failed"),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn dispatch(&self, invocation_id: Uuid, event: &AlarmEvent) -> Result<FailoverReport> {
        match event.new_state {
            AlarmState::Alarm => self.fail_over(invocation_id, event).await,
            AlarmState::Ok => self.reclaim(invocation_id, event).await,
            AlarmState::InsufficientData => {
                info!("Alarm has insufficient data, nothing to do");
                Ok(FailoverReport::new(invocation_id, event, FailoverAction::Ignored))
            }
        }
    }

    /// Failure path: move traffic off the alarming group
    async fn fail_over(&self, invocation_id: Uuid, event: &AlarmEvent) -> Result<FailoverReport> {
        let failed = event.group_name.as_str();
        let mut report = FailoverReport::new(invocation_id, event, FailoverAction::FailedOver);

        match self.directory.list_instances(failed).await {
            Ok(instances) => {
                let outcomes = join_all(instances.iter().map(|i| self.directory.mark_unhealthy(&i.id))).await;
                report.instances_marked_unhealthy = outcomes.iter().filter(|o| o.is_done()).count();
            }
            Err(e) => warn!(group = %failed, error = %e, "Could not list members of failed group"),
        }

        // The failed group's own alarm is in ALARM, so the OK-only scan never returns it.
        let peer = self.directory.find_first_healthy_peer(&self.alarm_prefix, None).await?;

        let tables: Vec<String> = self
            .routes
            .find_by_serving_group(failed)
            .await?
            .into_iter()
            .map(|t| t.id)
            .collect();

        if tables.is_empty() {
            info!(group = %failed, "No route tables are served by the failed group");
        }

        report.tables_updated = self
            .routes
            .program_tables(&tables, &peer.instance_id, &peer.group)
            .await?;
        report.target_instance = Some(peer.instance_id);
        report.serving_group = Some(peer.group);
        report.finished_at = Utc::now();
        Ok(report)
    }

    /// Recovery path: the group is healthy again and takes back its home tables
    async fn reclaim(&self, invocation_id: Uuid, event: &AlarmEvent) -> Result<FailoverReport> {
        let group = self.directory.group(&event.group_name).await?;
        let mut report = FailoverReport::new(invocation_id, event, FailoverAction::Reclaimed);

        let instance_id = group
            .first_healthy()
            .map(|i| i.id.clone())
            .ok_or_else(|| AppError::NoHealthyInstance(group.name.clone()))?;
        info!(instance = %instance_id, "Healthy instance in recovered group");

        report.lifecycle_completed = self.lifecycle.complete_launch(&group.name, &instance_id).await.is_done();

        let home_tables = group
            .home_route_table_ids
            .as_ref()
            .ok_or_else(|| AppError::MissingHomeRouteTables(group.name.clone()))?;

        report.tables_updated = self.routes.program_tables(home_tables, &instance_id, &group.name).await?;
        report.target_instance = Some(instance_id);
        report.serving_group = Some(group.name);
        report.finished_at = Utc::now();
        Ok(report)
    }
}
