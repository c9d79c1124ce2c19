//! Route table lookup by ownership tag and idempotent default-route programming

use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::backend::traits::{ControlPlane, RouteTable};
use crate::error::{AppError, Result};
use crate::gateway::call::CallPolicy;

/// How a default route ended up pointing at its target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Replaced,
    Created,
}

/// Replace/create races tolerated before giving up on a table
const MAX_CONFLICT_ROUNDS: u32 = 2;

/// Route tables and their serving-group tags. Always read live.
pub struct RouteTableRegistry {
    control_plane: Arc<dyn ControlPlane>,
    policy: CallPolicy,
    tag_key: String,
    destination: String,
}

impl RouteTableRegistry {
    pub fn new(
        control_plane: Arc<dyn ControlPlane>,
        policy: CallPolicy,
        tag_key: impl Into<String>,
        destination: impl Into<String>,
    ) -> Self {
        Self {
            control_plane,
            policy,
            tag_key: tag_key.into(),
            destination: destination.into(),
        }
    }

    /// Tables whose serving-group tag currently names `group`
    pub async fn find_by_serving_group(&self, group: &str) -> Result<Vec<RouteTable>> {
        let cp = &self.control_plane;
        let key = self.tag_key.as_str();
        let tables = self
            .policy
            .retry("describe_route_tables", move || cp.describe_route_tables(key, group))
            .await?;
        debug!(group = %group, tables = tables.len(), "Looked up tables served by group");
        Ok(tables)
    }

    /// Point the default route of `table_id` at `instance_id`, whether or not
    /// the route exists yet. Calling it again with the same target is a no-op
    /// in effect.
    pub async fn upsert_default_route(&self, table_id: &str, instance_id: &str) -> Result<UpsertOutcome> {
        let cp = &self.control_plane;
        let destination = self.destination.as_str();

        for _ in 0..MAX_CONFLICT_ROUNDS {
            match self
                .policy
                .retry("replace_route", move || cp.replace_route(table_id, destination, instance_id))
                .await
            {
                Ok(()) => return Ok(UpsertOutcome::Replaced),
                Err(AppError::RouteNotFound { .. }) => {}
                Err(e) => return Err(route_failure(table_id, e)),
            }

            match self
                .policy
                .retry("create_route", move || cp.create_route(table_id, destination, instance_id))
                .await
            {
                Ok(()) => return Ok(UpsertOutcome::Created),
                Err(AppError::RouteAlreadyExists { .. }) => {
                    debug!(table = %table_id, "Default route appeared concurrently, replacing again");
                }
                Err(e) => return Err(route_failure(table_id, e)),
            }
        }

        Err(route_failure(
            table_id,
            AppError::ControlPlane("default route kept flipping between absent and present".to_string()),
        ))
    }

    /// Rewrite the serving-group tag of a table
    pub async fn set_serving_group_tag(&self, table_id: &str, group: &str) -> Result<()> {
        let cp = &self.control_plane;
        let key = self.tag_key.as_str();
        self.policy
            .retry("create_tags", move || cp.create_tags(table_id, key, group))
            .await
            .map_err(|e| route_failure(table_id, e))
    }

    /// Route every table in `table_ids` through `instance_id` and tag it as
    /// served by `group`. The route is written before the tag. A failing table
    /// does not stop the others; failures are reported together afterwards.
    pub async fn program_tables(&self, table_ids: &[String], instance_id: &str, group: &str) -> Result<Vec<String>> {
        let mut updated = Vec::with_capacity(table_ids.len());
        let mut failed = Vec::new();
        let mut reasons = Vec::new();

        for table_id in table_ids {
            let result = match self.upsert_default_route(table_id, instance_id).await {
                Ok(outcome) => self.set_serving_group_tag(table_id, group).await.map(|()| outcome),
                Err(e) => Err(e),
            };

            match result {
                Ok(outcome) => {
                    info!(
                        table = %table_id,
                        instance = %instance_id,
                        group = %group,
                        outcome = ?outcome,
                        "Updated default route"
                    );
                    updated.push(table_id.clone());
                }
                Err(e) => {
                    error!(table = %table_id, instance = %instance_id, error = %e, "Failed to program route table");
                    failed.push(table_id.clone());
                    reasons.push(e.to_string());
                }
            }
        }

        if failed.is_empty() {
            Ok(updated)
        } else {
            if !updated.is_empty() {
                warn!(updated = ?updated, failed = ?failed, "Route tables partially reprogrammed");
            }
            Err(AppError::RouteProgrammingFailure {
                tables: failed,
                reason: reasons.join("; "),
            })
        }
    }
}

fn route_failure(table_id: &str, cause: AppError) -> AppError {
    match cause {
        AppError::RouteProgrammingFailure { .. } | AppError::Timeout(_) => cause,
        other => AppError::RouteProgrammingFailure {
            tables: vec![table_id.to_string()],
            reason: other.to_string(),
        },
    }
}
