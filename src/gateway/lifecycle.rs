//! Releases freshly launched gateway instances into service

use std::sync::Arc;
use tracing::{debug, info};

use crate::backend::traits::{ControlPlane, LifecycleResult};
use crate::error::{AppError, Result};
use crate::gateway::call::{best_effort, BestEffort, CallPolicy};

pub struct LifecycleCoordinator {
    control_plane: Arc<dyn ControlPlane>,
    policy: CallPolicy,
}

impl LifecycleCoordinator {
    pub fn new(control_plane: Arc<dyn ControlPlane>, policy: CallPolicy) -> Self {
        Self { control_plane, policy }
    }

    /// Complete the pending launch action of `instance_id` with `CONTINUE`.
    ///
    /// A routine recovery has nothing pending, so every failure here is
    /// logged and reported as skipped.
    pub async fn complete_launch(&self, group: &str, instance_id: &str) -> BestEffort {
        let outcome = best_effort("complete_lifecycle_action", self.try_complete(group, instance_id)).await;
        match &outcome {
            BestEffort::Done => info!(group = %group, instance = %instance_id, "Lifecycle action completed"),
            BestEffort::Skipped(reason) => {
                debug!(group = %group, instance = %instance_id, reason = %reason, "No lifecycle action completed")
            }
        }
        outcome
    }

    async fn try_complete(&self, group: &str, instance_id: &str) -> Result<()> {
        let hooks = self
            .policy
            .call("describe_lifecycle_hooks", self.control_plane.describe_lifecycle_hooks(group))
            .await?;
        let hook = hooks
            .first()
            .ok_or_else(|| AppError::ResourceNotFound(format!("lifecycle hook for group {}", group)))?;

        self.policy
            .call(
                "complete_lifecycle_action",
                self.control_plane
                    .complete_lifecycle_action(hook, group, instance_id, LifecycleResult::Continue),
            )
            .await
    }
}
