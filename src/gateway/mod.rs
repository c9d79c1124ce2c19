//! Gateway module - Instance directory, route registry, lifecycle and failover orchestration

pub mod call;
pub mod instance_directory;
pub mod lifecycle;
pub mod orchestrator;
pub mod route_registry;

pub use call::{best_effort, BestEffort, CallPolicy};
pub use instance_directory::{GatewayGroup, HealthyPeer, InstanceDirectory};
pub use lifecycle::LifecycleCoordinator;
pub use orchestrator::{FailoverAction, FailoverOrchestrator, FailoverReport};
pub use route_registry::{RouteTableRegistry, UpsertOutcome};
