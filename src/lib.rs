//! Gateway failover controller
//!
//! Reacts to per-gateway health alarm transitions by re-pointing the default
//! route of private route tables at a healthy forward-proxy gateway, and hands
//! route tables back to their home gateway group once it recovers.

pub mod api;
pub mod backend;
pub mod config;
pub mod error;
pub mod event;
pub mod gateway;
pub mod middleware;

pub use error::{AppError, Result};

use std::sync::Arc;

use backend::traits::ControlPlane;
use event::{AlarmNameConvention, EventIngestor};
use gateway::FailoverOrchestrator;

/// Application state shared across all handlers
pub struct AppState {
    pub settings: Arc<crate::config::Settings>,
    pub ingestor: EventIngestor,
    pub orchestrator: Arc<FailoverOrchestrator>,
}

impl AppState {
    pub fn new(settings: crate::config::Settings, control_plane: Arc<dyn ControlPlane>) -> Self {
        let ingestor = EventIngestor::new(AlarmNameConvention::from_config(&settings.controller));
        let orchestrator = Arc::new(FailoverOrchestrator::new(control_plane, &settings.controller));

        Self {
            settings: Arc::new(settings),
            ingestor,
            orchestrator,
        }
    }
}
