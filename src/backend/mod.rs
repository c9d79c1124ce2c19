//! Backend module - Control-plane trait, HTTP client and in-memory directory

pub mod http_backend;
pub mod memory;
pub mod traits;

use std::sync::Arc;
use tracing::info;

use crate::config::ControlPlaneConfig;
use crate::error::{AppError, Result};
use http_backend::HttpControlPlane;
use memory::InMemoryControlPlane;
use traits::ControlPlane;

/// Build the control plane selected by configuration
pub fn from_config(config: &ControlPlaneConfig) -> Result<Arc<dyn ControlPlane>> {
    let control_plane: Arc<dyn ControlPlane> = match config.kind.as_str() {
        "http" => Arc::new(HttpControlPlane::new(config)?),
        "memory" => match &config.seed_path {
            Some(path) => Arc::new(InMemoryControlPlane::from_toml_file(path)?),
            None => Arc::new(InMemoryControlPlane::new()),
        },
        other => {
            return Err(AppError::Config(config::ConfigError::Message(format!(
                "Unknown control plane kind '{}'",
                other
            ))))
        }
    };

    info!(kind = %config.kind, control_plane = %control_plane.name(), "Control plane ready");
    Ok(control_plane)
}
