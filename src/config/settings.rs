//! Controller settings and configuration management

use crate::error::{AppError, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub logging: LoggingConfig,
    pub controller: ControllerConfig,
    pub control_plane: ControlPlaneConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Bounds one whole notification request, all of its records together
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    90
}

/// Shared-token authentication for the notification endpoint
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub tokens: Vec<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

/// Failover controller behaviour
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ControllerConfig {
    /// Notification channel the health alarms publish to. Scopes the peer scan.
    #[serde(default)]
    pub topic_arn: String,
    #[serde(default = "default_alarm_prefix")]
    pub alarm_prefix: String,
    #[serde(default = "default_alarm_delimiter")]
    pub alarm_delimiter: String,
    /// Tag on a route table naming the group that currently serves it
    #[serde(default = "default_route_tag_key")]
    pub route_tag_key: String,
    /// Tag on a group listing its home route tables, comma separated
    #[serde(default = "default_home_tables_tag_key")]
    pub home_tables_tag_key: String,
    #[serde(default = "default_destination")]
    pub default_destination: String,
    #[serde(default = "default_call_timeout")]
    pub call_timeout_ms: u64,
    #[serde(default = "default_handler_deadline")]
    pub handler_deadline_ms: u64,
    #[serde(default = "default_retry_attempts")]
    pub route_retry_attempts: u32,
    #[serde(default = "default_retry_base_delay")]
    pub retry_base_delay_ms: u64,
    #[serde(default)]
    pub per_group_lock: bool,
}

fn default_alarm_prefix() -> String {
    "squid-alarm_".to_string()
}

fn default_alarm_delimiter() -> String {
    "_".to_string()
}

fn default_route_tag_key() -> String {
    "AutoScalingGroupName".to_string()
}

fn default_home_tables_tag_key() -> String {
    "RouteTableIds".to_string()
}

fn default_destination() -> String {
    "0.0.0.0/0".to_string()
}

fn default_call_timeout() -> u64 {
    5000
}

fn default_handler_deadline() -> u64 {
    60000
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_base_delay() -> u64 {
    200
}

impl ControllerConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn handler_deadline(&self) -> Duration {
        Duration::from_millis(self.handler_deadline_ms)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            topic_arn: String::new(),
            alarm_prefix: default_alarm_prefix(),
            alarm_delimiter: default_alarm_delimiter(),
            route_tag_key: default_route_tag_key(),
            home_tables_tag_key: default_home_tables_tag_key(),
            default_destination: default_destination(),
            call_timeout_ms: default_call_timeout(),
            handler_deadline_ms: default_handler_deadline(),
            route_retry_attempts: default_retry_attempts(),
            retry_base_delay_ms: default_retry_base_delay(),
            per_group_lock: false,
        }
    }
}

/// Where the controller reads and writes groups, alarms and route tables
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ControlPlaneConfig {
    #[serde(default = "default_control_plane_kind")]
    pub kind: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_control_plane_timeout")]
    pub timeout_ms: u64,
    /// Topology file used to seed the in-memory control plane
    #[serde(default)]
    pub seed_path: Option<String>,
}

fn default_control_plane_kind() -> String {
    "http".to_string()
}

fn default_control_plane_timeout() -> u64 {
    10000
}

impl Default for ControlPlaneConfig {
    fn default() -> Self {
        Self {
            kind: default_control_plane_kind(),
            endpoint: None,
            timeout_ms: default_control_plane_timeout(),
            seed_path: None,
        }
    }
}

impl Settings {
    /// Load settings from configuration files and environment variables
    pub fn load() -> Result<Self> {
        let path = std::env::var("FAILOVER_CONFIG").unwrap_or_else(|_| "config/default.toml".to_string());
        Self::load_from_path(path)
    }

    /// Load settings from a specific configuration file path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut builder = Config::builder()
            // Start with default values
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("auth.enabled", false)?
            .set_default("logging.level", "info")?
            .set_default("controller.topic_arn", "")?
            .set_default("control_plane.kind", "http")?
            // Load from configuration file
            .add_source(File::with_name(path.as_ref().to_str().unwrap_or("config/default")).required(false))
            // Override with environment variables (prefixed with FAILOVER_)
            .add_source(
                Environment::with_prefix("FAILOVER")
                    .separator("__")
                    .try_parsing(true),
            );

        // The provisioning stack hands the topic to the handler as TOPIC_ARN
        if let Ok(topic) = std::env::var("TOPIC_ARN") {
            builder = builder.set_override("controller.topic_arn", topic)?;
        }

        let settings: Settings = builder.build()?.try_deserialize()?;
        Ok(settings)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(invalid("Server port cannot be 0"));
        }

        let controller = &self.controller;
        if controller.topic_arn.trim().is_empty() {
            return Err(invalid("controller.topic_arn is required"));
        }
        if controller.alarm_prefix.is_empty() || controller.alarm_delimiter.is_empty() {
            return Err(invalid("controller alarm prefix and delimiter cannot be empty"));
        }
        if controller.route_retry_attempts == 0 {
            return Err(invalid("controller.route_retry_attempts must be at least 1"));
        }
        if controller.call_timeout_ms == 0 || controller.handler_deadline_ms == 0 {
            return Err(invalid("controller timeouts must be positive"));
        }
        // The request timeout bounds a whole envelope, the deadline a single record.
        if self.server.request_timeout_secs.saturating_mul(1000) < controller.handler_deadline_ms {
            return Err(invalid(
                "server.request_timeout_secs must be at least controller.handler_deadline_ms",
            ));
        }

        match self.control_plane.kind.as_str() {
            "http" => {
                if self.control_plane.endpoint.as_deref().map_or(true, str::is_empty) {
                    return Err(invalid("control_plane.endpoint is required for the http control plane"));
                }
            }
            "memory" => {}
            other => {
                return Err(invalid(&format!(
                    "Invalid control plane kind '{}'. Must be 'http' or 'memory'",
                    other
                )));
            }
        }

        Ok(())
    }
}

fn invalid(message: &str) -> AppError {
    AppError::Config(config::ConfigError::Message(message.to_string()))
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: default_host(),
                port: default_port(),
                request_timeout_secs: default_request_timeout(),
            },
            auth: AuthConfig::default(),
            logging: LoggingConfig {
                level: default_log_level(),
                format: default_log_format(),
            },
            controller: ControllerConfig::default(),
            control_plane: ControlPlaneConfig::default(),
        }
    }
}
