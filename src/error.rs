//! Common error types for the failover controller

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    #[error("No healthy peer gateway found for prefix '{0}'")]
    NoHealthyPeer(String),

    #[error("No healthy instance in gateway group '{0}'")]
    NoHealthyInstance(String),

    #[error("Gateway group not found: {0}")]
    GroupNotFound(String),

    #[error("Gateway group '{0}' carries no home route tables tag")]
    MissingHomeRouteTables(String),

    #[error("No route to {destination} in route table {table}")]
    RouteNotFound { table: String, destination: String },

    #[error("Route to {destination} already exists in route table {table}")]
    RouteAlreadyExists { table: String, destination: String },

    #[error("Failed to program route tables [{}]: {reason}", .tables.join(", "))]
    RouteProgrammingFailure { tables: Vec<String>, reason: String },

    #[error("Control plane error: {0}")]
    ControlPlane(String),

    #[error("Control plane {operation} returned {status}: {body}")]
    ControlPlaneStatus {
        operation: String,
        status: u16,
        body: String,
    },

    #[error("Control plane resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Whether the error aborts the current event and must reach the invoking platform.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, AppError::MalformedEvent(_))
    }

    /// Whether retrying the same control-plane call may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::HttpClient(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            AppError::ControlPlaneStatus { status, .. } => *status == 429 || *status >= 500,
            AppError::ControlPlane(_) | AppError::Timeout(_) | AppError::Io(_) => true,
            _ => false,
        }
    }

    fn kind(&self) -> (StatusCode, &'static str, Option<&'static str>) {
        match self {
            AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "server_error", None),
            AppError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "server_error", None),
            AppError::Json(_) => (StatusCode::BAD_REQUEST, "invalid_event_error", Some("invalid_json")),
            AppError::HttpClient(_) => (StatusCode::BAD_GATEWAY, "control_plane_error", None),
            AppError::MalformedEvent(_) => (StatusCode::BAD_REQUEST, "invalid_event_error", Some("malformed_event")),
            AppError::NoHealthyPeer(_) => (StatusCode::SERVICE_UNAVAILABLE, "failover_error", Some("no_healthy_peer")),
            AppError::NoHealthyInstance(_) => (StatusCode::SERVICE_UNAVAILABLE, "failover_error", Some("no_healthy_instance")),
            AppError::GroupNotFound(_) => (StatusCode::INTERNAL_SERVER_ERROR, "failover_error", Some("group_not_found")),
            AppError::MissingHomeRouteTables(_) => (StatusCode::INTERNAL_SERVER_ERROR, "failover_error", Some("missing_home_route_tables")),
            AppError::RouteNotFound { .. } | AppError::RouteAlreadyExists { .. } => {
                (StatusCode::BAD_GATEWAY, "control_plane_error", None)
            }
            AppError::RouteProgrammingFailure { .. } => (StatusCode::BAD_GATEWAY, "failover_error", Some("route_programming_failure")),
            AppError::ControlPlane(_) | AppError::ControlPlaneStatus { .. } | AppError::ResourceNotFound(_) => {
                (StatusCode::BAD_GATEWAY, "control_plane_error", None)
            }
            AppError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "authentication_error", Some("invalid_token")),
            AppError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "timeout_error", None),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "server_error", None),
        }
    }
}

/// Error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub message: String,
    pub r#type: String,
    pub code: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, code) = self.kind();

        let body = Json(ErrorResponse {
            error: ErrorDetail {
                message: self.to_string(),
                r#type: error_type.to_string(),
                code: code.map(|c| c.to_string()),
            },
        });

        (status, body).into_response()
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;
