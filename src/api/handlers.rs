//! Request handlers

use axum::{body::Bytes, extract::State, Json};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{AppError, Result};
use crate::gateway::FailoverReport;
use crate::AppState;

/// Response for a delivered notification envelope
#[derive(Debug, Serialize)]
pub struct NotificationSummary {
    pub reports: Vec<FailoverReport>,
    /// Records that could not be decoded and were dropped
    pub dropped: usize,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Decode every record of the envelope and run the orchestrator once per
/// alarm transition. Malformed records are dropped; the first fatal error is
/// returned after all records had their turn, so the sender retries.
/// Records run one after another, so the router's request timeout caps the
/// whole envelope and not each record.
pub async fn notifications(State(state): State<Arc<AppState>>, body: Bytes) -> Result<Json<NotificationSummary>> {
    let records = state.ingestor.decode_envelope(&body)?;

    let mut reports = Vec::with_capacity(records.len());
    let mut dropped = 0;
    let mut first_fatal: Option<AppError> = None;

    for record in records {
        let event = match record {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "Dropping malformed alarm record");
                dropped += 1;
                continue;
            }
        };

        info!(
            alarm = %event.alarm_name,
            group = %event.group_name,
            state = %event.new_state,
            at = %event.timestamp,
            "Received alarm transition"
        );

        match state.orchestrator.handle(&event).await {
            Ok(report) => reports.push(report),
            Err(e) => {
                if first_fatal.is_none() {
                    first_fatal = Some(e);
                }
            }
        }
    }

    match first_fatal {
        Some(e) => Err(e),
        None => Ok(Json(NotificationSummary { reports, dropped })),
    }
}
