//! Decodes alarm notifications into typed alarm transitions

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::backend::traits::AlarmState;
use crate::config::ControllerConfig;
use crate::error::{AppError, Result};

/// A single alarm state change for one gateway group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlarmEvent {
    pub alarm_name: String,
    pub group_name: String,
    pub new_state: AlarmState,
    pub old_state: Option<AlarmState>,
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Maps alarm names to gateway groups: `<prefix><delimiter><group>`
#[derive(Debug, Clone)]
pub struct AlarmNameConvention {
    pub prefix: String,
    pub delimiter: String,
}

impl Default for AlarmNameConvention {
    fn default() -> Self {
        Self {
            prefix: "squid-alarm_".to_string(),
            delimiter: "_".to_string(),
        }
    }
}

impl AlarmNameConvention {
    pub fn from_config(config: &ControllerConfig) -> Self {
        Self {
            prefix: config.alarm_prefix.clone(),
            delimiter: config.alarm_delimiter.clone(),
        }
    }

    /// Group named by the second delimited field of `alarm_name`
    pub fn group_of<'a>(&self, alarm_name: &'a str) -> Option<&'a str> {
        alarm_name
            .split(self.delimiter.as_str())
            .nth(1)
            .filter(|g| !g.is_empty())
    }
}

/// Notification envelope carrying one or more records
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Envelope {
    Batch {
        #[serde(rename = "Records")]
        records: Vec<Record>,
    },
    Single(BareNotification),
}

#[derive(Debug, Deserialize)]
struct Record {
    #[serde(rename = "Sns")]
    sns: Option<Notification>,
}

#[derive(Debug, Deserialize)]
struct Notification {
    #[serde(rename = "Message")]
    message: Option<String>,
    #[serde(rename = "Timestamp")]
    timestamp: Option<String>,
}

/// A notification delivered on its own. Without a `Message` the payload is
/// not a notification at all, so unlike a batched record it is not optional.
#[derive(Debug, Deserialize)]
struct BareNotification {
    #[serde(rename = "Message")]
    message: String,
    #[serde(rename = "Timestamp")]
    timestamp: Option<String>,
}

impl From<BareNotification> for Notification {
    fn from(bare: BareNotification) -> Self {
        Self {
            message: Some(bare.message),
            timestamp: bare.timestamp,
        }
    }
}

#[derive(Debug, Deserialize)]
struct AlarmMessage {
    #[serde(rename = "AlarmName")]
    alarm_name: Option<String>,
    #[serde(rename = "NewStateValue")]
    new_state_value: Option<String>,
    #[serde(rename = "OldStateValue")]
    old_state_value: Option<String>,
    #[serde(rename = "NewStateReason")]
    new_state_reason: Option<String>,
    #[serde(rename = "StateChangeTime")]
    state_change_time: Option<String>,
}

/// Turns raw notification payloads into [`AlarmEvent`]s
#[derive(Debug, Clone, Default)]
pub struct EventIngestor {
    convention: AlarmNameConvention,
}

impl EventIngestor {
    pub fn new(convention: AlarmNameConvention) -> Self {
        Self { convention }
    }

    /// Decode a whole envelope. The outer error means the payload is not an
    /// envelope at all; each record then decodes independently.
    pub fn decode_envelope(&self, payload: &[u8]) -> Result<Vec<Result<AlarmEvent>>> {
        let envelope: Envelope = serde_json::from_slice(payload)
            .map_err(|e| AppError::MalformedEvent(format!("not a notification envelope: {}", e)))?;

        let notifications: Vec<Option<Notification>> = match envelope {
            Envelope::Batch { records } => records.into_iter().map(|r| r.sns).collect(),
            Envelope::Single(notification) => vec![Some(notification.into())],
        };

        debug!(records = notifications.len(), "Decoded notification envelope");

        Ok(notifications
            .into_iter()
            .map(|n| match n {
                Some(n) => self.decode_notification(n),
                None => Err(AppError::MalformedEvent("record has no Sns section".to_string())),
            })
            .collect())
    }

    fn decode_notification(&self, notification: Notification) -> Result<AlarmEvent> {
        let message = notification
            .message
            .ok_or_else(|| AppError::MalformedEvent("notification has no Message".to_string()))?;
        let received_at = notification.timestamp.as_deref().and_then(parse_state_change_time);
        self.decode_message(&message, received_at)
    }

    /// Decode the alarm state-change message carried in a notification
    pub fn decode_message(&self, message: &str, received_at: Option<DateTime<Utc>>) -> Result<AlarmEvent> {
        let alarm: AlarmMessage = serde_json::from_str(message)
            .map_err(|e| AppError::MalformedEvent(format!("alarm message is not JSON: {}", e)))?;

        let alarm_name = alarm
            .alarm_name
            .ok_or_else(|| AppError::MalformedEvent("missing AlarmName".to_string()))?;
        let state_value = alarm
            .new_state_value
            .ok_or_else(|| AppError::MalformedEvent("missing NewStateValue".to_string()))?;

        let new_state = AlarmState::parse(&state_value).ok_or_else(|| {
            AppError::MalformedEvent(format!("unknown NewStateValue '{}'", state_value))
        })?;

        let group_name = self
            .convention
            .group_of(&alarm_name)
            .ok_or_else(|| {
                AppError::MalformedEvent(format!(
                    "alarm name '{}' does not follow <prefix>{}<group>",
                    alarm_name, self.convention.delimiter
                ))
            })?
            .to_string();

        if !alarm_name.starts_with(&self.convention.prefix) {
            warn!(alarm = %alarm_name, prefix = %self.convention.prefix, "Alarm name outside the configured prefix");
        }

        let timestamp = alarm
            .state_change_time
            .as_deref()
            .and_then(parse_state_change_time)
            .or(received_at)
            .unwrap_or_else(Utc::now);

        Ok(AlarmEvent {
            alarm_name,
            group_name,
            new_state,
            old_state: alarm.old_state_value.as_deref().and_then(AlarmState::parse),
            reason: alarm.new_state_reason,
            timestamp,
        })
    }
}

/// Alarm timestamps look like `2021-03-04T05:06:07.890+0000`
fn parse_state_change_time(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f%z")
        .or_else(|_| DateTime::parse_from_rfc3339(value))
        .map(|t| t.with_timezone(&Utc))
        .ok()
}
