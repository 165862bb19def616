use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::projection::Viewport;
use crate::source::Fix;

pub const LIVE_OWNER: &str = "user_1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TrackerMode {
    Idle,
    Tracking {
        session_id: Uuid,
        started_at: DateTime<Utc>,
    },
}

impl TrackerMode {
    pub fn is_tracking(&self) -> bool {
        matches!(self, TrackerMode::Tracking { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TrackerEvent {
    Started { session_id: Uuid },
    Recorded { record_id: i64, timestamp: i64 },
    FixRejected { reason: String },
    WriteFailed { reason: String },
    ProviderLost { session_id: Uuid },
    Stopped { session_id: Uuid },
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TrackerStatus {
    pub mode: TrackerMode,
    pub last_fix: Option<Fix>,
    pub viewport: Option<Viewport>,
    pub recorded: u64,
    pub rejected: u64,
    pub write_failures: u64,
    /// Most recent rejection, write failure or provider loss of the current
    /// or last session
    pub last_alert: Option<TrackerEvent>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TrackerSettings {
    #[serde(default = "default_owner_id")]
    pub owner_id: String,
    #[serde(default = "default_min_interval", deserialize_with = "deserialize_duration")]
    pub min_interval: Duration,
    #[serde(
        default = "default_fastest_interval",
        deserialize_with = "deserialize_duration"
    )]
    pub fastest_interval: Duration,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_owner_id() -> String {
    LIVE_OWNER.to_string()
}

fn default_min_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_fastest_interval() -> Duration {
    Duration::from_secs(2)
}

fn default_queue_capacity() -> usize {
    64
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            owner_id: default_owner_id(),
            min_interval: default_min_interval(),
            fastest_interval: default_fastest_interval(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    humantime::parse_duration(s.trim()).map_err(serde::de::Error::custom)
}
