use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Configuration document loaded from `config.json`.
///
/// The `configs` key is historical; it carries the global settings block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(rename = "configs", default)]
    pub settings: GlobalSettings,
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
}

/// Global settings: page identity, incident threshold, tracker selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalSettings {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Seconds a service must stay down before an issue is opened.
    #[serde(default = "default_incident_delay")]
    pub incident_report_delay: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracker: Option<TrackerConfig>,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            title: default_title(),
            description: None,
            incident_report_delay: default_incident_delay(),
            tracker: None,
        }
    }
}

fn default_title() -> String {
    "Status Page".to_string()
}

fn default_incident_delay() -> u64 {
    300
}

/// Issue-tracker coordinates; the platform decides which client is built.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerConfig {
    pub platform: TrackerPlatform,
    pub owner: String,
    pub repo: String,
    /// Required for Gitea; ignored for GitHub.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assignees: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackerPlatform {
    Github,
    Gitea,
}

/// One monitored service as declared in the configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfig {
    pub name: String,
    pub address: String,
    /// Seconds between probes.
    pub ping_interval: u64,
    #[serde(default)]
    pub show_ip: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_status_code: Option<u16>,
}

/// Probe verdict exposed to the API and persisted per service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceHealth {
    Unknown,
    Online,
    Offline,
}

/// Aggregated uptime record for one calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DaySummary {
    pub date: NaiveDate,
    /// Percentage of probes that came back online, 0-100.
    pub uptime: f64,
    pub downtime_hours: f64,
    #[serde(default)]
    pub issue_number: Option<u64>,
}

/// Probe counters for the in-progress day. Never persisted; rebuilt from
/// post-restart probes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayCounters {
    pub online: u64,
    pub total: u64,
}

/// Live state for one service: config overlay, probe results, rolling
/// history, and the incident episode fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceState {
    pub name: String,
    pub address: String,
    #[serde(with = "duration_millis")]
    pub ping_interval: Duration,
    #[serde(default)]
    pub show_ip: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_status_code: Option<u16>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_ping: DateTime<Utc>,
    pub last_status: ServiceHealth,
    #[serde(default)]
    pub last_response_time: Option<u64>,
    #[serde(default)]
    pub daily_history: Vec<DaySummary>,
    #[serde(skip)]
    pub counters: DayCounters,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub downtime_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub incident_reported: bool,
}

/// Everything the engine owns, shared behind `Arc<RwLock<...>>`.
#[derive(Debug, Clone)]
pub struct EngineState {
    pub settings: GlobalSettings,
    pub generated_at: DateTime<Utc>,
    pub services: Vec<ServiceState>,
}

pub type SharedState = Arc<RwLock<EngineState>>;

/// Serializes a `Duration` as integer milliseconds, matching the snapshot
/// layout.
pub mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
