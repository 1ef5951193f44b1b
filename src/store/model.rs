use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::alerts::Language;
use crate::config::SiteConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerStatus {
    Unknown,
    On,
    Off,
}

impl PowerStatus {
    pub fn label(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::On => "on",
            Self::Off => "off",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    PowerOn,
    PowerOff,
}

impl EventType {
    /// Status a site is left in once this event has happened.
    pub fn resulting_status(self) -> PowerStatus {
        match self {
            Self::PowerOn => PowerStatus::On,
            Self::PowerOff => PowerStatus::Off,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::PowerOn => "power_on",
            Self::PowerOff => "power_off",
        }
    }
}

/// A monitored location: configuration plus the cached power state
/// projected from its heartbeat and event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site {
    pub id: String,
    pub name: String,
    pub api_key: String,
    pub chat_id: i64,
    pub language: Language,
    pub heartbeat_period_secs: u32,
    pub grace_period_secs: u32,
    pub router_reconnect_enabled: bool,
    pub alerting_enabled: bool,
    #[serde(default)]
    pub offline_detection_disabled: bool,
    pub current_status: PowerStatus,
    pub monitoring_started_at: Option<DateTime<Utc>>,
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    pub last_status_change_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub alerting_failed: bool,
}

impl Site {
    pub fn from_config(config: &SiteConfig) -> Self {
        let mut site = Self {
            id: config.id.clone(),
            name: String::new(),
            api_key: String::new(),
            chat_id: 0,
            language: Language::En,
            heartbeat_period_secs: 0,
            grace_period_secs: 0,
            router_reconnect_enabled: false,
            alerting_enabled: false,
            offline_detection_disabled: false,
            current_status: PowerStatus::Unknown,
            monitoring_started_at: None,
            last_heartbeat_at: None,
            last_status_change_at: None,
            alerting_failed: false,
        };
        site.apply_config(config);
        site
    }

    /// Overwrites configuration fields and leaves the monitoring state alone.
    pub fn apply_config(&mut self, config: &SiteConfig) {
        self.name = config.name.clone();
        self.api_key = config.api_key.clone();
        self.chat_id = config.chat_id;
        self.language = Language::parse(&config.language).unwrap_or_default();
        self.heartbeat_period_secs = config.heartbeat_period_secs;
        self.grace_period_secs = config.grace_period_secs;
        self.router_reconnect_enabled = config.router_reconnect_enabled;
        self.alerting_enabled = config.alerting_enabled;
    }

    pub fn is_monitoring_active(&self) -> bool {
        self.monitoring_started_at.is_some()
    }

    /// Rewinds monitoring to the state before the first heartbeat.
    pub fn rewind_monitoring(&mut self) {
        self.current_status = PowerStatus::Unknown;
        self.monitoring_started_at = None;
        self.last_heartbeat_at = None;
        self.last_status_change_at = None;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerEvent {
    pub id: u64,
    pub site_id: String,
    pub event_type: EventType,
    pub occurred_at: DateTime<Utc>,
    pub previous_state_duration_secs: Option<i64>,
    pub alert_sent: bool,
    pub alert_sent_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewPowerEvent {
    pub event_type: EventType,
    pub occurred_at: DateTime<Utc>,
    pub previous_state_duration_secs: Option<i64>,
    pub alert_sent: bool,
    pub alert_sent_at: Option<DateTime<Utc>>,
}

impl NewPowerEvent {
    pub fn new(
        event_type: EventType,
        occurred_at: DateTime<Utc>,
        previous_state_duration_secs: Option<i64>,
    ) -> Self {
        Self {
            event_type,
            occurred_at,
            previous_state_duration_secs,
            alert_sent: false,
            alert_sent_at: None,
        }
    }

    pub fn already_alerted(mut self, at: DateTime<Utc>) -> Self {
        self.alert_sent = true;
        self.alert_sent_at = Some(at);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(super) struct StoredHeartbeat {
    pub received_at: DateTime<Utc>,
    #[serde(default)]
    pub synthetic: bool,
}

/// A chat message that carries one site's timeline for one local day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineMessage {
    pub site_id: String,
    pub day: NaiveDate,
    pub chat_id: i64,
    pub message_id: i32,
    pub pinned: bool,
}

/// Whole seconds between two instants, truncated toward zero.
pub fn elapsed_secs(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    to.signed_duration_since(from).num_seconds()
}
