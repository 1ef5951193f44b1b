use serde::Deserialize;

use super::defaults::*;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub bot_token: String,
    pub owner_id: u64,
    #[serde(default = "default_scan_interval_secs")]
    pub scan_interval_secs: u64,
    #[serde(default)]
    pub utc_offset_minutes: i32,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub daily_report: DailyReport,
    #[serde(default)]
    pub sites: Vec<SiteConfig>,
}

/// The subset of [`Config`] that hot reload is allowed to change.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub scan_interval_secs: u64,
    pub utc_offset_minutes: i32,
    pub daily_report: DailyReport,
    pub sites: Vec<SiteConfig>,
}

impl RuntimeConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            scan_interval_secs: config.scan_interval_secs,
            utc_offset_minutes: config.utc_offset_minutes,
            daily_report: config.daily_report.clone(),
            sites: config.sites.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: String,
    #[serde(default)]
    pub heartbeat_retention_days: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DailyReport {
    #[serde(default = "default_daily_report_enabled")]
    pub enabled: bool,
    /// Keep a pinned week timeline per site, rolled at midnight and edited
    /// every hour.
    #[serde(default = "default_daily_report_enabled")]
    pub pinned_timeline: bool,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SiteConfig {
    pub id: String,
    pub name: String,
    pub api_key: String,
    pub chat_id: i64,
    #[serde(default = "default_heartbeat_period_secs")]
    pub heartbeat_period_secs: u32,
    #[serde(default = "default_grace_period_secs")]
    pub grace_period_secs: u32,
    #[serde(default)]
    pub router_reconnect_enabled: bool,
    #[serde(default = "default_alerting_enabled")]
    pub alerting_enabled: bool,
    #[serde(default = "default_language")]
    pub language: String,
}
