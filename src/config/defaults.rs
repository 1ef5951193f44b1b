use super::schema::{DailyReport, ServerConfig, StoreConfig};

pub(super) fn default_scan_interval_secs() -> u64 {
    5
}

pub(super) fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}

pub(super) fn default_store_path() -> String {
    "data/powerwatch".to_string()
}

pub(super) fn default_daily_report_enabled() -> bool {
    true
}

pub(super) fn default_heartbeat_period_secs() -> u32 {
    60
}

pub(super) fn default_grace_period_secs() -> u32 {
    30
}

pub(super) fn default_alerting_enabled() -> bool {
    true
}

pub(super) fn default_language() -> String {
    "en".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            heartbeat_retention_days: 0,
        }
    }
}

impl Default for DailyReport {
    fn default() -> Self {
        Self {
            enabled: default_daily_report_enabled(),
            pinned_timeline: default_daily_report_enabled(),
        }
    }
}
