use chrono::{DateTime, Duration, Utc};

use crate::store::{PowerStatus, Site};

/// Silence after a power restoration during which the wider threshold may apply.
pub const ROUTER_RECONNECT_WINDOW_SECS: i64 = 300;
/// Extra tolerance granted while the reconnect window is open.
pub const ROUTER_RECONNECT_GRACE_SECS: i64 = 180;
/// Heartbeats closer than this to the previous one are retransmissions.
pub const DUPLICATE_WINDOW_SECS: i64 = 5;

/// Timeout arithmetic for one site, detached from the site record so the
/// same rules can be replayed over historical heartbeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingPolicy {
    pub heartbeat_period_secs: i64,
    pub grace_period_secs: i64,
    pub router_reconnect_enabled: bool,
}

impl TimingPolicy {
    pub fn for_site(site: &Site) -> Self {
        Self {
            heartbeat_period_secs: i64::from(site.heartbeat_period_secs),
            grace_period_secs: i64::from(site.grace_period_secs),
            router_reconnect_enabled: site.router_reconnect_enabled,
        }
    }

    pub fn base_threshold_secs(&self) -> i64 {
        self.heartbeat_period_secs + self.grace_period_secs
    }

    /// `on_since` is the start of the current on-run, `None` when the site
    /// is not on.
    pub fn reconnect_grace_applies(
        &self,
        on_since: Option<DateTime<Utc>>,
        last_heartbeat: DateTime<Utc>,
    ) -> bool {
        self.router_reconnect_enabled
            && on_since.is_some_and(|since| {
                last_heartbeat - since <= Duration::seconds(ROUTER_RECONNECT_WINDOW_SECS)
            })
    }

    pub fn threshold_secs(
        &self,
        on_since: Option<DateTime<Utc>>,
        last_heartbeat: DateTime<Utc>,
    ) -> i64 {
        if self.reconnect_grace_applies(on_since, last_heartbeat) {
            self.base_threshold_secs() + ROUTER_RECONNECT_GRACE_SECS
        } else {
            self.base_threshold_secs()
        }
    }

    /// Whether silence from `last_heartbeat` until `until` exceeds the threshold.
    pub fn silence_exceeds(
        &self,
        on_since: Option<DateTime<Utc>>,
        last_heartbeat: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> bool {
        until - last_heartbeat > Duration::seconds(self.threshold_secs(on_since, last_heartbeat))
    }
}

fn on_since(site: &Site) -> Option<DateTime<Utc>> {
    if site.current_status == PowerStatus::On {
        site.last_status_change_at
    } else {
        None
    }
}

pub fn timeout_threshold(site: &Site) -> i64 {
    let policy = TimingPolicy::for_site(site);
    match site.last_heartbeat_at {
        Some(last_heartbeat) => policy.threshold_secs(on_since(site), last_heartbeat),
        None => policy.base_threshold_secs(),
    }
}

pub fn is_timed_out(site: &Site, now: DateTime<Utc>) -> bool {
    let Some(last_heartbeat) = site.last_heartbeat_at else {
        return false;
    };
    TimingPolicy::for_site(site).silence_exceeds(on_since(site), last_heartbeat, now)
}

pub fn is_duplicate(site: &Site, at: DateTime<Utc>) -> bool {
    site.last_heartbeat_at
        .is_some_and(|last| at - last < Duration::seconds(DUPLICATE_WINDOW_SECS))
}
