//! Heartbeat-driven power state: timing policy, the per-site state engine,
//! the periodic outage scan, restart recovery, history reconciliation and
//! day timelines.

mod admin;
mod dispatch;
mod engine;
mod locks;
mod policy;
mod projection;
mod reconcile;
mod recovery;
mod scanner;
mod timeline;

#[cfg(test)]
pub(crate) mod test_support;

pub use admin::{reset_site, sync_sites, toggle_maintenance};
pub use dispatch::spawn_dispatch;
pub use engine::{HeartbeatOutcome, on_heartbeat};
pub use locks::SiteLocks;
pub use reconcile::{HeartbeatRepair, ReconcileReport, delete_power_event};
pub use recovery::recover_from_restart;
pub use scanner::scan_outages;
pub use timeline::{
    DayTimeline, Segment, SegmentStatus, WeekDay, WeekTimeline, local_date, segment_day,
    segment_week,
};
