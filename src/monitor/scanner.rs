use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;

use crate::alerts::AlertSink;
use crate::store::{PowerStatus, Store, StoreError};

use super::SiteLocks;
use super::dispatch::spawn_dispatch;
use super::engine::on_timeout_check;

#[derive(Debug, Default)]
pub struct ScanSummary {
    pub checked: usize,
    pub outages: usize,
    pub failures: usize,
    /// Alert deliveries still in flight, one per outage that asked for one.
    pub pending_alerts: Vec<JoinHandle<bool>>,
}

/// One pass of timeout checks over every monitored site that is on.
///
/// Only failing to list sites aborts the pass. A failure on one site is
/// logged and the pass moves on. Alerts are handed to background tasks, so
/// a slow transport never holds up the remaining sites.
pub async fn scan_outages<S>(
    store: &Store,
    locks: &SiteLocks,
    sink: &S,
    now: DateTime<Utc>,
) -> Result<ScanSummary, StoreError>
where
    S: AlertSink + Clone + 'static,
{
    let mut summary = ScanSummary::default();

    for site in store.list_sites()? {
        if !site.is_monitoring_active() || site.current_status != PowerStatus::On {
            continue;
        }
        summary.checked += 1;

        let transition = match on_timeout_check(store, locks, &site.id, now).await {
            Ok(transition) => transition,
            Err(StoreError::SiteNotFound(_)) => continue,
            Err(error) => {
                summary.failures += 1;
                log::error!("outage_scan_site_failed site={} error={}", site.id, error);
                continue;
            }
        };

        let Some(transition) = transition else {
            continue;
        };
        summary.outages += 1;

        if let Some(request) = transition.alert {
            summary
                .pending_alerts
                .push(spawn_dispatch(store, locks, sink, request));
        }
    }

    tracing::info!(
        target: "scanner",
        module = "scanner",
        checked = summary.checked,
        outages = summary.outages,
        failures = summary.failures,
        alerts = summary.pending_alerts.len(),
        "outage_scan_completed"
    );

    Ok(summary)
}
