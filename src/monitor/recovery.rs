use chrono::{DateTime, Utc};

use crate::store::{PowerStatus, Store, StoreError};

use super::SiteLocks;
use super::engine::apply_forced_offline;

/// Brings cached statuses up to date after a restart, before the first scan.
///
/// Sites that went silent while the process was down are marked off at
/// `now`. The outage instant is unknown, so the events are recorded as
/// already alerted and nothing is dispatched. Returns how many sites were
/// marked off.
pub async fn recover_from_restart(
    store: &Store,
    locks: &SiteLocks,
    now: DateTime<Utc>,
) -> Result<usize, StoreError> {
    let mut recovered = 0;

    for snapshot in store.list_sites()? {
        if !snapshot.is_monitoring_active() || snapshot.current_status != PowerStatus::On {
            continue;
        }

        let _guard = locks.lock(&snapshot.id).await;
        let Some(mut site) = store.site(&snapshot.id)? else {
            continue;
        };
        if let Some(event) = apply_forced_offline(store, &mut site, now)? {
            recovered += 1;
            log::warn!(
                "restart_recovery_marked_offline site={} last_heartbeat_at={:?} on_duration_secs={:?} event_id={}",
                site.id,
                site.last_heartbeat_at,
                event.previous_state_duration_secs,
                event.id
            );
        }
    }

    log::info!("restart_recovery_completed sites_marked_offline={}", recovered);
    Ok(recovered)
}

#[cfg(test)]
mod tests {
    use crate::monitor::engine::on_heartbeat;
    use crate::monitor::scanner::scan_outages;
    use crate::monitor::test_support::{Harness, at, test_site};
    use crate::store::{EventType, PowerStatus};

    use super::recover_from_restart;

    #[tokio::test]
    async fn stale_site_goes_off_without_alert() {
        let h = Harness::with_site(test_site("s"));
        on_heartbeat(&h.store, &h.locks, "s", at(0)).await.expect("hb 0");
        on_heartbeat(&h.store, &h.locks, "s", at(60)).await.expect("hb 60");

        let recovered = recover_from_restart(&h.store, &h.locks, at(3600))
            .await
            .expect("recovery");
        assert_eq!(recovered, 1);

        let site = h.site("s");
        assert_eq!(site.current_status, PowerStatus::Off);
        assert_eq!(site.last_status_change_at, Some(at(3600)));
        assert_eq!(site.last_heartbeat_at, Some(at(60)));

        let event = h.store.latest_event("s").expect("latest").expect("event");
        assert_eq!(event.event_type, EventType::PowerOff);
        assert_eq!(event.occurred_at, at(3600));
        assert_eq!(event.previous_state_duration_secs, Some(3600));
        assert!(event.alert_sent);
        assert_eq!(event.alert_sent_at, Some(at(3600)));

        let summary = scan_outages(&h.store, &h.locks, &h.sink, at(3605))
            .await
            .expect("scan");
        assert_eq!(summary.outages, 0);
        assert!(h.sink.sent().is_empty());
    }

    #[tokio::test]
    async fn fresh_and_maintenance_sites_are_untouched() {
        let mut paused = test_site("paused");
        paused.offline_detection_disabled = true;
        let h = Harness::with_site(paused);
        h.store.save_site(&test_site("fresh")).expect("save");

        on_heartbeat(&h.store, &h.locks, "paused", at(0)).await.expect("hb");
        on_heartbeat(&h.store, &h.locks, "fresh", at(3590)).await.expect("hb");

        let recovered = recover_from_restart(&h.store, &h.locks, at(3600))
            .await
            .expect("recovery");
        assert_eq!(recovered, 0);
        assert_eq!(h.site("paused").current_status, PowerStatus::On);
        assert_eq!(h.site("fresh").current_status, PowerStatus::On);
    }
}
