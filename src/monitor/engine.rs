use chrono::{DateTime, Utc};

use crate::alerts::AlertRequest;
use crate::store::{
    EventType, NewPowerEvent, PowerEvent, PowerStatus, Site, Store, StoreError, elapsed_secs,
    normalize_instant,
};

use super::SiteLocks;
use super::policy::{is_duplicate, is_timed_out};

#[derive(Debug, Clone, PartialEq)]
pub enum HeartbeatOutcome {
    Accepted { received_at: DateTime<Utc> },
    DuplicateIgnored { last_heartbeat_at: DateTime<Utc> },
}

/// A committed power event plus the alert it should trigger, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub event: PowerEvent,
    pub alert: Option<AlertRequest>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HeartbeatReport {
    pub outcome: HeartbeatOutcome,
    pub transition: Option<Transition>,
}

pub async fn on_heartbeat(
    store: &Store,
    locks: &SiteLocks,
    site_id: &str,
    at: DateTime<Utc>,
) -> Result<HeartbeatReport, StoreError> {
    let _guard = locks.lock(site_id).await;
    let mut site = store.load_site(site_id)?;
    apply_heartbeat(store, &mut site, at)
}

pub async fn on_timeout_check(
    store: &Store,
    locks: &SiteLocks,
    site_id: &str,
    now: DateTime<Utc>,
) -> Result<Option<Transition>, StoreError> {
    let _guard = locks.lock(site_id).await;
    let mut site = store.load_site(site_id)?;
    apply_timeout(store, &mut site, now)
}

/// Caller holds the site lock and passes a freshly loaded record.
pub(crate) fn apply_heartbeat(
    store: &Store,
    site: &mut Site,
    at: DateTime<Utc>,
) -> Result<HeartbeatReport, StoreError> {
    let at = normalize_instant(at);
    if let Some(last_heartbeat_at) = site.last_heartbeat_at
        && is_duplicate(site, at)
    {
        log::debug!(
            "heartbeat_duplicate_ignored site={} at={} last_heartbeat_at={}",
            site.id,
            at,
            last_heartbeat_at
        );
        return Ok(HeartbeatReport {
            outcome: HeartbeatOutcome::DuplicateIgnored { last_heartbeat_at },
            transition: None,
        });
    }

    let starting = !site.is_monitoring_active();
    let restoring = !starting && site.current_status == PowerStatus::Off;
    let mut new_event = None;
    if starting {
        site.monitoring_started_at = Some(at);
        site.last_status_change_at = Some(at);
        site.current_status = PowerStatus::On;
        new_event = Some(NewPowerEvent::new(EventType::PowerOn, at, None));
    } else if restoring {
        let duration = site.last_status_change_at.map(|since| elapsed_secs(since, at));
        site.current_status = PowerStatus::On;
        site.last_status_change_at = Some(at);
        new_event = Some(NewPowerEvent::new(EventType::PowerOn, at, duration));
    }
    site.last_heartbeat_at = Some(at);

    let committed = match new_event {
        Some(new_event) => Some(store.commit_transition(site, Some((at, false)), new_event)?),
        None => {
            store.commit_heartbeat(site, at)?;
            None
        }
    };

    let transition = committed.map(|committed| {
        let event = committed.event;
        if starting {
            log::info!("monitoring_started site={} at={}", site.id, at);
            return Transition { event, alert: None };
        }
        let duration = event.previous_state_duration_secs;
        log::info!(
            "power_restored site={} at={} off_duration_secs={:?} event_id={}",
            site.id,
            at,
            duration,
            event.id
        );
        let alert = site
            .alerting_enabled
            .then(|| AlertRequest::for_event(site, EventType::PowerOn, duration, event.id));
        Transition { event, alert }
    });

    Ok(HeartbeatReport {
        outcome: HeartbeatOutcome::Accepted { received_at: at },
        transition,
    })
}

/// Caller holds the site lock and passes a freshly loaded record.
pub(crate) fn apply_timeout(
    store: &Store,
    site: &mut Site,
    now: DateTime<Utc>,
) -> Result<Option<Transition>, StoreError> {
    if site.current_status != PowerStatus::On || site.offline_detection_disabled {
        return Ok(None);
    }
    if !is_timed_out(site, now) {
        return Ok(None);
    }
    let Some(outage_at) = site.last_heartbeat_at else {
        return Ok(None);
    };

    let duration = site
        .last_status_change_at
        .map(|since| elapsed_secs(since, outage_at));
    site.current_status = PowerStatus::Off;
    site.last_status_change_at = Some(outage_at);
    let committed = store.commit_transition(
        site,
        Some((outage_at, true)),
        NewPowerEvent::new(EventType::PowerOff, outage_at, duration),
    )?;
    if committed.heartbeat_inserted {
        log::info!("outage_boundary_heartbeat_inserted site={} at={}", site.id, outage_at);
    }
    let event = committed.event;

    log::warn!(
        "power_outage_detected site={} occurred_at={} detected_at={} on_duration_secs={:?} event_id={}",
        site.id,
        outage_at,
        now,
        duration,
        event.id
    );

    let alert = site
        .alerting_enabled
        .then(|| AlertRequest::for_event(site, EventType::PowerOff, duration, event.id));
    Ok(Some(Transition { event, alert }))
}

/// Marks a stale site off at `now` without attributing an outage instant.
/// The event is recorded as already alerted.
pub(crate) fn apply_forced_offline(
    store: &Store,
    site: &mut Site,
    now: DateTime<Utc>,
) -> Result<Option<PowerEvent>, StoreError> {
    if site.current_status != PowerStatus::On || site.offline_detection_disabled {
        return Ok(None);
    }
    if !is_timed_out(site, now) {
        return Ok(None);
    }

    let now = normalize_instant(now);
    let duration = site.last_status_change_at.map(|since| elapsed_secs(since, now));
    site.current_status = PowerStatus::Off;
    site.last_status_change_at = Some(now);
    let committed = store.commit_transition(
        site,
        None,
        NewPowerEvent::new(EventType::PowerOff, now, duration).already_alerted(now),
    )?;
    Ok(Some(committed.event))
}

#[cfg(test)]
mod tests {
    use crate::monitor::test_support::{Harness, at, test_site};
    use crate::store::{EventType, PowerStatus};

    use super::{HeartbeatOutcome, on_heartbeat, on_timeout_check};

    #[tokio::test]
    async fn first_heartbeat_starts_monitoring() {
        let h = Harness::with_site(test_site("s"));

        let report = on_heartbeat(&h.store, &h.locks, "s", at(0))
            .await
            .expect("heartbeat");

        assert_eq!(report.outcome, HeartbeatOutcome::Accepted { received_at: at(0) });
        let transition = report.transition.expect("initial power on");
        assert_eq!(transition.event.event_type, EventType::PowerOn);
        assert_eq!(transition.event.previous_state_duration_secs, None);
        assert!(transition.alert.is_none());

        let site = h.site("s");
        assert_eq!(site.current_status, PowerStatus::On);
        assert_eq!(site.monitoring_started_at, Some(at(0)));
        assert_eq!(site.last_status_change_at, Some(at(0)));
        assert_eq!(site.last_heartbeat_at, Some(at(0)));
    }

    #[tokio::test]
    async fn heartbeat_within_five_seconds_is_ignored() {
        let h = Harness::with_site(test_site("s"));
        on_heartbeat(&h.store, &h.locks, "s", at(0)).await.expect("first");
        let before = h.site("s");

        let report = on_heartbeat(&h.store, &h.locks, "s", at(4))
            .await
            .expect("second");

        assert_eq!(
            report.outcome,
            HeartbeatOutcome::DuplicateIgnored {
                last_heartbeat_at: at(0)
            }
        );
        assert!(report.transition.is_none());
        assert_eq!(h.site("s"), before);
        assert_eq!(h.store.heartbeat_count("s").expect("count"), 1);
    }

    #[tokio::test]
    async fn silence_past_threshold_flips_off_at_last_heartbeat() {
        let h = Harness::with_site(test_site("s"));
        on_heartbeat(&h.store, &h.locks, "s", at(0)).await.expect("hb 0");
        on_heartbeat(&h.store, &h.locks, "s", at(60)).await.expect("hb 60");

        let early = on_timeout_check(&h.store, &h.locks, "s", at(150))
            .await
            .expect("check 150");
        assert!(early.is_none());

        let transition = on_timeout_check(&h.store, &h.locks, "s", at(151))
            .await
            .expect("check 151")
            .expect("outage");
        assert_eq!(transition.event.event_type, EventType::PowerOff);
        assert_eq!(transition.event.occurred_at, at(60));
        assert_eq!(transition.event.previous_state_duration_secs, Some(60));
        let alert = transition.alert.expect("alert requested");
        assert_eq!(alert.event_type, EventType::PowerOff);
        assert_eq!(alert.event_id, transition.event.id);

        let site = h.site("s");
        assert_eq!(site.current_status, PowerStatus::Off);
        assert_eq!(site.last_status_change_at, Some(at(60)));
        assert_eq!(site.last_heartbeat_at, Some(at(60)));
    }

    #[tokio::test]
    async fn heartbeat_after_outage_restores_power() {
        let h = Harness::with_site(test_site("s"));
        on_heartbeat(&h.store, &h.locks, "s", at(0)).await.expect("hb");
        on_timeout_check(&h.store, &h.locks, "s", at(200))
            .await
            .expect("check")
            .expect("outage");

        let report = on_heartbeat(&h.store, &h.locks, "s", at(400))
            .await
            .expect("restore");
        let transition = report.transition.expect("power on");
        assert_eq!(transition.event.event_type, EventType::PowerOn);
        assert_eq!(transition.event.previous_state_duration_secs, Some(400));
        assert!(transition.alert.is_some());

        let events = h.store.events("s").expect("events");
        let types = events.iter().map(|event| event.event_type).collect::<Vec<_>>();
        assert_eq!(
            types,
            vec![EventType::PowerOn, EventType::PowerOff, EventType::PowerOn]
        );
    }

    #[tokio::test]
    async fn maintenance_mode_suppresses_detection() {
        let mut site = test_site("s");
        site.offline_detection_disabled = true;
        let h = Harness::with_site(site);
        on_heartbeat(&h.store, &h.locks, "s", at(0)).await.expect("hb");

        let result = on_timeout_check(&h.store, &h.locks, "s", at(10_000))
            .await
            .expect("check");
        assert!(result.is_none());
        assert_eq!(h.site("s").current_status, PowerStatus::On);
    }

    #[tokio::test]
    async fn disabled_alerting_records_event_without_request() {
        let mut site = test_site("s");
        site.alerting_enabled = false;
        let h = Harness::with_site(site);
        on_heartbeat(&h.store, &h.locks, "s", at(0)).await.expect("hb");

        let transition = on_timeout_check(&h.store, &h.locks, "s", at(500))
            .await
            .expect("check")
            .expect("outage");
        assert!(transition.alert.is_none());
    }

    #[tokio::test]
    async fn outage_inserts_missing_boundary_heartbeat() {
        let h = Harness::with_site(test_site("s"));
        on_heartbeat(&h.store, &h.locks, "s", at(0)).await.expect("hb");
        h.store
            .delete_heartbeats_between("s", at(0), at(1))
            .expect("drop heartbeat");

        on_timeout_check(&h.store, &h.locks, "s", at(500))
            .await
            .expect("check")
            .expect("outage");
        assert!(h.store.has_heartbeat_at("s", at(0)).expect("lookup"));
        assert_eq!(h.store.synthetic_heartbeat_count("s").expect("count"), 1);
    }

    #[tokio::test]
    async fn received_boundary_heartbeat_stays_real() {
        let h = Harness::with_site(test_site("s"));
        on_heartbeat(&h.store, &h.locks, "s", at(0)).await.expect("hb");

        on_timeout_check(&h.store, &h.locks, "s", at(500))
            .await
            .expect("check")
            .expect("outage");
        assert_eq!(h.store.heartbeat_count("s").expect("count"), 1);
        assert_eq!(h.store.synthetic_heartbeat_count("s").expect("count"), 0);
    }

    #[tokio::test]
    async fn timeout_check_sees_heartbeat_that_won_the_race() {
        let h = Harness::with_site(test_site("s"));
        on_heartbeat(&h.store, &h.locks, "s", at(0)).await.expect("hb 0");
        on_heartbeat(&h.store, &h.locks, "s", at(95)).await.expect("hb 95");

        let result = on_timeout_check(&h.store, &h.locks, "s", at(100))
            .await
            .expect("check");
        assert!(result.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_heartbeat_and_timeout_check_keep_history_alternating() {
        for _ in 0..25 {
            let h = Harness::with_site(test_site("s"));
            on_heartbeat(&h.store, &h.locks, "s", at(0)).await.expect("hb 0");
            on_heartbeat(&h.store, &h.locks, "s", at(60)).await.expect("hb 60");

            let heartbeat = tokio::spawn({
                let (store, locks) = (h.store.clone(), h.locks.clone());
                async move { on_heartbeat(&store, &locks, "s", at(151)).await }
            });
            let check = tokio::spawn({
                let (store, locks) = (h.store.clone(), h.locks.clone());
                async move { on_timeout_check(&store, &locks, "s", at(151)).await }
            });
            heartbeat.await.expect("join").expect("heartbeat");
            check.await.expect("join").expect("check");

            let events = h.store.events("s").expect("events");
            let types = events.iter().map(|event| event.event_type).collect::<Vec<_>>();
            assert!(
                types == vec![EventType::PowerOn]
                    || types
                        == vec![EventType::PowerOn, EventType::PowerOff, EventType::PowerOn],
                "unexpected history {types:?}"
            );
            for pair in events.windows(2) {
                assert_eq!(
                    pair[1].previous_state_duration_secs,
                    Some((pair[1].occurred_at - pair[0].occurred_at).num_seconds())
                );
            }

            let site = h.site("s");
            assert_eq!(site.current_status, PowerStatus::On);
            assert_eq!(site.last_heartbeat_at, Some(at(151)));
            assert_eq!(
                site.last_status_change_at,
                events.last().map(|event| event.occurred_at)
            );
            assert_eq!(h.store.synthetic_heartbeat_count("s").expect("count"), 0);
        }
    }
}
