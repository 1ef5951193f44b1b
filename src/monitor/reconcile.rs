use chrono::{DateTime, Duration, Utc};

use crate::store::{
    EventType, PowerEvent, PowerStatus, Site, Store, StoreError, elapsed_secs, normalize_instant,
};

use super::SiteLocks;
use super::policy::TimingPolicy;
use super::projection::derive_status;

/// What happened to the heartbeat log while repairing a deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatRepair {
    /// Synthetic heartbeats now cover the outage the deleted event claimed.
    Backfilled { added: usize },
    /// A heartbeat already bridges the neighbours.
    AlreadyBridged,
    /// No heartbeat on one side of the event, so presence cannot be proven.
    InsufficientEvidence,
    /// Heartbeats that only evidenced the deleted restoration were removed.
    Trimmed { removed: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileReport {
    pub deleted: PowerEvent,
    /// Successor removed because it no longer marked a transition.
    pub collapsed: Option<PowerEvent>,
    /// Event whose duration was recomputed, with its new value.
    pub recomputed: Option<(u64, Option<i64>)>,
    pub heartbeats: HeartbeatRepair,
    pub status: PowerStatus,
}

/// Deletes one historical power event and re-derives everything that
/// depended on it: heartbeats, the surviving neighbour's duration and the
/// site's cached state.
pub async fn delete_power_event(
    store: &Store,
    locks: &SiteLocks,
    site_id: &str,
    event_id: u64,
    now: DateTime<Utc>,
) -> Result<ReconcileReport, StoreError> {
    let _guard = locks.lock(site_id).await;
    let mut site = store.load_site(site_id)?;

    let events = store.events(site_id)?;
    let index = events
        .iter()
        .position(|event| event.id == event_id)
        .ok_or(StoreError::EventNotFound(event_id))?;
    let target = events[index].clone();
    let previous = index.checked_sub(1).and_then(|i| events.get(i)).cloned();
    let next = events.get(index + 1).cloned();

    let collapses = matches!(
        (&previous, &next),
        (Some(p), Some(n)) if p.event_type == n.event_type
    );
    let survivor = if collapses {
        events.get(index + 2).cloned()
    } else {
        next.clone()
    };

    let heartbeats = match target.event_type {
        EventType::PowerOff => repair_after_power_off(store, &site, &target)?,
        EventType::PowerOn => {
            let end = next.as_ref().map_or(now, |event| event.occurred_at);
            repair_after_power_on(store, &site, &target, end)?
        }
    };

    store.delete_event(site_id, target.id)?;

    let collapsed = match next {
        Some(next) if collapses => Some(store.delete_event(site_id, next.id)?),
        _ => None,
    };

    let recomputed = match survivor {
        Some(mut survivor) => {
            let duration = previous
                .as_ref()
                .map(|p| elapsed_secs(p.occurred_at, survivor.occurred_at));
            survivor.previous_state_duration_secs = duration;
            store.update_event(&survivor)?;
            Some((survivor.id, duration))
        }
        None => None,
    };

    let status = refresh_projection(store, &mut site, now)?;

    log::info!(
        "power_event_deleted site={} event_id={} event_type={} collapsed_event={:?} recomputed={:?} heartbeats={:?} status={}",
        site.id,
        target.id,
        target.event_type.label(),
        collapsed.as_ref().map(|event| event.id),
        recomputed,
        heartbeats,
        status.label()
    );

    Ok(ReconcileReport {
        deleted: target,
        collapsed,
        recomputed,
        heartbeats,
        status,
    })
}

fn repair_after_power_off(
    store: &Store,
    site: &Site,
    event: &PowerEvent,
) -> Result<HeartbeatRepair, StoreError> {
    let before = store.heartbeat_before(&site.id, event.occurred_at)?;
    let after = store.heartbeat_after(&site.id, event.occurred_at)?;
    let (Some(before), Some(after)) = (before, after) else {
        log::warn!(
            "reconcile_insufficient_evidence site={} event_id={} heartbeat_before={:?} heartbeat_after={:?}",
            site.id,
            event.id,
            before,
            after
        );
        return Ok(HeartbeatRepair::InsufficientEvidence);
    };

    let bridged = !store
        .heartbeats_between(&site.id, before + Duration::milliseconds(1), after)?
        .is_empty();
    if bridged {
        return Ok(HeartbeatRepair::AlreadyBridged);
    }

    let period = Duration::seconds(i64::from(site.heartbeat_period_secs.max(1)));
    let mut added = 0;
    let mut at = before + period;
    while at < after {
        if store.append_heartbeat(&site.id, at, true)? {
            added += 1;
        }
        at += period;
    }
    Ok(HeartbeatRepair::Backfilled { added })
}

fn repair_after_power_on(
    store: &Store,
    site: &Site,
    event: &PowerEvent,
    end: DateTime<Utc>,
) -> Result<HeartbeatRepair, StoreError> {
    let removed = store.delete_heartbeats_between(&site.id, event.occurred_at, end)?;
    Ok(HeartbeatRepair::Trimmed { removed })
}

/// Re-derives the cached site fields from the stored log and saves them.
pub(crate) fn refresh_projection(
    store: &Store,
    site: &mut Site,
    now: DateTime<Utc>,
) -> Result<PowerStatus, StoreError> {
    let Some(last_heartbeat) = store.latest_heartbeat(&site.id)? else {
        site.rewind_monitoring();
        store.save_site(site)?;
        return Ok(PowerStatus::Unknown);
    };

    let latest_event = store.latest_event(&site.id)?;
    let on_since = store
        .latest_event_at_or_before(&site.id, last_heartbeat)?
        .filter(|event| event.event_type == EventType::PowerOn)
        .map(|event| event.occurred_at);
    let window_start = on_since.unwrap_or(last_heartbeat);
    let heartbeats = store.heartbeats_between(
        &site.id,
        window_start,
        last_heartbeat + Duration::milliseconds(1),
    )?;
    let derived = derive_status(
        &TimingPolicy::for_site(site),
        &heartbeats,
        on_since,
        normalize_instant(now),
    );

    let status = match latest_event.as_ref().map(|event| event.event_type.resulting_status()) {
        Some(recorded) if recorded != derived => {
            log::warn!(
                "reconcile_status_conflict site={} recorded={} derived={} kept=recorded",
                site.id,
                recorded.label(),
                derived.label()
            );
            recorded
        }
        Some(recorded) => recorded,
        None => derived,
    };

    site.current_status = status;
    site.last_heartbeat_at = Some(last_heartbeat);
    site.last_status_change_at = latest_event.map(|event| event.occurred_at);
    if site.monitoring_started_at.is_none() {
        site.monitoring_started_at = store.earliest_heartbeat(&site.id)?;
    }
    store.save_site(site)?;
    Ok(status)
}
