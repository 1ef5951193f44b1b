use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Utc};

use crate::alerts::{AlertSink, format_daily_report, format_week_report};
use crate::monitor::{SiteLocks, local_date, segment_day, segment_week};
use crate::store::{Site, Store, StoreError, TimelineMessage};

/// Drops heartbeats older than the retention window for every site, each
/// under its site lock. `retention_days == 0` keeps everything.
pub(crate) async fn prune_heartbeats(
    store: &Store,
    locks: &SiteLocks,
    retention_days: u16,
    now: DateTime<Utc>,
) -> Result<usize, StoreError> {
    if retention_days == 0 {
        return Ok(0);
    }
    let cutoff = now - Duration::days(i64::from(retention_days));
    let mut removed = 0;
    for site in store.list_sites()? {
        let _guard = locks.lock(&site.id).await;
        match store.prune_heartbeats_before(&site.id, cutoff) {
            Ok(count) => removed += count,
            Err(error) => {
                log::error!("heartbeat_prune_failed site={} error={}", site.id, error);
            }
        }
    }
    Ok(removed)
}

fn wants_reports(site: &Site) -> bool {
    site.alerting_enabled && site.is_monitoring_active()
}

/// Sends yesterday's timeline to every monitored site that has alerting
/// enabled. Returns how many reports were delivered.
pub(crate) async fn send_daily_reports<S: AlertSink>(
    store: &Store,
    sink: &S,
    offset: FixedOffset,
    now: DateTime<Utc>,
) -> Result<usize, StoreError> {
    let Some(yesterday) = local_date(now, offset).pred_opt() else {
        return Ok(0);
    };

    let mut delivered = 0;
    for site in store.list_sites()? {
        if !wants_reports(&site) {
            continue;
        }

        let timeline = match segment_day(store, &site, yesterday, offset, now) {
            Ok(timeline) => timeline,
            Err(error) => {
                log::error!("daily_report_timeline_failed site={} error={}", site.id, error);
                continue;
            }
        };
        let message = format_daily_report(&site.name, site.language, &timeline);

        match sink.send_html(site.chat_id, &message).await {
            Ok(()) => delivered += 1,
            Err(error) => {
                log::error!("daily_report_send_failed site={} error={}", site.id, error);
            }
        }
    }

    log::info!("daily_reports_sent day={} delivered={}", yesterday, delivered);
    Ok(delivered)
}

fn render_week(
    store: &Store,
    site: &Site,
    day: NaiveDate,
    offset: FixedOffset,
    now: DateTime<Utc>,
) -> Result<String, StoreError> {
    let week = segment_week(store, site, day, offset, now)?;
    Ok(format_week_report(&site.name, site.language, &week))
}

/// Midnight rollover of the pinned week timeline. Yesterday's message gets
/// a final refresh and is unpinned, then today's is posted and pinned.
/// Returns how many new messages were pinned.
pub(crate) async fn roll_pinned_timelines<S: AlertSink>(
    store: &Store,
    sink: &S,
    offset: FixedOffset,
    now: DateTime<Utc>,
) -> Result<usize, StoreError> {
    let today = local_date(now, offset);
    let mut pinned = 0;

    for site in store.list_sites()? {
        if !wants_reports(&site) {
            continue;
        }
        match roll_site_timeline(store, sink, &site, today, offset, now).await {
            Ok(true) => pinned += 1,
            Ok(false) => {}
            Err(error) => {
                log::error!("timeline_roll_failed site={} day={} error={}", site.id, today, error);
            }
        }
    }

    log::info!("pinned_timelines_rolled day={} pinned={}", today, pinned);
    Ok(pinned)
}

async fn roll_site_timeline<S: AlertSink>(
    store: &Store,
    sink: &S,
    site: &Site,
    today: NaiveDate,
    offset: FixedOffset,
    now: DateTime<Utc>,
) -> Result<bool, StoreError> {
    if let Some(yesterday) = today.pred_opt()
        && let Some(previous) = store.timeline_message(&site.id, yesterday)?
    {
        retire_timeline(store, sink, site, previous, offset, now).await?;
    }

    if store.timeline_message(&site.id, today)?.is_some() {
        return Ok(false);
    }
    let text = render_week(store, site, today, offset, now)?;
    let message_id = match sink.post_pinned(site.chat_id, &text).await {
        Ok(message_id) => message_id,
        Err(error) => {
            log::error!("timeline_pin_failed site={} day={} error={}", site.id, today, error);
            return Ok(false);
        }
    };
    store.save_timeline_message(&TimelineMessage {
        site_id: site.id.clone(),
        day: today,
        chat_id: site.chat_id,
        message_id,
        pinned: true,
    })?;
    Ok(true)
}

async fn retire_timeline<S: AlertSink>(
    store: &Store,
    sink: &S,
    site: &Site,
    message: TimelineMessage,
    offset: FixedOffset,
    now: DateTime<Utc>,
) -> Result<(), StoreError> {
    let text = render_week(store, site, message.day, offset, now)?;
    if let Err(error) = sink.edit_html(message.chat_id, message.message_id, &text).await {
        log::warn!(
            "timeline_final_update_failed site={} day={} error={}",
            site.id,
            message.day,
            error
        );
    }
    if message.pinned
        && let Err(error) = sink.unpin(message.chat_id, message.message_id).await
    {
        log::warn!("timeline_unpin_failed site={} day={} error={}", site.id, message.day, error);
        return Ok(());
    }
    store.remove_timeline_message(&site.id, message.day)
}

/// Edits today's pinned timeline of every site with fresh data. Returns
/// how many messages were updated.
pub(crate) async fn refresh_pinned_timelines<S: AlertSink>(
    store: &Store,
    sink: &S,
    offset: FixedOffset,
    now: DateTime<Utc>,
) -> Result<usize, StoreError> {
    let today = local_date(now, offset);
    let mut updated = 0;

    for site in store.list_sites()? {
        if !wants_reports(&site) {
            continue;
        }
        let Some(message) = store.timeline_message(&site.id, today)? else {
            continue;
        };
        if !message.pinned {
            continue;
        }

        let text = match render_week(store, &site, today, offset, now) {
            Ok(text) => text,
            Err(error) => {
                log::error!("timeline_render_failed site={} day={} error={}", site.id, today, error);
                continue;
            }
        };
        match sink.edit_html(message.chat_id, message.message_id, &text).await {
            Ok(()) => updated += 1,
            Err(error) => {
                log::error!("timeline_refresh_failed site={} day={} error={}", site.id, today, error);
            }
        }
    }

    log::debug!("pinned_timelines_refreshed day={} updated={}", today, updated);
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, FixedOffset, NaiveDate, TimeZone, Utc};

    use crate::monitor::on_heartbeat;
    use crate::monitor::test_support::{Harness, at, test_site};
    use crate::store::TimelineMessage;

    use super::{
        prune_heartbeats, refresh_pinned_timelines, roll_pinned_timelines, send_daily_reports,
    };

    fn day_start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0)
            .single()
            .expect("valid instant")
    }

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).expect("utc")
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).expect("valid date")
    }

    #[tokio::test]
    async fn retention_prunes_old_heartbeats_only() {
        let h = Harness::with_site(test_site("s"));
        for secs in [0, 60, 86_400 * 3] {
            on_heartbeat(&h.store, &h.locks, "s", at(secs)).await.expect("hb");
        }

        let kept = prune_heartbeats(&h.store, &h.locks, 0, at(86_400 * 10))
            .await
            .expect("prune");
        assert_eq!(kept, 0);
        let removed = prune_heartbeats(&h.store, &h.locks, 2, at(86_400 * 3 + 60))
            .await
            .expect("prune");
        assert_eq!(removed, 2);
        assert_eq!(h.store.heartbeat_count("s").expect("count"), 1);
    }

    #[tokio::test]
    async fn retention_waits_for_the_site_lock() {
        let h = Harness::with_site(test_site("s"));
        for secs in [0, 60, 86_400 * 3] {
            on_heartbeat(&h.store, &h.locks, "s", at(secs)).await.expect("hb");
        }

        let guard = h.locks.lock("s").await;
        let prune = tokio::spawn({
            let (store, locks) = (h.store.clone(), h.locks.clone());
            async move { prune_heartbeats(&store, &locks, 2, at(86_400 * 3 + 60)).await }
        });
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(!prune.is_finished());
        assert_eq!(h.store.heartbeat_count("s").expect("count"), 3);

        drop(guard);
        assert_eq!(prune.await.expect("join").expect("prune"), 2);
    }

    #[tokio::test]
    async fn daily_report_goes_to_monitored_sites() {
        let h = Harness::with_site(test_site("watched"));
        let mut quiet = test_site("quiet");
        quiet.alerting_enabled = false;
        h.store.save_site(&quiet).expect("save");
        h.store.save_site(&test_site("idle")).expect("save");

        for minute in 0..10 {
            let at = day_start() + Duration::minutes(minute);
            on_heartbeat(&h.store, &h.locks, "watched", at).await.expect("hb");
            on_heartbeat(&h.store, &h.locks, "quiet", at).await.expect("hb");
        }

        let now = day_start() + Duration::days(1) + Duration::minutes(5);
        let delivered = send_daily_reports(&h.store, &h.sink, utc(), now)
            .await
            .expect("reports");

        assert_eq!(delivered, 1);
        let reports = h.sink.reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].0, -100);
        assert!(reports[0].1.contains("2024-03-01"));
        assert!(reports[0].1.contains("Outages: <b>1</b>"));
    }

    #[tokio::test]
    async fn midnight_roll_retires_yesterday_and_pins_today() {
        let h = Harness::with_site(test_site("s"));
        let mut quiet = test_site("quiet");
        quiet.alerting_enabled = false;
        h.store.save_site(&quiet).expect("save");
        for minute in 0..10 {
            let at = day_start() + Duration::minutes(minute);
            on_heartbeat(&h.store, &h.locks, "s", at).await.expect("hb");
            on_heartbeat(&h.store, &h.locks, "quiet", at).await.expect("hb");
        }

        let first = roll_pinned_timelines(&h.store, &h.sink, utc(), day_start() + Duration::minutes(10))
            .await
            .expect("roll");
        assert_eq!(first, 1);
        let record = h
            .store
            .timeline_message("s", date(1))
            .expect("lookup")
            .expect("today recorded");
        assert!(record.pinned);
        assert!(h.store.timeline_message("quiet", date(1)).expect("lookup").is_none());

        let next_midnight = day_start() + Duration::days(1) + Duration::minutes(1);
        let second = roll_pinned_timelines(&h.store, &h.sink, utc(), next_midnight)
            .await
            .expect("roll");
        assert_eq!(second, 1);

        let posted = h.sink.posted();
        assert_eq!(posted.len(), 2);
        assert_eq!(posted[0].message_id, record.message_id);
        assert!(!posted[0].pinned);
        assert_eq!(posted[0].edits, 1);
        assert!(posted[0].text.contains("2024-03-01"));
        assert!(posted[1].pinned);
        assert!(posted[1].text.contains("2024-03-02"));

        assert!(h.store.timeline_message("s", date(1)).expect("lookup").is_none());
        let today = h
            .store
            .timeline_message("s", date(2))
            .expect("lookup")
            .expect("today recorded");
        assert_eq!(today.message_id, posted[1].message_id);

        let again = roll_pinned_timelines(&h.store, &h.sink, utc(), next_midnight)
            .await
            .expect("roll");
        assert_eq!(again, 0);
        assert_eq!(h.sink.posted().len(), 2);
    }

    #[tokio::test]
    async fn hourly_refresh_edits_only_todays_pinned_message() {
        let h = Harness::with_site(test_site("s"));
        h.store.save_site(&test_site("other")).expect("save");
        for minute in 0..10 {
            let at = day_start() + Duration::minutes(minute);
            on_heartbeat(&h.store, &h.locks, "s", at).await.expect("hb");
            on_heartbeat(&h.store, &h.locks, "other", at).await.expect("hb");
        }
        roll_pinned_timelines(&h.store, &h.sink, utc(), day_start() + Duration::minutes(10))
            .await
            .expect("roll");
        h.store.remove_timeline_message("other", date(1)).expect("forget");
        h.store
            .save_timeline_message(&TimelineMessage {
                site_id: "other".to_string(),
                day: date(1),
                chat_id: -100,
                message_id: 99,
                pinned: false,
            })
            .expect("save");

        let updated = refresh_pinned_timelines(&h.store, &h.sink, utc(), day_start() + Duration::hours(3))
            .await
            .expect("refresh");

        assert_eq!(updated, 1);
        let posted = h.sink.posted();
        let edited = posted.iter().filter(|message| message.edits == 1).count();
        assert_eq!(edited, 1);
        assert!(posted.iter().any(|message| message.text.contains('▁')));
    }
}
