use chrono::{DateTime, NaiveDate, NaiveDateTime, Timelike, Utc};
use tokio::sync::watch;
use tokio::time::{Duration, MissedTickBehavior, interval};

use crate::app_context::AppContext;
use crate::config::{RuntimeConfig, utc_offset_from_minutes};
use crate::monitor::scan_outages;

use super::reports::{
    prune_heartbeats, refresh_pinned_timelines, roll_pinned_timelines, send_daily_reports,
};

const TICK: Duration = Duration::from_secs(1);

/// Decides which periodic jobs are due on a given tick.
///
/// The hourly job fires on the first tick and then whenever the local hour
/// changes. The daily job fires once per local date during hour 0; a
/// process that boots outside hour 0 treats today's report as done.
#[derive(Debug)]
pub(crate) struct CadenceGate {
    last_scan: Option<DateTime<Utc>>,
    last_hour: Option<u32>,
    last_daily: Option<NaiveDate>,
}

impl CadenceGate {
    pub(crate) fn new(local_now: NaiveDateTime) -> Self {
        let last_daily = (local_now.hour() != 0).then(|| local_now.date());
        Self {
            last_scan: None,
            last_hour: None,
            last_daily,
        }
    }

    pub(crate) fn scan_due(&mut self, now: DateTime<Utc>, interval_secs: u64) -> bool {
        let interval_secs = i64::try_from(interval_secs).unwrap_or(i64::MAX);
        let due = match self.last_scan {
            None => true,
            Some(last) => now.signed_duration_since(last).num_seconds() >= interval_secs,
        };
        if due {
            self.last_scan = Some(now);
        }
        due
    }

    pub(crate) fn hourly_due(&mut self, local_now: NaiveDateTime) -> bool {
        let hour = local_now.hour();
        if self.last_hour == Some(hour) {
            return false;
        }
        self.last_hour = Some(hour);
        true
    }

    pub(crate) fn daily_due(&mut self, local_now: NaiveDateTime) -> bool {
        let today = local_now.date();
        if local_now.hour() != 0 || self.last_daily == Some(today) {
            return false;
        }
        self.last_daily = Some(today);
        true
    }
}

pub(super) fn start_scheduler_job(
    app_context: AppContext,
    mut shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let startup_runtime = app_context.runtime_config.read().await.clone();
        let mut gate = CadenceGate::new(local_now(&startup_runtime, Utc::now()));
        let mut previous_scan: Option<DateTime<Utc>> = None;

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = app_context.runtime_update_notify.notified() => {
                    log::info!("scheduler_runtime_config_reloaded");
                }
                _ = shutdown.changed() => break,
            }

            let runtime_config = app_context.runtime_config.read().await.clone();
            let now = Utc::now();
            let local = local_now(&runtime_config, now);

            if gate.scan_due(now, runtime_config.scan_interval_secs) {
                if let Some(previous) = previous_scan {
                    let elapsed_secs = now.signed_duration_since(previous).num_seconds().max(0);
                    let threshold_secs = (runtime_config.scan_interval_secs * 2) as i64;
                    if elapsed_secs > threshold_secs {
                        log::warn!(
                            "outage_scan_delayed elapsed_secs={} threshold_secs={}",
                            elapsed_secs,
                            threshold_secs
                        );
                    }
                }
                previous_scan = Some(now);
                run_scan(&app_context, now).await;
            }

            if gate.hourly_due(local) {
                run_hourly_maintenance(&app_context, &runtime_config, now).await;
            }

            if gate.daily_due(local) {
                run_daily_jobs(&app_context, &runtime_config, now).await;
            }
        }

        log::info!("scheduler_stopped");
    })
}

fn local_now(runtime_config: &RuntimeConfig, now: DateTime<Utc>) -> NaiveDateTime {
    now.with_timezone(&utc_offset_from_minutes(runtime_config.utc_offset_minutes))
        .naive_local()
}

async fn run_scan(app_context: &AppContext, now: DateTime<Utc>) {
    {
        let mut tick = app_context.last_scan_tick.lock().await;
        *tick = Some(now);
    }

    // Alert deliveries finish on their own tasks.
    if let Err(error) =
        scan_outages(&app_context.store, &app_context.site_locks, &app_context.sink, now).await
    {
        log::error!("outage_scan_failed error={}", error);
    }
}

async fn run_daily_jobs(app_context: &AppContext, runtime_config: &RuntimeConfig, now: DateTime<Utc>) {
    let offset = utc_offset_from_minutes(runtime_config.utc_offset_minutes);
    let store = &app_context.store;
    let sink = app_context.sink.as_ref();

    if runtime_config.daily_report.enabled
        && let Err(error) = send_daily_reports(store, sink, offset, now).await
    {
        log::error!("daily_report_failed error={}", error);
    }
    if runtime_config.daily_report.pinned_timeline
        && let Err(error) = roll_pinned_timelines(store, sink, offset, now).await
    {
        log::error!("pinned_timeline_roll_failed error={}", error);
    }
}

async fn run_hourly_maintenance(
    app_context: &AppContext,
    runtime_config: &RuntimeConfig,
    now: DateTime<Utc>,
) {
    if runtime_config.daily_report.pinned_timeline {
        let offset = utc_offset_from_minutes(runtime_config.utc_offset_minutes);
        if let Err(error) =
            refresh_pinned_timelines(&app_context.store, app_context.sink.as_ref(), offset, now).await
        {
            log::error!("pinned_timeline_refresh_failed error={}", error);
        }
    }

    let retention_days = app_context.config.store.heartbeat_retention_days;
    match prune_heartbeats(&app_context.store, &app_context.site_locks, retention_days, now).await {
        Ok(removed) if removed > 0 => {
            log::info!(
                "heartbeat_retention_applied removed={} retention_days={}",
                removed,
                retention_days
            );
        }
        Ok(_) => {}
        Err(error) => log::error!("heartbeat_retention_failed error={}", error),
    }
    if let Err(error) = app_context.store.flush() {
        log::warn!("store_flush_failed error={}", error);
    }
}
