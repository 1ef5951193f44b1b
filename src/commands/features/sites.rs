use chrono::{DateTime, FixedOffset, Utc};
use teloxide::prelude::*;

use crate::alerts::{Language, format_duration};
use crate::app_context::AppContext;
use crate::config::utc_offset_from_minutes;
use crate::store::{EventType, PowerEvent, PowerStatus, Site, StoreError};

use super::super::helpers::{as_html_block, format_instant, parse_site_arg, send_html};

const RECENT_EVENTS_LIMIT: usize = 10;

/// Stored heartbeats, split into received and monitor-written ones.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct HeartbeatTally {
    pub total: usize,
    pub synthetic: usize,
}

pub(crate) async fn handle_sites(
    bot: &Bot,
    msg: &Message,
    app_context: &AppContext,
) -> ResponseResult<()> {
    let message = match app_context.store.list_sites() {
        Ok(sites) => as_html_block("Sites", &render_site_list(&sites, Utc::now())),
        Err(error) => {
            log::error!("sites_command_failed error={}", error);
            as_html_block("Sites", &format!("Store error: {}", error))
        }
    };
    send_html(bot, msg, message).await
}

pub(crate) async fn handle_site(
    bot: &Bot,
    msg: &Message,
    app_context: &AppContext,
    args: &str,
) -> ResponseResult<()> {
    let site_id = match parse_site_arg(args) {
        Ok(site_id) => site_id,
        Err(error) => return send_html(bot, msg, as_html_block("Site", &error)).await,
    };

    let offset = utc_offset_from_minutes(app_context.runtime_config.read().await.utc_offset_minutes);
    let store = &app_context.store;
    let loaded = store.load_site(site_id).and_then(|site| {
        let events = store.recent_events(site_id, RECENT_EVENTS_LIMIT)?;
        let tally = HeartbeatTally {
            total: store.heartbeat_count(site_id)?,
            synthetic: store.synthetic_heartbeat_count(site_id)?,
        };
        Ok((site, events, tally))
    });

    let message = match loaded {
        Ok((site, events, tally)) => as_html_block(
            &format!("Site {}", site.name),
            &render_site_detail(&site, &events, tally, offset, Utc::now()),
        ),
        Err(StoreError::SiteNotFound(_)) => {
            as_html_block("Site", &format!("Unknown site '{}'. See /sites.", site_id))
        }
        Err(error) => {
            log::error!("site_command_failed site={} error={}", site_id, error);
            as_html_block("Site", &format!("Store error: {}", error))
        }
    };
    send_html(bot, msg, message).await
}

fn status_icon(status: PowerStatus) -> &'static str {
    match status {
        PowerStatus::On => "🟢",
        PowerStatus::Off => "🔴",
        PowerStatus::Unknown => "⚪",
    }
}

fn flags(site: &Site) -> String {
    let mut flags = String::new();
    if site.offline_detection_disabled {
        flags.push_str(" [maintenance]");
    }
    if !site.alerting_enabled {
        flags.push_str(" [alerts off]");
    }
    if site.alerting_failed {
        flags.push_str(" [alert failed]");
    }
    flags
}

fn ago(at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    match at {
        Some(at) => format!(
            "{} ago",
            format_duration(now.signed_duration_since(at).num_seconds(), Language::En)
        ),
        None => "never".to_string(),
    }
}

pub(crate) fn render_site_list(sites: &[Site], now: DateTime<Utc>) -> String {
    if sites.is_empty() {
        return "No sites configured.".to_string();
    }

    sites
        .iter()
        .map(|site| {
            format!(
                "{} {} ({}) {} | heartbeat {}{}",
                status_icon(site.current_status),
                site.id,
                site.name,
                site.current_status.label(),
                ago(site.last_heartbeat_at, now),
                flags(site)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub(crate) fn render_site_detail(
    site: &Site,
    events: &[PowerEvent],
    tally: HeartbeatTally,
    offset: FixedOffset,
    now: DateTime<Utc>,
) -> String {
    let mut body = format!(
        "Status: {} {}{}\nHeartbeat every {}s, grace {}s, reconnect window {}\nMonitoring since: {}\nLast heartbeat: {} ({})\nHeartbeats stored: {} ({} synthetic)\nLast change: {}\nLanguage: {}\n",
        status_icon(site.current_status),
        site.current_status.label(),
        flags(site),
        site.heartbeat_period_secs,
        site.grace_period_secs,
        if site.router_reconnect_enabled { "on" } else { "off" },
        format_instant(site.monitoring_started_at, offset),
        format_instant(site.last_heartbeat_at, offset),
        ago(site.last_heartbeat_at, now),
        tally.total,
        tally.synthetic,
        format_instant(site.last_status_change_at, offset),
        site.language.code(),
    );

    body.push_str("\nRecent events:\n");
    if events.is_empty() {
        body.push_str("none");
        return body;
    }

    for event in events {
        let icon = match event.event_type {
            EventType::PowerOn => "🟢",
            EventType::PowerOff => "🔴",
        };
        let duration = event
            .previous_state_duration_secs
            .map(|secs| format_duration(secs, site.language))
            .unwrap_or_else(|| "-".to_string());
        let alert = if event.alert_sent { "sent" } else { "not sent" };
        body.push_str(&format!(
            "#{} {} {} after {} (alert {})\n",
            event.id,
            icon,
            format_instant(Some(event.occurred_at), offset),
            duration,
            alert
        ));
    }
    body
}

#[cfg(test)]
mod tests {
    use chrono::FixedOffset;

    use crate::monitor::test_support::{at, test_site};
    use crate::store::{EventType, PowerEvent, PowerStatus};

    use super::{HeartbeatTally, render_site_detail, render_site_list};

    #[test]
    fn site_list_shows_status_and_flags() {
        let mut home = test_site("home");
        home.current_status = PowerStatus::On;
        home.last_heartbeat_at = Some(at(0));
        let mut dacha = test_site("dacha");
        dacha.offline_detection_disabled = true;
        dacha.alerting_failed = true;

        let body = render_site_list(&[home, dacha], at(90));
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines[0], "🟢 home (Site home) on | heartbeat 1m 30s ago");
        assert_eq!(
            lines[1],
            "⚪ dacha (Site dacha) unknown | heartbeat never [maintenance] [alert failed]"
        );
    }

    #[test]
    fn empty_site_list_says_so() {
        assert_eq!(render_site_list(&[], at(0)), "No sites configured.");
    }

    #[test]
    fn site_detail_lists_events_with_ids() {
        let mut site = test_site("home");
        site.current_status = PowerStatus::Off;
        let utc = FixedOffset::east_opt(0).expect("utc");
        let events = vec![PowerEvent {
            id: 17,
            site_id: "home".to_string(),
            event_type: EventType::PowerOff,
            occurred_at: at(60),
            previous_state_duration_secs: Some(3600),
            alert_sent: true,
            alert_sent_at: Some(at(151)),
        }];

        let tally = HeartbeatTally {
            total: 12,
            synthetic: 3,
        };
        let body = render_site_detail(&site, &events, tally, utc, at(200));
        assert!(body.starts_with("Status: 🔴 off\n"));
        assert!(body.contains("Heartbeats stored: 12 (3 synthetic)\n"));
        assert!(body.contains("#17 🔴 2023-11-14 22:14:20 after 1h (alert sent)"));
    }
}
