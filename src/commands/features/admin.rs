use chrono::Utc;
use teloxide::prelude::*;

use crate::app_context::AppContext;
use crate::monitor::{HeartbeatRepair, ReconcileReport, delete_power_event, reset_site, toggle_maintenance};
use crate::store::StoreError;

use super::super::helpers::{as_html_block, parse_delete_args, parse_site_arg, send_html};

pub(crate) async fn handle_maintenance(
    bot: &Bot,
    msg: &Message,
    app_context: &AppContext,
    args: &str,
) -> ResponseResult<()> {
    let site_id = match parse_site_arg(args) {
        Ok(site_id) => site_id,
        Err(error) => return send_html(bot, msg, as_html_block("Maintenance", &error)).await,
    };

    let body = match toggle_maintenance(&app_context.store, &app_context.site_locks, site_id).await {
        Ok(site) if site.offline_detection_disabled => format!(
            "Outage detection paused for {}. Current status stays {}.",
            site.name,
            site.current_status.label()
        ),
        Ok(site) => format!("Outage detection resumed for {}.", site.name),
        Err(error) => store_error_text(site_id, &error),
    };
    send_html(bot, msg, as_html_block("Maintenance", &body)).await
}

pub(crate) async fn handle_reset(
    bot: &Bot,
    msg: &Message,
    app_context: &AppContext,
    args: &str,
) -> ResponseResult<()> {
    let site_id = match parse_site_arg(args) {
        Ok(site_id) => site_id,
        Err(error) => return send_html(bot, msg, as_html_block("Reset", &error)).await,
    };

    let body = match reset_site(&app_context.store, &app_context.site_locks, site_id).await {
        Ok(site) => format!(
            "History of {} cleared. Monitoring restarts with the next heartbeat.",
            site.name
        ),
        Err(error) => store_error_text(site_id, &error),
    };
    send_html(bot, msg, as_html_block("Reset", &body)).await
}

pub(crate) async fn handle_delete_event(
    bot: &Bot,
    msg: &Message,
    app_context: &AppContext,
    args: &str,
) -> ResponseResult<()> {
    let (site_id, event_id) = match parse_delete_args(args) {
        Ok(parsed) => parsed,
        Err(error) => return send_html(bot, msg, as_html_block("Delete event", &error)).await,
    };

    let result = delete_power_event(
        &app_context.store,
        &app_context.site_locks,
        site_id,
        event_id,
        Utc::now(),
    )
    .await;
    let body = match result {
        Ok(report) => render_reconcile_report(&report),
        Err(error) => store_error_text(site_id, &error),
    };
    send_html(bot, msg, as_html_block("Delete event", &body)).await
}

fn store_error_text(site_id: &str, error: &StoreError) -> String {
    match error {
        StoreError::SiteNotFound(_) => format!("Unknown site '{}'. See /sites.", site_id),
        StoreError::EventNotFound(event_id) => {
            format!("Site '{}' has no event #{}.", site_id, event_id)
        }
        other => {
            log::error!("admin_command_failed site={} error={}", site_id, other);
            format!("Store error: {}", other)
        }
    }
}

pub(crate) fn render_reconcile_report(report: &ReconcileReport) -> String {
    let mut lines = vec![format!(
        "Deleted #{} ({})",
        report.deleted.id,
        report.deleted.event_type.label()
    )];
    if let Some(collapsed) = &report.collapsed {
        lines.push(format!(
            "Also removed #{} ({}), it no longer marked a change",
            collapsed.id,
            collapsed.event_type.label()
        ));
    }
    if let Some((event_id, duration)) = report.recomputed {
        let duration = duration
            .map(|secs| format!("{}s", secs))
            .unwrap_or_else(|| "none".to_string());
        lines.push(format!("Recomputed duration of #{}: {}", event_id, duration));
    }
    lines.push(match report.heartbeats {
        HeartbeatRepair::Backfilled { added } => format!("Heartbeats backfilled: {}", added),
        HeartbeatRepair::AlreadyBridged => "Heartbeats already cover the gap".to_string(),
        HeartbeatRepair::InsufficientEvidence => {
            "Heartbeats left as-is: no evidence on both sides".to_string()
        }
        HeartbeatRepair::Trimmed { removed } => format!("Heartbeats removed: {}", removed),
    });
    lines.push(format!("Site status: {}", report.status.label()));
    lines.join("\n")
}
