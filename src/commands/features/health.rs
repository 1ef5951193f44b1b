use chrono::Utc;
use teloxide::{prelude::*, utils::command::BotCommands};

use crate::app_context::AppContext;
use crate::store::PowerStatus;

use super::super::{
    command_def::MyCommands,
    helpers::{as_html_block, send_html},
};

pub(crate) async fn handle_help(bot: &Bot, msg: &Message) -> ResponseResult<()> {
    send_html(
        bot,
        msg,
        as_html_block(
            "Available commands",
            &MyCommands::descriptions().to_string(),
        ),
    )
    .await
}

pub(crate) async fn handle_health(
    bot: &Bot,
    msg: &Message,
    app_context: &AppContext,
) -> ResponseResult<()> {
    let runtime_config = app_context.runtime_config.read().await.clone();
    let last_tick = *app_context.last_scan_tick.lock().await;
    let now = Utc::now();
    let threshold_secs = (runtime_config.scan_interval_secs * 2) as i64;

    let mut body = match last_tick {
        Some(tick) => {
            let lag_secs = now.signed_duration_since(tick).num_seconds().max(0);
            let status_line = if lag_secs > threshold_secs {
                format!(
                    "⚠️ CRITICAL: Outage scanner is delayed. Last scan: {}s ago (threshold: {}s)",
                    lag_secs, threshold_secs
                )
            } else {
                format!(
                    "✅ Healthy. Last outage scan: {}s ago (threshold: {}s)",
                    lag_secs, threshold_secs
                )
            };

            format!(
                "{}\n\nScan interval: {}s\nCurrent time: {}\nLast scan: {}",
                status_line,
                runtime_config.scan_interval_secs,
                now.to_rfc3339(),
                tick.to_rfc3339()
            )
        }
        None => format!(
            "⏳ Warming up...\n\nOutage scanner has not run yet.\nScan interval: {}s\nCurrent time: {}",
            runtime_config.scan_interval_secs,
            now.to_rfc3339()
        ),
    };

    match app_context.store.list_sites() {
        Ok(sites) => {
            let count = |status: PowerStatus| sites.iter().filter(|site| site.current_status == status).count();
            let failing = sites.iter().filter(|site| site.alerting_failed).count();
            body.push_str(&format!(
                "\n\nSites: {} (on {}, off {}, unknown {})\nSites with a failed alert: {}",
                sites.len(),
                count(PowerStatus::On),
                count(PowerStatus::Off),
                count(PowerStatus::Unknown),
                failing
            ));
        }
        Err(error) => {
            log::error!("health_command_store_failed error={}", error);
            body.push_str(&format!("\n\nStore error: {}", error));
        }
    }

    send_html(bot, msg, as_html_block("Bot Health", &body)).await
}
