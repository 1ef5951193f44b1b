use chrono::Utc;
use teloxide::prelude::*;

use crate::alerts::{format_daily_report, format_week_report};
use crate::app_context::AppContext;
use crate::config::utc_offset_from_minutes;
use crate::monitor::{local_date, segment_day, segment_week};
use crate::store::StoreError;

use super::super::helpers::{as_html_block, parse_timeline_args, send_html};

pub(crate) async fn handle_timeline(
    bot: &Bot,
    msg: &Message,
    app_context: &AppContext,
    args: &str,
) -> ResponseResult<()> {
    let offset = utc_offset_from_minutes(app_context.runtime_config.read().await.utc_offset_minutes);
    let now = Utc::now();

    let (site_id, day) = match parse_timeline_args(args, local_date(now, offset)) {
        Ok(parsed) => parsed,
        Err(error) => return send_html(bot, msg, as_html_block("Timeline", &error)).await,
    };

    let store = &app_context.store;
    let rendered = store.load_site(site_id).and_then(|site| {
        let timeline = segment_day(store, &site, day, offset, now)?;
        Ok(format_daily_report(&site.name, site.language, &timeline))
    });

    let message = match rendered {
        Ok(message) => message,
        Err(StoreError::SiteNotFound(_)) => {
            as_html_block("Timeline", &format!("Unknown site '{}'. See /sites.", site_id))
        }
        Err(error) => {
            log::error!("timeline_command_failed site={} error={}", site_id, error);
            as_html_block("Timeline", &format!("Store error: {}", error))
        }
    };
    send_html(bot, msg, message).await
}

pub(crate) async fn handle_week(
    bot: &Bot,
    msg: &Message,
    app_context: &AppContext,
    args: &str,
) -> ResponseResult<()> {
    let offset = utc_offset_from_minutes(app_context.runtime_config.read().await.utc_offset_minutes);
    let now = Utc::now();

    let (site_id, day) = match parse_timeline_args(args, local_date(now, offset)) {
        Ok(parsed) => parsed,
        Err(error) => return send_html(bot, msg, as_html_block("Week", &error)).await,
    };

    let store = &app_context.store;
    let rendered = store.load_site(site_id).and_then(|site| {
        let week = segment_week(store, &site, day, offset, now)?;
        Ok(format_week_report(&site.name, site.language, &week))
    });

    let message = match rendered {
        Ok(message) => message,
        Err(StoreError::SiteNotFound(_)) => {
            as_html_block("Week", &format!("Unknown site '{}'. See /sites.", site_id))
        }
        Err(error) => {
            log::error!("week_command_failed site={} error={}", site_id, error);
            as_html_block("Week", &format!("Store error: {}", error))
        }
    };
    send_html(bot, msg, message).await
}
