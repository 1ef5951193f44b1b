use chrono::Datelike;

use crate::monitor::{DayTimeline, Segment, SegmentStatus, WeekDay, WeekTimeline};
use crate::store::EventType;

use super::{AlertRequest, Language};

pub fn format_duration(seconds: i64, language: Language) -> String {
    let seconds = seconds.max(0);
    let (unit_s, unit_m, unit_h) = language.units();

    if seconds < 60 {
        return format!("{seconds}{unit_s}");
    }

    if seconds < 3600 {
        let minutes = seconds / 60;
        let secs = seconds % 60;
        if secs > 0 {
            return format!("{minutes}{unit_m} {secs}{unit_s}");
        }
        return format!("{minutes}{unit_m}");
    }

    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    if minutes > 0 {
        format!("{hours}{unit_h} {minutes}{unit_m}")
    } else {
        format!("{hours}{unit_h}")
    }
}

pub fn format_power_alert(request: &AlertRequest) -> String {
    let icon = match request.event_type {
        EventType::PowerOff => "🔴",
        EventType::PowerOn => "🟢",
    };
    let language = request.language;

    let mut message = format!(
        "{} <b>{}</b>\n📍 {}\n",
        icon,
        language.event_title(request.event_type),
        html_escape::encode_text(&request.site_name)
    );

    if let Some(seconds) = request.previous_duration_secs {
        message.push_str(&format!(
            "\n⚡ {}: <b>{}</b>",
            language.previous_state_label(request.event_type),
            format_duration(seconds, language)
        ));
    }

    message
}

pub fn format_daily_report(site_name: &str, language: Language, timeline: &DayTimeline) -> String {
    let labels = language.daily_report_labels();
    let mut message = format!(
        "📊 <b>{}</b>\n📍 {} · {}\n\n",
        language.daily_report_title(),
        html_escape::encode_text(site_name),
        timeline.day.format("%Y-%m-%d")
    );

    let hours_to_secs = |hours: f64| (hours * 3600.0).round() as i64;
    message.push_str(&format!(
        "🟢 {}: <b>{}</b>\n🔴 {}: <b>{}</b>\n",
        labels.on,
        format_duration(hours_to_secs(timeline.total_hours(SegmentStatus::On)), language),
        labels.off,
        format_duration(hours_to_secs(timeline.total_hours(SegmentStatus::Off)), language),
    ));

    let no_data = timeline.total_hours(SegmentStatus::NoData);
    if no_data > 0.0 {
        message.push_str(&format!(
            "⚪ {}: <b>{}</b>\n",
            labels.no_data,
            format_duration(hours_to_secs(no_data), language)
        ));
    }

    message.push_str(&format!("⚡ {}: <b>{}</b>\n", labels.outages, timeline.outage_count()));

    if !timeline.segments.is_empty() {
        message.push_str("\n<pre>");
        for segment in &timeline.segments {
            message.push_str(&segment_line(segment));
            message.push('\n');
        }
        message.push_str("</pre>");
    }

    message
}

/// Seven rows, one per weekday, each an hour-by-hour strip of the day.
pub fn format_week_report(site_name: &str, language: Language, week: &WeekTimeline) -> String {
    let mut message = format!(
        "📅 <b>{}</b>\n📍 {} · {}\n\n<pre>",
        language.week_report_title(),
        html_escape::encode_text(site_name),
        week.target.format("%Y-%m-%d")
    );

    for row in &week.days {
        message.push_str(&week_row(language, row));
        message.push('\n');
    }
    message.push_str("</pre>");

    if week.days.iter().any(|row| !row.current_week) {
        message.push_str(&format!("\n* {}", language.previous_week_note()));
    }
    message
}

fn week_row(language: Language, row: &WeekDay) -> String {
    let day = row.timeline.day;
    format!(
        "{} {} {}{}",
        language.weekday(day.weekday()),
        day.format("%d.%m"),
        hour_strip(&row.timeline),
        if row.current_week { "" } else { " *" }
    )
}

fn segment_line(segment: &Segment) -> String {
    format!(
        "{} {}–{}",
        segment_icon(segment.status),
        format_hour(segment.start_hour),
        format_hour(segment.end_hour)
    )
}

/// 24 cells, each the status at the middle of that hour.
fn hour_strip(timeline: &DayTimeline) -> String {
    (0..24)
        .map(|hour| match timeline.status_at(f64::from(hour) + 0.5) {
            Some(SegmentStatus::On) => '█',
            Some(SegmentStatus::Off) => '▁',
            Some(SegmentStatus::NoData) | None => '·',
        })
        .collect()
}

fn segment_icon(status: SegmentStatus) -> &'static str {
    match status {
        SegmentStatus::On => "🟢",
        SegmentStatus::Off => "🔴",
        SegmentStatus::NoData => "⚪",
    }
}

/// Renders a fractional hour of the day as `HH:MM`.
pub(crate) fn format_hour(hour: f64) -> String {
    let total_minutes = (hour * 60.0).round().clamp(0.0, 24.0 * 60.0) as i64;
    format!("{:02}:{:02}", total_minutes / 60, total_minutes % 60)
}
