use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, Utc};
use serde::Serialize;

use crate::store::{EventType, Site, Store, StoreError};

use super::policy::TimingPolicy;
use super::projection::{Presence, replay};

const MILLIS_PER_HOUR: f64 = 3_600_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentStatus {
    On,
    Off,
    NoData,
}

impl From<Presence> for SegmentStatus {
    fn from(presence: Presence) -> Self {
        match presence {
            Presence::On => Self::On,
            Presence::Off => Self::Off,
        }
    }
}

/// Half-open `[start_hour, end_hour)` slice of a local day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Segment {
    pub start_hour: f64,
    pub end_hour: f64,
    pub status: SegmentStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayTimeline {
    pub day: NaiveDate,
    pub segments: Vec<Segment>,
}

impl DayTimeline {
    pub fn total_hours(&self, status: SegmentStatus) -> f64 {
        self.segments
            .iter()
            .filter(|segment| segment.status == status)
            .map(|segment| segment.end_hour - segment.start_hour)
            .sum()
    }

    pub fn outage_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|segment| segment.status == SegmentStatus::Off)
            .count()
    }

    pub fn status_at(&self, hour: f64) -> Option<SegmentStatus> {
        self.segments
            .iter()
            .find(|segment| segment.start_hour <= hour && hour < segment.end_hour)
            .map(|segment| segment.status)
    }
}

/// One row of a week view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeekDay {
    pub timeline: DayTimeline,
    /// `false` for days past the target date, shown from the previous week.
    pub current_week: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeekTimeline {
    pub target: NaiveDate,
    pub days: Vec<WeekDay>,
}

/// Monday to Sunday of the week holding `target`. Days after `target`
/// have not happened yet, so the same weekday of the previous week stands
/// in and is flagged `false`.
pub fn week_days(target: NaiveDate) -> Vec<(NaiveDate, bool)> {
    let monday = target - Duration::days(i64::from(target.weekday().num_days_from_monday()));
    (0..7)
        .map(|offset| {
            let day = monday + Duration::days(offset);
            if day <= target {
                (day, true)
            } else {
                (day - Duration::days(7), false)
            }
        })
        .collect()
}

pub fn segment_week(
    store: &Store,
    site: &Site,
    target: NaiveDate,
    offset: FixedOffset,
    now: DateTime<Utc>,
) -> Result<WeekTimeline, StoreError> {
    let days = week_days(target)
        .into_iter()
        .map(|(day, current_week)| {
            Ok(WeekDay {
                timeline: segment_day(store, site, day, offset, now)?,
                current_week,
            })
        })
        .collect::<Result<Vec<_>, StoreError>>()?;
    Ok(WeekTimeline { target, days })
}

/// UTC instant at which the local `day` starts.
pub fn local_day_start(day: NaiveDate, offset: FixedOffset) -> DateTime<Utc> {
    let local_midnight = day.and_time(NaiveTime::MIN);
    (local_midnight - Duration::seconds(i64::from(offset.local_minus_utc()))).and_utc()
}

pub fn local_date(at: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    at.with_timezone(&offset).date_naive()
}

/// Builds the gap-free status sequence of one local day for a site.
pub fn segment_day(
    store: &Store,
    site: &Site,
    day: NaiveDate,
    offset: FixedOffset,
    now: DateTime<Utc>,
) -> Result<DayTimeline, StoreError> {
    let day_start = local_day_start(day, offset);
    let day_end = day_start + Duration::days(1);

    let mut heartbeats = Vec::new();
    if let Some(before) = store.heartbeat_before(&site.id, day_start)? {
        heartbeats.push(before);
    }
    heartbeats.extend(store.heartbeats_between(&site.id, day_start, day_end)?);
    if let Some(after) = store.heartbeat_after(&site.id, day_end - Duration::milliseconds(1))? {
        heartbeats.push(after);
    }

    let on_since = match heartbeats.first() {
        Some(&first) => store
            .latest_event_at_or_before(&site.id, first)?
            .filter(|event| event.event_type == EventType::PowerOn)
            .map(|event| event.occurred_at),
        None => None,
    };

    let segments = build_segments(
        &TimingPolicy::for_site(site),
        &heartbeats,
        on_since,
        site.monitoring_started_at,
        day_start,
        now,
    );
    Ok(DayTimeline { day, segments })
}

/// Classifies `heartbeats` (sorted, including one context heartbeat on
/// each side of the day when available) into segments covering the
/// 24 hours that start at `day_start`.
pub fn build_segments(
    policy: &TimingPolicy,
    heartbeats: &[DateTime<Utc>],
    on_since: Option<DateTime<Utc>>,
    monitoring_started_at: Option<DateTime<Utc>>,
    day_start: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Vec<Segment> {
    let day_end = day_start + Duration::days(1);
    let whole_day = vec![Segment {
        start_hour: 0.0,
        end_hour: 24.0,
        status: SegmentStatus::NoData,
    }];

    let Some(started_at) = monitoring_started_at else {
        return whole_day;
    };
    if started_at >= day_end || now <= day_start {
        return whole_day;
    }

    let window_start = day_start.max(started_at);
    let window_end = day_end.min(now);

    let hour_of = |at: DateTime<Utc>| (at - day_start).num_milliseconds() as f64 / MILLIS_PER_HOUR;

    let mut segments: Vec<Segment> = Vec::new();
    let mut push = |start_hour: f64, end_hour: f64, status: SegmentStatus| {
        if end_hour <= start_hour {
            return;
        }
        if let Some(last) = segments.last_mut()
            && last.status == status
            && last.end_hour == start_hour
        {
            last.end_hour = end_hour;
            return;
        }
        segments.push(Segment {
            start_hour,
            end_hour,
            status,
        });
    };

    let mut cursor = 0.0;
    for span in replay(policy, heartbeats, on_since, now) {
        let start = span.start.max(window_start);
        let end = span.end.min(window_end);
        if end <= start {
            continue;
        }
        let (start_hour, end_hour) = (hour_of(start), hour_of(end));
        push(cursor, start_hour, SegmentStatus::NoData);
        push(start_hour, end_hour, span.presence.into());
        cursor = end_hour;
    }
    push(cursor, 24.0, SegmentStatus::NoData);

    segments
}
