use chrono::{DateTime, Utc};

use crate::store::PowerStatus;

use super::policy::TimingPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    On,
    Off,
}

impl Presence {
    pub fn status(self) -> PowerStatus {
        match self {
            Self::On => PowerStatus::On,
            Self::Off => PowerStatus::Off,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub presence: Presence,
}

/// Replays a sorted heartbeat stream the way the live engine would have
/// seen it and returns contiguous presence spans from the first heartbeat
/// up to `horizon`.
///
/// A gap within the threshold keeps the site on. A longer gap is an outage
/// that started at the earlier heartbeat and ended at the later one, which
/// also starts a new on-run for reconnect-grace purposes. `on_since` seeds
/// the on-run that the first heartbeat belongs to.
pub fn replay(
    policy: &TimingPolicy,
    heartbeats: &[DateTime<Utc>],
    on_since: Option<DateTime<Utc>>,
    horizon: DateTime<Utc>,
) -> Vec<Span> {
    let Some(&first) = heartbeats.first() else {
        return Vec::new();
    };

    let mut spans: Vec<Span> = Vec::with_capacity(heartbeats.len());
    let mut run_start = on_since.unwrap_or(first);

    let mut push = |start: DateTime<Utc>, end: DateTime<Utc>, presence: Presence| {
        if end <= start {
            return;
        }
        if let Some(last) = spans.last_mut()
            && last.presence == presence
            && last.end == start
        {
            last.end = end;
            return;
        }
        spans.push(Span {
            start,
            end,
            presence,
        });
    };

    for pair in heartbeats.windows(2) {
        let (previous, next) = (pair[0], pair[1]);
        if policy.silence_exceeds(Some(run_start), previous, next) {
            push(previous, next, Presence::Off);
            run_start = next;
        } else {
            push(previous, next, Presence::On);
        }
    }

    if let Some(&last) = heartbeats.last()
        && horizon > last
    {
        let presence = if policy.silence_exceeds(Some(run_start), last, horizon) {
            Presence::Off
        } else {
            Presence::On
        };
        push(last, horizon, presence);
    }

    spans
}

/// Status the live engine would report at `now` after seeing `heartbeats`.
pub fn derive_status(
    policy: &TimingPolicy,
    heartbeats: &[DateTime<Utc>],
    on_since: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> PowerStatus {
    match heartbeats.last() {
        None => PowerStatus::Unknown,
        Some(&last) if now <= last => PowerStatus::On,
        Some(_) => replay(policy, heartbeats, on_since, now)
            .last()
            .map(|span| span.presence.status())
            .unwrap_or(PowerStatus::On),
    }
}
