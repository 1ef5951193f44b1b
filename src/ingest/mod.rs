//! Inbound heartbeat signal: credential lookup, engine hand-off and the
//! HTTP endpoint devices call.

mod http;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;

use crate::alerts::AlertSink;
use crate::monitor::{HeartbeatOutcome, SiteLocks, on_heartbeat, spawn_dispatch};
use crate::store::{Store, StoreError};

pub use http::HeartbeatServer;

#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    Accepted { received_at: DateTime<Utc> },
    DuplicateIgnored { last_heartbeat_at: DateTime<Utc> },
    Rejected,
}

#[derive(Debug)]
pub struct Ingested {
    pub outcome: IngestOutcome,
    /// Restoration alert delivery running in the background.
    pub alert: Option<JoinHandle<bool>>,
}

impl Ingested {
    fn rejected() -> Self {
        Self {
            outcome: IngestOutcome::Rejected,
            alert: None,
        }
    }
}

/// Authenticates a heartbeat by API key and feeds it to the state engine.
/// A restoration alert is dispatched after the transition is committed and
/// is not awaited here.
pub async fn ingest_heartbeat<S>(
    store: &Store,
    locks: &SiteLocks,
    sink: &S,
    api_key: &str,
    at: DateTime<Utc>,
) -> Result<Ingested, StoreError>
where
    S: AlertSink + Clone + 'static,
{
    let api_key = api_key.trim();
    if api_key.is_empty() {
        log::warn!("heartbeat_rejected reason=missing_api_key");
        return Ok(Ingested::rejected());
    }
    let Some(site) = store.find_site_by_api_key(api_key)? else {
        log::warn!("heartbeat_rejected reason=invalid_api_key");
        return Ok(Ingested::rejected());
    };

    let report = match on_heartbeat(store, locks, &site.id, at).await {
        Ok(report) => report,
        // Removed by a config reload between lookup and lock.
        Err(StoreError::SiteNotFound(_)) => return Ok(Ingested::rejected()),
        Err(error) => return Err(error),
    };

    let alert = report
        .transition
        .and_then(|transition| transition.alert)
        .map(|request| spawn_dispatch(store, locks, sink, request));

    let outcome = match report.outcome {
        HeartbeatOutcome::Accepted { received_at } => {
            log::debug!("heartbeat_accepted site={} at={}", site.id, received_at);
            IngestOutcome::Accepted { received_at }
        }
        HeartbeatOutcome::DuplicateIgnored { last_heartbeat_at } => {
            IngestOutcome::DuplicateIgnored { last_heartbeat_at }
        }
    };
    Ok(Ingested { outcome, alert })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use crate::monitor::scan_outages;
    use crate::monitor::test_support::{Harness, RecordingSink, at, settle, test_site};
    use crate::store::{EventType, PowerStatus};

    use super::{IngestOutcome, ingest_heartbeat};

    #[tokio::test]
    async fn unknown_key_is_rejected_without_state_change() {
        let h = Harness::with_site(test_site("s"));
        let ingested = ingest_heartbeat(&h.store, &h.locks, &h.sink, "wrong", at(0))
            .await
            .expect("ingest");
        assert_eq!(ingested.outcome, IngestOutcome::Rejected);
        assert!(!h.site("s").is_monitoring_active());

        let ingested = ingest_heartbeat(&h.store, &h.locks, &h.sink, "  ", at(0))
            .await
            .expect("ingest");
        assert_eq!(ingested.outcome, IngestOutcome::Rejected);
    }

    #[tokio::test]
    async fn tri_state_outcomes() {
        let h = Harness::with_site(test_site("s"));

        let first = ingest_heartbeat(&h.store, &h.locks, &h.sink, "key-s", at(0))
            .await
            .expect("ingest");
        assert_eq!(first.outcome, IngestOutcome::Accepted { received_at: at(0) });
        assert!(first.alert.is_none());

        let again = ingest_heartbeat(&h.store, &h.locks, &h.sink, "key-s", at(3))
            .await
            .expect("ingest");
        assert_eq!(
            again.outcome,
            IngestOutcome::DuplicateIgnored {
                last_heartbeat_at: at(0)
            }
        );
    }

    #[tokio::test]
    async fn restoration_dispatches_power_on_alert() {
        let h = Harness::with_site(test_site("s"));
        ingest_heartbeat(&h.store, &h.locks, &h.sink, "key-s", at(0))
            .await
            .expect("ingest");
        let scan = scan_outages(&h.store, &h.locks, &h.sink, at(300))
            .await
            .expect("scan");
        settle(scan.pending_alerts).await;

        let ingested = ingest_heartbeat(&h.store, &h.locks, &h.sink, "key-s", at(900))
            .await
            .expect("ingest");
        let delivered = settle(ingested.alert.into_iter().collect()).await;
        assert_eq!(delivered, vec![true]);

        let sent = h.sink.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].event_type, EventType::PowerOn);
        assert_eq!(sent[1].previous_duration_secs, Some(900));
        let event = h
            .store
            .find_event("s", sent[1].event_id)
            .expect("find")
            .expect("event");
        assert!(event.alert_sent);
    }

    #[tokio::test]
    async fn heartbeat_is_answered_before_alert_is_delivered() {
        let h = Harness::with_site(test_site("s"));
        let sink = Arc::new(RecordingSink::slow(Duration::from_secs(5)));
        ingest_heartbeat(&h.store, &h.locks, &sink, "key-s", at(0))
            .await
            .expect("ingest");
        let scan = scan_outages(&h.store, &h.locks, &sink, at(300))
            .await
            .expect("scan");
        for handle in scan.pending_alerts {
            handle.abort();
        }

        let ingested = tokio::time::timeout(
            Duration::from_secs(1),
            ingest_heartbeat(&h.store, &h.locks, &sink, "key-s", at(900)),
        )
        .await
        .expect("ingest returns without waiting for the alert")
        .expect("ingest");

        assert_eq!(ingested.outcome, IngestOutcome::Accepted { received_at: at(900) });
        assert_eq!(h.site("s").current_status, PowerStatus::On);
        let alert = ingested.alert.expect("restoration alert started");
        assert!(!alert.is_finished());
        alert.abort();
    }
}
