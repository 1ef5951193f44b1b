use chrono::Utc;
use tokio::task::JoinHandle;

use crate::alerts::{AlertRequest, AlertSink};
use crate::store::{Store, StoreError};

use super::SiteLocks;

/// Hands a committed transition to the sink and records the outcome.
///
/// Success stamps `alert_sent` on the event and clears `alerting_failed` on
/// the site. Failure only sets `alerting_failed`; the transition stays.
/// Returns whether delivery succeeded.
pub async fn dispatch_alert<S: AlertSink>(
    store: &Store,
    locks: &SiteLocks,
    sink: &S,
    request: &AlertRequest,
) -> bool {
    let delivered = match sink.send_alert(request).await {
        Ok(()) => {
            log::info!(
                "alert_sent site={} event_type={} event_id={}",
                request.site_id,
                request.event_type.label(),
                request.event_id
            );
            true
        }
        Err(error) => {
            log::error!(
                "alert_dispatch_failed site={} event_type={} event_id={} error={}",
                request.site_id,
                request.event_type.label(),
                request.event_id,
                error
            );
            false
        }
    };

    if let Err(error) = record_outcome(store, locks, request, delivered).await {
        log::error!(
            "alert_bookkeeping_failed site={} event_id={} error={}",
            request.site_id,
            request.event_id,
            error
        );
    }

    delivered
}

/// Runs [`dispatch_alert`] on its own task so the caller does not wait on
/// the transport. The handle resolves to the delivery result.
pub fn spawn_dispatch<S>(
    store: &Store,
    locks: &SiteLocks,
    sink: &S,
    request: AlertRequest,
) -> JoinHandle<bool>
where
    S: AlertSink + Clone + 'static,
{
    let (store, locks, sink) = (store.clone(), locks.clone(), sink.clone());
    tokio::spawn(async move { dispatch_alert(&store, &locks, &sink, &request).await })
}

async fn record_outcome(
    store: &Store,
    locks: &SiteLocks,
    request: &AlertRequest,
    delivered: bool,
) -> Result<(), StoreError> {
    let _guard = locks.lock(&request.site_id).await;

    if delivered && let Some(mut event) = store.find_event(&request.site_id, request.event_id)? {
        event.alert_sent = true;
        event.alert_sent_at = Some(Utc::now());
        store.update_event(&event)?;
    }

    // The site may have been removed by a config reload meanwhile.
    let Some(mut site) = store.site(&request.site_id)? else {
        return Ok(());
    };
    if site.alerting_failed == delivered {
        site.alerting_failed = !delivered;
        store.save_site(&site)?;
    }
    Ok(())
}
