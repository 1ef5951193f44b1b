use std::collections::HashSet;

use crate::config::SiteConfig;
use crate::store::{Site, Store, StoreError};

use super::SiteLocks;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncSummary {
    pub created: usize,
    pub updated: usize,
    pub removed: usize,
}

/// Makes the stored sites match the configured ones. Existing sites keep
/// their monitoring state; sites no longer configured are deleted with
/// their history.
pub async fn sync_sites(
    store: &Store,
    locks: &SiteLocks,
    configs: &[SiteConfig],
) -> Result<SyncSummary, StoreError> {
    let mut summary = SyncSummary::default();

    for config in configs {
        let _guard = locks.lock(&config.id).await;
        match store.site(&config.id)? {
            Some(mut site) => {
                let before = site.clone();
                site.apply_config(config);
                if site != before {
                    store.save_site(&site)?;
                    summary.updated += 1;
                }
            }
            None => {
                store.save_site(&Site::from_config(config))?;
                summary.created += 1;
            }
        }
    }

    let configured = configs
        .iter()
        .map(|config| config.id.as_str())
        .collect::<HashSet<_>>();
    for site in store.list_sites()? {
        if configured.contains(site.id.as_str()) {
            continue;
        }
        {
            let _guard = locks.lock(&site.id).await;
            store.remove_site(&site.id)?;
        }
        locks.forget(&site.id);
        summary.removed += 1;
        log::warn!("site_removed site={} reason=not_in_config", site.id);
    }

    log::info!(
        "sites_synced created={} updated={} removed={}",
        summary.created,
        summary.updated,
        summary.removed
    );
    Ok(summary)
}

/// Clears a site's heartbeats and events and rewinds it to unknown.
pub async fn reset_site(store: &Store, locks: &SiteLocks, site_id: &str) -> Result<Site, StoreError> {
    let _guard = locks.lock(site_id).await;
    let mut site = store.load_site(site_id)?;
    store.clear_history(site_id)?;
    site.rewind_monitoring();
    site.alerting_failed = false;
    store.save_site(&site)?;
    log::warn!("site_reset site={}", site_id);
    Ok(site)
}

/// Flips maintenance mode. Enabling it only suppresses future outage
/// detection; a site that is already off stays off.
pub async fn toggle_maintenance(
    store: &Store,
    locks: &SiteLocks,
    site_id: &str,
) -> Result<Site, StoreError> {
    let _guard = locks.lock(site_id).await;
    let mut site = store.load_site(site_id)?;
    site.offline_detection_disabled = !site.offline_detection_disabled;
    store.save_site(&site)?;
    log::info!(
        "maintenance_toggled site={} offline_detection_disabled={}",
        site_id,
        site.offline_detection_disabled
    );
    Ok(site)
}
