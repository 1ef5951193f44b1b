use std::path::Path;

use notify::{Config as NotifyConfig, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::watch;

use crate::app_context::AppContext;
use crate::config::{Config, RuntimeConfig, load_config};
use crate::monitor::sync_sites;

async fn apply_runtime_reload_from_path(
    app_context: &AppContext,
    config_path: &str,
) -> Result<RuntimeConfig, String> {
    let new_config = load_config(config_path).map_err(|error| error.to_string())?;
    warn_on_restart_only_changes(&app_context.config, &new_config);

    let summary = sync_sites(&app_context.store, &app_context.site_locks, &new_config.sites)
        .await
        .map_err(|error| format!("site sync failed: {error}"))?;
    log::info!(
        "config_hot_reload_sites created={} updated={} removed={}",
        summary.created,
        summary.updated,
        summary.removed
    );

    let runtime_config = RuntimeConfig::from_config(&new_config);
    app_context.update_runtime_config(runtime_config.clone()).await;
    Ok(runtime_config)
}

fn warn_on_restart_only_changes(current: &Config, next: &Config) {
    if current.bot_token != next.bot_token || current.owner_id != next.owner_id {
        log::warn!("config_hot_reload_restart_required field=telegram");
    }
    if current.server.listen != next.server.listen {
        log::warn!(
            "config_hot_reload_restart_required field=server.listen value={}",
            next.server.listen
        );
    }
    if current.store.path != next.store.path {
        log::warn!(
            "config_hot_reload_restart_required field=store.path value={}",
            next.store.path
        );
    }
}

pub(super) fn start_config_hot_reload_job(
    app_context: AppContext,
    mut shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        let config_path = app_context.config_path.clone();
        let mut watcher = match RecommendedWatcher::new(
            move |result| {
                let _ = tx.send(result);
            },
            NotifyConfig::default(),
        ) {
            Ok(watcher) => watcher,
            Err(error) => {
                log::warn!("config hot-reload disabled: watcher init failed: {}", error);
                return;
            }
        };

        if let Err(error) = watcher.watch(Path::new(config_path.as_str()), RecursiveMode::NonRecursive)
        {
            log::warn!(
                "config hot-reload disabled: failed to watch {}: {}",
                config_path,
                error
            );
            return;
        }

        loop {
            let event_result = tokio::select! {
                received = rx.recv() => match received {
                    Some(event_result) => event_result,
                    None => break,
                },
                _ = shutdown.changed() => break,
            };

            let event = match event_result {
                Ok(event) => event,
                Err(error) => {
                    log::warn!("config hot-reload event error: {}", error);
                    continue;
                }
            };

            let should_reload = matches!(
                event.kind,
                EventKind::Create(_) | EventKind::Modify(_) | EventKind::Any
            );
            if !should_reload {
                continue;
            }

            match apply_runtime_reload_from_path(&app_context, config_path.as_str()).await {
                Ok(runtime_config) => {
                    log::info!(
                        "config_hot_reload_applied target=runtime scan_interval_secs={} utc_offset_minutes={} daily_report={} sites={}",
                        runtime_config.scan_interval_secs,
                        runtime_config.utc_offset_minutes,
                        runtime_config.daily_report.enabled,
                        runtime_config.sites.len(),
                    );
                }
                Err(error) => {
                    log::warn!("config hot-reload ignored invalid config: {}", error);
                }
            }
        }

        log::info!("config_hot_reload_stopped");
    })
}

#[cfg(test)]
mod tests;
