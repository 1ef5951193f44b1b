use std::fs;
use std::sync::Arc;

use teloxide::Bot;
use tempfile::tempdir;

use crate::{
    alerts::TelegramAlertSink,
    app_context::AppContext,
    config::{RuntimeConfig, load_config},
    monitor::SiteLocks,
    store::Store,
};

use super::apply_runtime_reload_from_path;

fn config_toml(scan_interval_secs: u64, sites: &[(&str, &str)]) -> String {
    let mut raw = format!(
        r#"bot_token = "123456:abc"
owner_id = 123456789
scan_interval_secs = {scan_interval_secs}
utc_offset_minutes = 120

[daily_report]
enabled = true
"#
    );
    for (id, name) in sites {
        raw.push_str(&format!(
            "\n[[sites]]\nid = \"{id}\"\nname = \"{name}\"\napi_key = \"key-{id}\"\nchat_id = -100\n"
        ));
    }
    raw
}

async fn app_for(config_path: &std::path::Path) -> AppContext {
    let initial = load_config(config_path).expect("initial config should load");
    let store = Store::temporary().expect("temporary store");
    let locks = SiteLocks::new();
    crate::monitor::sync_sites(&store, &locks, &initial.sites)
        .await
        .expect("initial sync");
    AppContext::new(
        initial,
        config_path.to_string_lossy().to_string(),
        store,
        locks,
        Arc::new(TelegramAlertSink::new(Bot::new("123456:abc"))),
    )
}

#[tokio::test]
async fn hot_reload_applies_valid_runtime_changes_without_restart() {
    let temp = tempdir().expect("tempdir should be created");
    let config_path = temp.path().join("config.toml");
    fs::write(&config_path, config_toml(5, &[("home", "Home")]))
        .expect("initial config should be written");
    let app = app_for(&config_path).await;

    fs::write(
        &config_path,
        config_toml(12, &[("home", "Home sweet home"), ("dacha", "Dacha")]),
    )
    .expect("updated config should be written");

    let applied = apply_runtime_reload_from_path(&app, &config_path.to_string_lossy())
        .await
        .expect("valid hot-reload should apply");

    let current = app.runtime_config.read().await.clone();
    assert_eq!(applied.scan_interval_secs, 12);
    assert_eq!(current.scan_interval_secs, 12);
    assert_eq!(current.sites.len(), 2);

    let home = app.store.load_site("home").expect("home should exist");
    assert_eq!(home.name, "Home sweet home");
    assert!(app.store.site("dacha").expect("lookup").is_some());
}

#[tokio::test]
async fn hot_reload_removes_sites_dropped_from_config() {
    let temp = tempdir().expect("tempdir should be created");
    let config_path = temp.path().join("config.toml");
    fs::write(&config_path, config_toml(5, &[("home", "Home"), ("dacha", "Dacha")]))
        .expect("initial config should be written");
    let app = app_for(&config_path).await;

    fs::write(&config_path, config_toml(5, &[("home", "Home")]))
        .expect("updated config should be written");
    apply_runtime_reload_from_path(&app, &config_path.to_string_lossy())
        .await
        .expect("valid hot-reload should apply");

    assert!(app.store.site("dacha").expect("lookup").is_none());
    assert!(app.store.site("home").expect("lookup").is_some());
}

#[tokio::test]
async fn hot_reload_rejects_invalid_config_and_preserves_last_runtime() {
    let temp = tempdir().expect("tempdir should be created");
    let config_path = temp.path().join("config.toml");
    fs::write(&config_path, config_toml(5, &[("home", "Home")]))
        .expect("initial config should be written");
    let app = app_for(&config_path).await;
    let expected_runtime = RuntimeConfig::from_config(&app.config);

    fs::write(&config_path, config_toml(0, &[])).expect("invalid config should be written");

    let error = apply_runtime_reload_from_path(&app, &config_path.to_string_lossy())
        .await
        .expect_err("invalid config should be rejected");
    assert!(error.contains("scan_interval_secs must be greater than 0"));

    let current = app.runtime_config.read().await.clone();
    assert_eq!(current.scan_interval_secs, expected_runtime.scan_interval_secs);
    assert_eq!(current.sites.len(), 1);
    assert!(app.store.site("home").expect("lookup").is_some());
}
