use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, Notify, RwLock};

use crate::alerts::TelegramAlertSink;
use crate::config::{Config, RuntimeConfig};
use crate::monitor::SiteLocks;
use crate::store::Store;

#[derive(Clone)]
pub struct AppContext {
    pub config: Config,
    pub runtime_config: Arc<RwLock<RuntimeConfig>>,
    pub runtime_update_notify: Arc<Notify>,
    pub store: Store,
    pub site_locks: SiteLocks,
    pub sink: Arc<TelegramAlertSink>,
    pub last_scan_tick: Arc<Mutex<Option<DateTime<Utc>>>>,
    pub config_path: String,
}

impl AppContext {
    pub fn new(
        config: Config,
        config_path: impl Into<String>,
        store: Store,
        site_locks: SiteLocks,
        sink: Arc<TelegramAlertSink>,
    ) -> Self {
        let runtime_config = RuntimeConfig::from_config(&config);
        Self {
            config,
            runtime_config: Arc::new(RwLock::new(runtime_config)),
            runtime_update_notify: Arc::new(Notify::new()),
            store,
            site_locks,
            sink,
            last_scan_tick: Arc::new(Mutex::new(None)),
            config_path: config_path.into(),
        }
    }

    pub async fn update_runtime_config(&self, runtime_config: RuntimeConfig) {
        {
            let mut current = self.runtime_config.write().await;
            *current = runtime_config;
        }
        self.runtime_update_notify.notify_waiters();
    }
}
