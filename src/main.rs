mod alerts;
mod app_context;
mod commands;
mod config;
mod ingest;
mod jobs;
mod monitor;
mod store;

use std::sync::Arc;

use chrono::Utc;
use teloxide::prelude::*;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use crate::alerts::TelegramAlertSink;
use crate::app_context::AppContext;
use crate::commands::{MyCommands, answer};
use crate::config::{Config, load_config};
use crate::ingest::HeartbeatServer;
use crate::jobs::start_background_jobs;
use crate::monitor::{SiteLocks, recover_from_restart, sync_sites};
use crate::store::Store;

fn init_json_logging() {
    if let Err(error) = tracing_log::LogTracer::init() {
        eprintln!(
            "logging bridge initialization failed (continuing with existing logger): {}",
            error
        );
    }

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .json()
        .with_current_span(false)
        .with_span_list(false)
        .finish();

    if let Err(error) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("global logger initialization failed: {}", error);
    }
}

const CONFIG_PATH: &str = "config.toml";

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => log::info!("shutdown_signal_received signal=SIGINT"),
                    _ = terminate.recv() => log::info!("shutdown_signal_received signal=SIGTERM"),
                }
                return;
            }
            Err(error) => {
                log::warn!("sigterm_handler_unavailable error={}", error);
            }
        }
    }

    if let Err(error) = tokio::signal::ctrl_c().await {
        log::error!("ctrl_c_handler_failed error={}", error);
        std::future::pending::<()>().await;
    }
    log::info!("shutdown_signal_received signal=SIGINT");
}

async fn prepare_store(config: &Config, locks: &SiteLocks) -> Option<Store> {
    let store = match Store::open(&config.store.path) {
        Ok(store) => store,
        Err(error) => {
            log::error!("store_open_failed path={} error={}", config.store.path, error);
            return None;
        }
    };

    if let Err(error) = sync_sites(&store, locks, &config.sites).await {
        log::error!("site_sync_failed error={}", error);
        return None;
    }

    match recover_from_restart(&store, locks, Utc::now()).await {
        Ok(recovered) => log::info!("restart_recovery_completed recovered={}", recovered),
        Err(error) => {
            log::error!("restart_recovery_failed error={}", error);
            return None;
        }
    }

    Some(store)
}

// Main
#[tokio::main]
async fn main() {
    init_json_logging();

    let config: Config = match load_config(CONFIG_PATH) {
        Ok(config) => config,
        Err(error) => {
            log::error!("Configuration error: {}", error);
            return;
        }
    };

    log::info!("Powerwatch is starting... sites={}", config.sites.len());

    let site_locks = SiteLocks::new();
    let Some(store) = prepare_store(&config, &site_locks).await else {
        return;
    };

    let bot = Bot::new(&config.bot_token);
    let sink = Arc::new(TelegramAlertSink::new(bot.clone()));
    let app_context = AppContext::new(
        config.clone(),
        CONFIG_PATH,
        store.clone(),
        site_locks.clone(),
        sink.clone(),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks = start_background_jobs(app_context.clone(), shutdown_rx.clone());

    let server = HeartbeatServer::new(store.clone(), site_locks, sink);
    let listen = config.server.listen.clone();
    tasks.push(tokio::spawn(async move {
        if let Err(error) = server.run(&listen, shutdown_rx).await {
            log::error!("heartbeat_server_failed addr={} error={}", listen, error);
        }
    }));

    let repl = MyCommands::repl(bot, move |bot, msg, cmd| {
        let app_context = app_context.clone();
        async move { answer(bot, msg, cmd, &app_context).await }
    });

    tokio::select! {
        _ = repl => log::warn!("command_loop_exited"),
        _ = shutdown_signal() => {}
    }

    let _ = shutdown_tx.send(true);
    for task in tasks {
        if let Err(error) = task.await {
            log::warn!("background_task_join_failed error={}", error);
        }
    }

    match store.flush() {
        Ok(()) => log::info!("Powerwatch stopped"),
        Err(error) => log::error!("store_flush_failed error={}", error),
    }
}
