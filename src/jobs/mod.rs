use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::app_context::AppContext;

mod config_reload;
mod reports;
mod scheduler;

/// Spawns the scheduler and the config watcher. Both stop once `shutdown`
/// flips to `true`.
pub fn start_background_jobs(
    app_context: AppContext,
    shutdown: watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    vec![
        scheduler::start_scheduler_job(app_context.clone(), shutdown.clone()),
        config_reload::start_config_hot_reload_job(app_context, shutdown),
    ]
}
