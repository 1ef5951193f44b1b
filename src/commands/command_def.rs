use teloxide::utils::command::BotCommands;

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "Available commands:")]
pub enum MyCommands {
    #[command(description = "Show help menu.")]
    Help,
    #[command(description = "List monitored sites and their power status.")]
    Sites,
    #[command(description = "Show one site with its recent events, e.g. /site home")]
    Site(String),
    #[command(description = "Show a day timeline, e.g. /timeline home 2024-03-01")]
    Timeline(String),
    #[command(description = "Show the week around a day, e.g. /week home 2024-03-01")]
    Week(String),
    #[command(description = "Toggle outage detection for a site, e.g. /maintenance home")]
    Maintenance(String),
    #[command(description = "Wipe a site's history and restart monitoring, e.g. /reset home")]
    Reset(String),
    #[command(description = "Delete a power event and repair history, e.g. /deleteevent home 42")]
    Deleteevent(String),
    #[command(description = "Show bot health and scheduler liveness.")]
    Health,
}
