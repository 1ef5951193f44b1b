use teloxide::prelude::*;

use crate::app_context::AppContext;

use super::command_def::MyCommands;
use super::features::{
    admin::{handle_delete_event, handle_maintenance, handle_reset},
    health::{handle_health, handle_help},
    sites::{handle_site, handle_sites},
    timeline::{handle_timeline, handle_week},
};

pub(super) async fn route_command(
    bot: Bot,
    msg: Message,
    cmd: MyCommands,
    app_context: &AppContext,
) -> ResponseResult<()> {
    match cmd {
        MyCommands::Help => handle_help(&bot, &msg).await?,
        MyCommands::Sites => handle_sites(&bot, &msg, app_context).await?,
        MyCommands::Site(args) => handle_site(&bot, &msg, app_context, &args).await?,
        MyCommands::Timeline(args) => handle_timeline(&bot, &msg, app_context, &args).await?,
        MyCommands::Week(args) => handle_week(&bot, &msg, app_context, &args).await?,
        MyCommands::Maintenance(args) => {
            handle_maintenance(&bot, &msg, app_context, &args).await?
        }
        MyCommands::Reset(args) => handle_reset(&bot, &msg, app_context, &args).await?,
        MyCommands::Deleteevent(args) => {
            handle_delete_event(&bot, &msg, app_context, &args).await?
        }
        MyCommands::Health => handle_health(&bot, &msg, app_context).await?,
    }

    Ok(())
}
