use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;
use tracing::{error, info, instrument, warn};

use crate::config::AdminList;
use crate::cycle;
use crate::error::{Error, Result};
use crate::model::CycleOutcome;
use crate::publisher::Publisher;
use crate::store::{self, RecordStore};

pub const ACCESS_DENIED: &str = "Access denied.";
pub const NO_READY_RECIPES: &str = "No recipes with status ready.";
pub const NO_MEDIA: &str = "Recipe has no image_path/image_url, nothing to post.";

#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Commands:")]
pub enum Command {
    #[command(description = "list commands")]
    Start,
    #[command(description = "recipe statistics")]
    Stats,
    #[command(description = "publish the next recipe")]
    Next,
}

/// Collaborators shared by every command.
#[derive(Clone)]
pub struct BotState {
    pub store: Arc<dyn RecordStore>,
    pub publisher: Publisher,
    pub admins: AdminList,
}

/// Reply text for `cmd` sent by `sender`. Non-admins are turned away before
/// anything touches the store or the channel.
#[instrument(skip_all, fields(cmd = ?cmd, sender = ?sender))]
pub async fn respond(state: &BotState, sender: Option<i64>, cmd: &Command) -> Result<String> {
    if !sender.is_some_and(|id| state.admins.contains(id)) {
        warn!("rejected command from non-admin");
        return Ok(ACCESS_DENIED.to_string());
    }

    match cmd {
        Command::Start => Ok(Command::descriptions().to_string()),
        Command::Stats => {
            let s = store::collect_stats(state.store.as_ref()).await?;
            Ok(format!(
                "Stats:\n\
                 • Total recipes: {}\n\
                 • Ready: {}\n\
                 • Already posted: {}\n\
                 • Ready, never posted: {}",
                s.total, s.ready, s.posted, s.remaining_ready
            ))
        }
        Command::Next => match cycle::publish_next(state.store.as_ref(), &state.publisher).await {
            Ok(CycleOutcome::Idle) => Ok(NO_READY_RECIPES.to_string()),
            Ok(CycleOutcome::Published { title, .. }) => Ok(format!("Published: {title}")),
            Err(Error::NoMedia { id }) => {
                info!(record_id = %id, "recipe has no media");
                Ok(NO_MEDIA.to_string())
            }
            Err(err) => Err(err),
        },
    }
}

/// teloxide endpoint: run [`respond`] and send whatever it produced.
pub async fn answer(
    bot: &Bot,
    msg: &Message,
    cmd: Command,
    state: &BotState,
) -> ResponseResult<()> {
    let sender = msg.from().map(|u| u.id.0 as i64);
    let reply = match respond(state, sender, &cmd).await {
        Ok(text) => text,
        Err(err) => {
            error!(?err, ?cmd, "command failed");
            format!("Failed: {err}")
        }
    };
    bot.send_message(msg.chat.id, reply).await?;
    Ok(())
}
