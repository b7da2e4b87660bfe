use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;
use tracing::info;

use recipe_poster::config;
use recipe_poster::handlers::{self, BotState, Command};
use recipe_poster::logging;
use recipe_poster::publisher::{DeliveryMode, ObjectStorage, Publisher, TelegramChannel};
use recipe_poster::store::SupabaseStore;

#[derive(Debug, Parser)]
#[command(author, version, about = "Admin bot that publishes recipes on demand")]
struct Args {
    /// Read settings from this dotenv file instead of ./.env
    #[arg(long)]
    env_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();

    let args = Args::parse();
    let cfg = config::load(args.env_file.as_deref())?;
    let admins = cfg.require_admins()?;

    let store = SupabaseStore::from_config(&cfg.store)?;
    let channel = TelegramChannel::from_config(&cfg.telegram, DeliveryMode::Upload)?;
    let publisher = Publisher::new(ObjectStorage::from_config(&cfg.store)?, Arc::new(channel));

    let state = Arc::new(BotState {
        store: Arc::new(store),
        publisher,
        admins,
    });

    let bot = Bot::new(cfg.telegram.bot_token.clone());

    info!(
        admins = state.admins.len(),
        chat_id = %cfg.telegram.chat_id,
        "starting telegram bot"
    );
    teloxide::commands_repl(
        bot,
        move |bot: Bot, msg: Message, cmd: Command| {
            let state = state.clone();
            async move { handlers::answer(&bot, &msg, cmd, &state).await }
        },
        Command::ty(),
    )
    .await;

    Ok(())
}
