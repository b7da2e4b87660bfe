use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use recipe_poster::config;
use recipe_poster::cycle;
use recipe_poster::logging;
use recipe_poster::model::CycleOutcome;
use recipe_poster::publisher::{DeliveryMode, ObjectStorage, Publisher, TelegramChannel};
use recipe_poster::store::SupabaseStore;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Publish the next ready recipe to the channel and exit"
)]
struct Args {
    /// Read settings from this dotenv file instead of ./.env
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Show what would be posted without sending or marking anything
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();

    let args = Args::parse();
    let cfg = config::load(args.env_file.as_deref())?;

    let store = SupabaseStore::from_config(&cfg.store)?;
    let channel = TelegramChannel::from_config(&cfg.telegram, DeliveryMode::Url)?;
    let publisher = Publisher::new(ObjectStorage::from_config(&cfg.store)?, Arc::new(channel));

    if args.dry_run {
        match cycle::preview_next(&store, &publisher).await? {
            None => println!("No ready recipes found."),
            Some(preview) => {
                println!("Next: {}", preview.record.id);
                println!(
                    "Photo: {}",
                    preview.photo_url.as_deref().unwrap_or("<none>")
                );
                println!("Caption:\n{}", preview.caption);
            }
        }
        return Ok(());
    }

    match cycle::publish_next(&store, &publisher).await? {
        CycleOutcome::Idle => println!("No ready recipes found."),
        CycleOutcome::Published {
            record_id,
            message_id,
            ..
        } => {
            info!(%record_id, message_id, "cycle complete");
            println!("Posted: {record_id}");
        }
    }
    Ok(())
}
