use std::sync::Arc;

use teloxide::{prelude::*, utils::command::BotCommands};
use tokio::sync::Mutex;
use tracing::info;

use crate::config::Config;
use crate::storage::CardRegistry;
use crate::treasury::TaxReconciler;
use crate::worker::ClaimWorker;

/// State shared across all bot handlers.
pub struct BotState {
    pub config: Config,
    pub registry: Arc<Mutex<CardRegistry>>,
    pub worker: Arc<ClaimWorker>,
    pub reconciler: TaxReconciler,
}

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "These commands are supported:")]
pub enum Command {
    #[command(description = "Start interaction with the bot")]
    Start,
    #[command(description = "Show help message")]
    Help,
    #[command(description = "Link a card to your account")]
    Link(String),
    #[command(description = "Unlink one of your cards")]
    Unlink(String),
    #[command(description = "List your linked cards")]
    Cards,
    #[command(description = "Show worker status")]
    Status,
    #[command(description = "Force a claim pass now (admin)")]
    Claimnow,
    #[command(description = "Retry outstanding tax transfers (admin)")]
    Reconcile,
    #[command(description = "Show registry statistics")]
    Stats,
    #[command(description = "View current settings (admin)")]
    Settings,
}

/// Run the bot dispatcher until it is stopped. The worker scheduler runs
/// independently; handlers only read status and fire triggers.
pub async fn run_telegram_bot(state: Arc<BotState>) -> crate::error::Result<()> {
    let telegram_config = match &state.config.telegram {
        Some(conf) => conf,
        None => {
            return Err(crate::error::ClaimBotError::Config(
                "Telegram configuration missing".to_string(),
            ))
        }
    };

    info!("Starting Telegram bot...");

    let bot = Bot::new(telegram_config.bot_token.clone());

    let handler = dptree::entry().branch(
        Update::filter_message()
            .filter_command::<Command>()
            .endpoint(crate::telegram::commands::answer),
    );

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}
