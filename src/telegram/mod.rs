pub mod bot;
pub mod commands;
pub mod formatters;
pub mod panel;

pub use bot::{run_telegram_bot, BotState};
pub use panel::StatusPanel;
