pub mod cli;
pub mod config;
pub mod error;
pub mod ledger;
pub mod storage;
pub mod telegram;
pub mod treasury;
pub mod utils;
pub mod worker;

pub use config::Config;
pub use error::{ClaimBotError, Result};
