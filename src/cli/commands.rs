use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "claimbot")]
#[command(about = "Scheduled balance claims for linked ledger cards")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "config/default")]
    pub config: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the claim scheduler, with the Telegram bot when configured
    Run,

    /// Run a single claim pass and exit
    Pass,

    /// List linked cards
    Cards {
        /// Only cards linked by this owner
        #[arg(short, long)]
        owner: Option<String>,

        /// Output format (table, json)
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// Show registry statistics and outstanding tax arrears
    Stats {
        /// Output format: table or json
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// Retry outstanding tax transfers
    Reconcile,

    /// Initialize database and configuration
    Init,
}
