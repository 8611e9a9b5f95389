use std::sync::Arc;

use clap::Parser;
use colored::*;
use tokio::sync::Mutex;
use tracing::{error, info};

use card_claim_bot::cli::{Cli, Commands};
use card_claim_bot::config::Config;
use card_claim_bot::error::Result;
use card_claim_bot::ledger::{HttpLedgerClient, LedgerApi};
use card_claim_bot::storage::CardRegistry;
use card_claim_bot::telegram::{self, BotState, StatusPanel};
use card_claim_bot::treasury::TaxReconciler;
use card_claim_bot::utils;
use card_claim_bot::worker::{ClaimEngine, ClaimWorker, PassProcessor};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter("card_claim_bot=debug,info")
        .init();

    let cli = Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run => {
            info!("Starting claim service...");
            run_service(config).await
        }

        Commands::Pass => {
            info!("Running one claim pass...");
            run_single_pass(&config).await
        }

        Commands::Cards { owner, format } => list_cards(&config, owner.as_deref(), &format).await,

        Commands::Stats { format } => show_stats(&config, &format).await,

        Commands::Reconcile => {
            info!("Reconciling tax arrears...");
            reconcile(&config).await
        }

        Commands::Init => {
            info!("Initializing...");
            initialize(&config).await
        }
    };

    if let Err(e) = result {
        error!("{}", format!("Error: {}", e).red());
        std::process::exit(1);
    }
}

fn open_registry(config: &Config) -> Result<Arc<Mutex<CardRegistry>>> {
    Ok(Arc::new(Mutex::new(CardRegistry::new(
        &config.database.path,
    )?)))
}

fn ledger_client(config: &Config) -> Result<Arc<dyn LedgerApi>> {
    Ok(Arc::new(HttpLedgerClient::new(
        &config.ledger.base_url,
        config.request_timeout(),
    )?))
}

fn build_worker(
    config: &Config,
    registry: Arc<Mutex<CardRegistry>>,
    ledger: Arc<dyn LedgerApi>,
) -> Arc<ClaimWorker> {
    let engine = ClaimEngine::new(
        ledger,
        config.tax_rate_scaled(),
        config.claim.receiver_card.clone(),
    );
    let pass = PassProcessor::new(registry, engine, config.item_delay());
    Arc::new(ClaimWorker::new(pass, config.pass_interval()))
}

async fn run_service(config: Config) -> Result<()> {
    println!("{}", "Starting claim service...".green());
    println!("Pass interval: {} seconds", config.claim.interval_secs);
    match &config.claim.receiver_card {
        Some(receiver) => println!(
            "Tax: {}% to {}",
            config.claim.tax_rate * 100.0,
            utils::format_card(receiver)
        ),
        None => println!("Tax: disabled (no receiver card)"),
    }

    let registry = open_registry(&config)?;
    let ledger = ledger_client(&config)?;
    let worker = build_worker(&config, Arc::clone(&registry), Arc::clone(&ledger));

    if let Some(panel) = StatusPanel::new(&config) {
        worker.set_pass_hook(Arc::new(panel));
        println!("{}", "✓ Telegram status panel enabled".green());
    }

    let scheduler = worker.start_scheduler();

    let bot_task = if config.telegram.is_some() {
        println!("{}", "✓ Telegram bot enabled".green());
        let state = Arc::new(BotState {
            config: config.clone(),
            registry: Arc::clone(&registry),
            worker: Arc::clone(&worker),
            reconciler: TaxReconciler::new(
                Arc::clone(&registry),
                Arc::clone(&ledger),
                config.item_delay(),
            ),
        });
        Some(tokio::spawn(async move {
            if let Err(e) = telegram::run_telegram_bot(state).await {
                error!("Telegram bot stopped: {}", e);
            }
        }))
    } else {
        None
    };

    tokio::signal::ctrl_c().await.ok();
    info!("Shutting down...");
    scheduler.abort();
    if let Some(task) = bot_task {
        task.abort();
    }
    Ok(())
}

async fn run_single_pass(config: &Config) -> Result<()> {
    let registry = open_registry(config)?;
    let ledger = ledger_client(config)?;
    let worker = build_worker(config, registry, ledger);

    // Fresh worker, the guard is always free.
    if let Some(summary) = worker.run_once().await {
        summary.print_summary();
        if let Some(reason) = summary.fatal {
            return Err(card_claim_bot::ClaimBotError::Other(anyhow::anyhow!(
                "pass aborted: {}",
                reason
            )));
        }
    }
    Ok(())
}

async fn list_cards(config: &Config, owner: Option<&str>, format: &str) -> Result<()> {
    let registry = CardRegistry::new(&config.database.path)?;
    let cards = match owner {
        Some(owner) => registry.list_by_owner(owner)?,
        None => registry.list_all()?,
    };

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&cards)?);
        return Ok(());
    }

    if cards.is_empty() {
        println!("No linked cards.");
        return Ok(());
    }

    println!("{}", format!("Linked cards ({})", cards.len()).cyan().bold());
    utils::print_table_border(72);
    utils::print_table_row(&["Card", "Owner", "Last Claim", "Retries"], &[20, 16, 18, 8]);
    utils::print_table_border(72);
    for card in &cards {
        utils::print_table_row(
            &[
                &utils::format_card(&card.card_code),
                &card.owner_id,
                &utils::format_relative_time(card.last_claim()),
                &card.claim_retry_count.to_string(),
            ],
            &[20, 16, 18, 8],
        );
    }
    utils::print_table_border(72);
    Ok(())
}

async fn show_stats(config: &Config, format: &str) -> Result<()> {
    let registry = CardRegistry::new(&config.database.path)?;
    let stats = registry.stats()?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("{}", "=== Card Claim Statistics ===".cyan().bold());
    println!("\nCards:");
    println!("  Linked:         {}", stats.total_cards);
    println!("  Owners:         {}", stats.distinct_owners);
    println!(
        "  Never claimed:  {}",
        stats.never_claimed.to_string().yellow()
    );
    println!(
        "  Retrying:       {}",
        stats.cards_retrying.to_string().red()
    );

    println!("\nTax Arrears:");
    println!("  Outstanding:    {}", stats.arrears_count);
    println!("  Owed:           {}", utils::format_coins(stats.arrears_units));

    let arrears = registry.list_tax_arrears()?;
    if !arrears.is_empty() {
        println!("\n{}", "Outstanding Tax Arrears:".yellow());
        utils::print_table_border(84);
        utils::print_table_row(
            &["Recorded", "Card", "Receiver", "Amount"],
            &[22, 20, 16, 18],
        );
        utils::print_table_border(84);
        for arrear in arrears.iter().take(10) {
            utils::print_table_row(
                &[
                    &utils::format_timestamp(&arrear.created_at),
                    &utils::format_card(&arrear.card_code),
                    &utils::format_card(&arrear.receiver),
                    &utils::format_coins(arrear.amount_units),
                ],
                &[22, 20, 16, 18],
            );
        }
        utils::print_table_border(84);
        if arrears.len() > 10 {
            println!("...and {} more", arrears.len() - 10);
        }
    }

    Ok(())
}

async fn reconcile(config: &Config) -> Result<()> {
    let registry = open_registry(config)?;
    let ledger = ledger_client(config)?;
    let reconciler = TaxReconciler::new(registry, ledger, config.item_delay());

    let report = reconciler.settle_arrears().await?;
    report.print_report();
    Ok(())
}

async fn initialize(config: &Config) -> Result<()> {
    println!("{}", "Initializing Card Claim Bot...".green());
    let _registry = CardRegistry::new(&config.database.path)?;
    println!("{}", "✓ Database initialized".green());
    println!("{}", "✓ Configuration loaded".green());
    println!("\n{}", "Configuration:".cyan());
    println!("  Ledger URL:     {}", config.ledger.base_url);
    println!("  Pass interval:  {} seconds", config.claim.interval_secs);
    println!("  Card delay:     {} ms", config.claim.item_delay_ms);
    println!("  Tax rate:       {}%", config.claim.tax_rate * 100.0);
    println!(
        "  Receiver:       {}",
        config.claim.receiver_card.as_deref().unwrap_or("none")
    );
    println!("  Database:       {}", config.database.path);
    println!(
        "  Telegram:       {}",
        if config.telegram.is_some() {
            "configured"
        } else {
            "not configured"
        }
    );

    println!("\n{}", "Ready to use! Try running:".cyan());
    println!("  {} to start the scheduler", "claimbot run".yellow());
    println!("  {} to claim once right now", "claimbot pass".yellow());
    println!("  {} to view statistics", "claimbot stats".yellow());
    Ok(())
}
