use std::sync::Arc;

use teloxide::utils::markdown;
use teloxide::{prelude::*, utils::command::BotCommands};

use crate::storage::{LinkOutcome, RemoveOutcome};
use crate::telegram::bot::{BotState, Command};
use crate::telegram::formatters::{format_card_tg, format_coins_tg, format_time_tg};
use crate::utils;
use crate::worker::TriggerOutcome;

fn is_admin(state: &BotState, user_id: u64) -> bool {
    match &state.config.telegram {
        Some(conf) => conf.admin_users.is_empty() || conf.admin_users.contains(&user_id),
        None => false,
    }
}

pub async fn answer(bot: Bot, msg: Message, cmd: Command, state: Arc<BotState>) -> ResponseResult<()> {
    let user_id = msg.from().map(|u| u.id.0).unwrap_or(0);
    let owner_id = user_id.to_string();

    match cmd {
        Command::Start => {
            bot.send_message(
                msg.chat.id,
                "👋 *Welcome to the Card Claim Bot*\n\nLink your cards and I will claim their accrued balance for you on a schedule\\.\n\nUse /help to see available commands\\.",
            )
            .parse_mode(teloxide::types::ParseMode::MarkdownV2)
            .await?;
        }
        Command::Help => {
            bot.send_message(msg.chat.id, Command::descriptions().to_string())
                .await?;
        }
        Command::Link(card_code) => {
            let card_code = card_code.trim();
            if card_code.is_empty() {
                bot.send_message(msg.chat.id, "Usage: /link <card code>").await?;
                return Ok(());
            }

            let registry = state.registry.lock().await;
            match registry.upsert(card_code, &owner_id) {
                Ok(LinkOutcome::Created) => {
                    bot.send_message(
                        msg.chat.id,
                        format!("✅ Card {} linked\\. It joins the next claim pass\\.", format_card_tg(card_code)),
                    )
                    .parse_mode(teloxide::types::ParseMode::MarkdownV2)
                    .await?;
                }
                Ok(LinkOutcome::Updated) => {
                    bot.send_message(
                        msg.chat.id,
                        format!("🔁 Card {} was already linked and now belongs to you\\.", format_card_tg(card_code)),
                    )
                    .parse_mode(teloxide::types::ParseMode::MarkdownV2)
                    .await?;
                }
                Err(e) => {
                    bot.send_message(msg.chat.id, format!("❌ Could not link card: {}", e))
                        .await?;
                }
            }
        }
        Command::Unlink(card_code) => {
            let card_code = card_code.trim();
            if card_code.is_empty() {
                bot.send_message(msg.chat.id, "Usage: /unlink <card code>").await?;
                return Ok(());
            }

            let registry = state.registry.lock().await;
            match registry.remove(card_code, &owner_id) {
                Ok(RemoveOutcome::Removed) => {
                    bot.send_message(msg.chat.id, "🗑 Card unlinked.").await?;
                }
                Ok(RemoveOutcome::NotFound) => {
                    bot.send_message(msg.chat.id, "That card is not linked.").await?;
                }
                Ok(RemoveOutcome::NotOwner) => {
                    bot.send_message(msg.chat.id, "⛔ That card belongs to someone else.")
                        .await?;
                }
                Err(e) => {
                    bot.send_message(msg.chat.id, format!("❌ Could not unlink card: {}", e))
                        .await?;
                }
            }
        }
        Command::Cards => {
            let registry = state.registry.lock().await;
            match registry.list_by_owner(&owner_id) {
                Ok(cards) => {
                    if cards.is_empty() {
                        bot.send_message(msg.chat.id, "You have no linked cards. Use /link <card code> to add one.")
                            .await?;
                    } else {
                        let count = cards.len();
                        let display_limit = std::cmp::min(count, 5);
                        let mut response = format!("💳 *Your Cards* \\({}\\)\n\n", count);

                        for card in &cards[..display_limit] {
                            response.push_str(&format!(
                                "• {}\n  Last claim: {}",
                                format_card_tg(&card.card_code),
                                markdown::escape(&utils::format_relative_time(card.last_claim()))
                            ));
                            if card.claim_retry_count > 0 {
                                response.push_str(&format!(
                                    " \\({} failed attempts\\)",
                                    card.claim_retry_count
                                ));
                            }
                            response.push_str("\n\n");
                        }

                        if count > display_limit {
                            response.push_str(&format!("_\\.\\.\\.and {} more_", count - display_limit));
                        }

                        bot.send_message(msg.chat.id, response)
                            .parse_mode(teloxide::types::ParseMode::MarkdownV2)
                            .await?;
                    }
                }
                Err(e) => {
                    bot.send_message(msg.chat.id, format!("❌ Database error: {}", e))
                        .await?;
                }
            }
        }
        Command::Status => {
            let status = state.worker.status();
            let state_line = if status.running { "🟢 Running a pass" } else { "🟡 Idle" };
            let next_line = match status.next_run_at {
                Some(at) => markdown::escape(&format_time_tg(&at)),
                None => "not scheduled".to_string(),
            };
            let last_line = match &status.last_summary {
                Some(summary) => format!(
                    "{} cards, {} claimed \\({}\\), {} failed at {}",
                    summary.total_cards,
                    summary.claimed,
                    markdown::escape(&format_coins_tg(summary.claimed_units)),
                    summary.failed,
                    markdown::escape(&format_time_tg(&summary.finished_at))
                ),
                None => "none yet".to_string(),
            };

            bot.send_message(
                msg.chat.id,
                format!(
                    "📟 *Worker Status*\n\nState: {}\nNext pass: {}\nLast pass: {}",
                    state_line, next_line, last_line
                ),
            )
            .parse_mode(teloxide::types::ParseMode::MarkdownV2)
            .await?;
        }
        Command::Claimnow => {
            if !is_admin(&state, user_id) {
                bot.send_message(msg.chat.id, "⛔ Only admins can force a claim pass.")
                    .await?;
                return Ok(());
            }
            match state.worker.trigger() {
                TriggerOutcome::Started => {
                    bot.send_message(msg.chat.id, "🚀 Claim pass started.").await?;
                }
                TriggerOutcome::AlreadyRunning => {
                    bot.send_message(msg.chat.id, "⏳ A pass is already running; this trigger was dropped.")
                        .await?;
                }
            }
        }
        Command::Reconcile => {
            if !is_admin(&state, user_id) {
                bot.send_message(msg.chat.id, "⛔ Only admins can reconcile tax arrears.")
                    .await?;
                return Ok(());
            }
            bot.send_message(msg.chat.id, "♻️ Retrying outstanding tax transfers...")
                .await?;
            match state.reconciler.settle_arrears().await {
                Ok(report) => {
                    let text = if report.attempted == 0 {
                        "✅ No outstanding tax arrears\\.".to_string()
                    } else {
                        let mut text = format!(
                            "♻️ *Tax Reconciliation*\n\nSettled: {} of {} \\({}\\)\nStill owed: {} \\({}\\)",
                            report.settled,
                            report.attempted,
                            markdown::escape(&format_coins_tg(report.settled_units)),
                            report.still_owed,
                            markdown::escape(&format_coins_tg(report.remaining_units))
                        );
                        if report.dropped > 0 {
                            text.push_str(&format!(
                                "\nWritten off \\(card gone\\): {}",
                                report.dropped
                            ));
                        }
                        text
                    };
                    bot.send_message(msg.chat.id, text)
                        .parse_mode(teloxide::types::ParseMode::MarkdownV2)
                        .await?;
                }
                Err(e) => {
                    bot.send_message(msg.chat.id, format!("❌ Reconciliation failed: {}", e))
                        .await?;
                }
            }
        }
        Command::Stats => {
            let registry = state.registry.lock().await;
            match registry.stats() {
                Ok(stats) => {
                    let msg_text = format!(
                        "📊 *Registry Statistics*\n\n\
                        Cards linked: {}\n\
                        Owners: {}\n\
                        Never claimed: {}\n\
                        Retrying: {}\n\
                        Tax arrears: {} \\({}\\)",
                        stats.total_cards,
                        stats.distinct_owners,
                        stats.never_claimed,
                        stats.cards_retrying,
                        stats.arrears_count,
                        markdown::escape(&format_coins_tg(stats.arrears_units))
                    );
                    bot.send_message(msg.chat.id, msg_text)
                        .parse_mode(teloxide::types::ParseMode::MarkdownV2)
                        .await?;
                }
                Err(e) => {
                    bot.send_message(msg.chat.id, format!("❌ Error fetching stats: {}", e))
                        .await?;
                }
            }
        }
        Command::Settings => {
            if !is_admin(&state, user_id) {
                bot.send_message(msg.chat.id, "⛔ Only admins can view settings.")
                    .await?;
                return Ok(());
            }
            let config = &state.config;
            let settings_msg = format!(
                "⚙️ *Current Settings*\n\n\
                Ledger: `{}`\n\
                Pass interval: {}s\n\
                Card delay: {}ms\n\
                Tax rate: {}%\n\
                Receiver: {}\n\
                Database: `{}`",
                markdown::escape_code(&config.ledger.base_url),
                config.claim.interval_secs,
                config.claim.item_delay_ms,
                markdown::escape(&(config.claim.tax_rate * 100.0).to_string()),
                config
                    .claim
                    .receiver_card
                    .as_deref()
                    .map(format_card_tg)
                    .unwrap_or_else(|| "none \\(tax disabled\\)".to_string()),
                markdown::escape_code(&config.database.path)
            );
            bot.send_message(msg.chat.id, settings_msg)
                .parse_mode(teloxide::types::ParseMode::MarkdownV2)
                .await?;
        }
    };

    Ok(())
}
