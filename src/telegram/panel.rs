use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{ChatId, MessageId};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::Config;
use crate::telegram::formatters::{format_coins_tg, format_time_tg};
use crate::worker::{PassHook, PassSummary};

/// One status message in the panel chat, refreshed after every pass.
///
/// The first pass sends a fresh message; later passes edit it in place so
/// the chat is not flooded. If the edit fails (message deleted, chat
/// history cleared) the panel falls back to sending a new one.
pub struct StatusPanel {
    bot: Bot,
    chat_id: ChatId,
    interval: Duration,
    message_id: Mutex<Option<MessageId>>,
}

impl StatusPanel {
    pub fn new(config: &Config) -> Option<Self> {
        let telegram_config = config.telegram.as_ref()?;
        let chat_id = match telegram_config.panel_chat_id {
            Some(id) => ChatId(id),
            None => {
                info!("No panel chat configured, status panel disabled");
                return None;
            }
        };

        info!("Status panel will post to chat {}", chat_id);
        Some(Self {
            bot: Bot::new(telegram_config.bot_token.clone()),
            chat_id,
            interval: config.pass_interval(),
            message_id: Mutex::new(None),
        })
    }
}

fn render_panel(summary: &PassSummary, interval: Duration) -> String {
    let next_at = summary.finished_at + chrono::Duration::seconds(interval.as_secs() as i64);

    if let Some(reason) = &summary.fatal {
        return format!(
            "🔴 *Claim Worker*\n\nLast pass aborted: {}\nNext attempt: {}",
            reason,
            format_time_tg(&next_at)
        );
    }

    let mut text = format!(
        "📟 *Claim Worker*\n\n\
        Last pass: {} ({}s)\n\
        Cards: {} | claimed: {} ({})\n\
        Zero: {} | cooling: {} | removed: {} | failed: {}\n\
        Tax forwarded: {}",
        format_time_tg(&summary.finished_at),
        summary.duration().num_seconds(),
        summary.total_cards,
        summary.claimed,
        format_coins_tg(summary.claimed_units),
        summary.zero_claims,
        summary.cooldowns,
        summary.removed,
        summary.failed,
        format_coins_tg(summary.tax_paid_units)
    );
    if summary.tax_owed_units > 0 {
        text.push_str(&format!(
            "\n⚠️ Tax owed: {}",
            format_coins_tg(summary.tax_owed_units)
        ));
    }
    text.push_str(&format!("\nNext pass: {}", format_time_tg(&next_at)));
    text
}

#[async_trait]
impl PassHook for StatusPanel {
    async fn on_pass_complete(&self, summary: &PassSummary) -> anyhow::Result<()> {
        let text = render_panel(summary, self.interval);

        let mut message_id = self.message_id.lock().await;
        if let Some(id) = *message_id {
            match self
                .bot
                .edit_message_text(self.chat_id, id, text.clone())
                .parse_mode(teloxide::types::ParseMode::Markdown)
                .await
            {
                Ok(_) => return Ok(()),
                Err(e) => {
                    warn!("Could not edit panel message, sending a new one: {}", e);
                }
            }
        }

        let sent = self
            .bot
            .send_message(self.chat_id, text)
            .parse_mode(teloxide::types::ParseMode::Markdown)
            .await
            .context("sending panel message")?;
        *message_id = Some(sent.id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::UNIT_SCALE;
    use chrono::TimeZone;

    fn summary() -> PassSummary {
        let started = chrono::Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        PassSummary {
            total_cards: 3,
            claimed: 1,
            zero_claims: 1,
            cooldowns: 1,
            removed: 0,
            failed: 0,
            claimed_units: 5 * UNIT_SCALE,
            tax_paid_units: UNIT_SCALE / 2,
            tax_owed_units: 0,
            started_at: started,
            finished_at: started + chrono::Duration::seconds(4),
            fatal: None,
        }
    }

    #[test]
    fn test_render_panel_includes_next_run() {
        let text = render_panel(&summary(), Duration::from_secs(300));
        assert!(text.contains("Cards: 3 | claimed: 1 (5.00000000 coins)"));
        assert!(text.contains("Next pass: 2026-03-01 12:05 UTC"));
        assert!(!text.contains("Tax owed"));
    }

    #[test]
    fn test_render_panel_flags_owed_tax() {
        let mut summary = summary();
        summary.tax_owed_units = 2 * UNIT_SCALE;
        let text = render_panel(&summary, Duration::from_secs(300));
        assert!(text.contains("Tax owed: 2.00000000 coins"));
    }

    #[test]
    fn test_render_panel_reports_aborted_pass() {
        let mut summary = summary();
        summary.fatal = Some("disk error".to_string());
        let text = render_panel(&summary, Duration::from_secs(300));
        assert!(text.contains("aborted: disk error"));
    }
}
