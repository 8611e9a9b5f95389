use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use colored::Colorize;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::ledger::format_units;
use crate::storage::{Card, CardRegistry};
use crate::worker::engine::{CardOutcome, ClaimEngine, TaxOutcome};

/// Aggregated result of a single claim pass.
#[derive(Debug, Clone)]
pub struct PassSummary {
    pub total_cards: usize,
    pub claimed: usize,
    pub zero_claims: usize,
    pub cooldowns: usize,
    pub removed: usize,
    pub failed: usize,
    pub claimed_units: u64,
    pub tax_paid_units: u64,
    pub tax_owed_units: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Set when the pass aborted before touching any card.
    pub fatal: Option<String>,
}

impl PassSummary {
    fn begin() -> Self {
        let now = Utc::now();
        Self {
            total_cards: 0,
            claimed: 0,
            zero_claims: 0,
            cooldowns: 0,
            removed: 0,
            failed: 0,
            claimed_units: 0,
            tax_paid_units: 0,
            tax_owed_units: 0,
            started_at: now,
            finished_at: now,
            fatal: None,
        }
    }

    fn finish(&mut self) {
        self.finished_at = Utc::now();
    }

    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }

    /// Share of cards that came back with a definitive answer, in percent.
    pub fn success_rate(&self) -> f64 {
        if self.total_cards == 0 {
            return 0.0;
        }
        let settled = self.claimed + self.zero_claims + self.cooldowns + self.removed;
        settled as f64 / self.total_cards as f64 * 100.0
    }

    pub fn print_summary(&self) {
        println!("\n{}", "=== Claim Pass Summary ===".bright_cyan().bold());
        if let Some(reason) = &self.fatal {
            println!("{} {}", "Aborted:".red().bold(), reason);
            return;
        }
        println!("Cards processed:   {}", self.total_cards);
        println!(
            "Claimed:           {} ({} coins)",
            self.claimed.to_string().green(),
            format_units(self.claimed_units).green()
        );
        println!("Zero value:        {}", self.zero_claims);
        println!("On cooldown:       {}", self.cooldowns);
        println!("Unlinked (gone):   {}", self.removed);
        println!("Failed:            {}", self.failed.to_string().red());
        println!("Tax forwarded:     {} coins", format_units(self.tax_paid_units));
        if self.tax_owed_units > 0 {
            println!(
                "Tax still owed:    {} coins",
                format_units(self.tax_owed_units).yellow()
            );
        }
        println!("Settled:           {:.1}%", self.success_rate());
        println!("Duration:          {}s", self.duration().num_seconds());
    }
}

/// Walks every linked card once: claim, forward tax, record the outcome.
///
/// Cards are visited in insertion order with a fixed delay after each one so
/// the ledger never sees a burst, no matter how the pass was triggered.
pub struct PassProcessor {
    registry: Arc<Mutex<CardRegistry>>,
    engine: ClaimEngine,
    item_delay: Duration,
}

impl PassProcessor {
    pub fn new(
        registry: Arc<Mutex<CardRegistry>>,
        engine: ClaimEngine,
        item_delay: Duration,
    ) -> Self {
        Self {
            registry,
            engine,
            item_delay,
        }
    }

    pub async fn run(&self) -> PassSummary {
        let mut summary = PassSummary::begin();

        let snapshot = {
            let registry = self.registry.lock().await;
            match registry.list_all() {
                Ok(cards) => cards,
                Err(e) => {
                    error!("Pass aborted, could not snapshot card registry: {}", e);
                    summary.fatal = Some(e.to_string());
                    summary.finish();
                    return summary;
                }
            }
        };

        summary.total_cards = snapshot.len();
        if snapshot.is_empty() {
            debug!("No cards linked, nothing to claim");
            summary.finish();
            return summary;
        }

        info!("Starting claim pass over {} cards", snapshot.len());
        for card in &snapshot {
            let outcome = self.engine.claim_card(&card.card_code).await;
            self.apply_outcome(card, outcome, &mut summary).await;
            tokio::time::sleep(self.item_delay).await;
        }

        summary.finish();
        info!(
            "Pass finished: {} claimed, {} zero, {} cooling, {} removed, {} failed",
            summary.claimed,
            summary.zero_claims,
            summary.cooldowns,
            summary.removed,
            summary.failed
        );
        summary
    }

    /// Record one card's outcome in the registry and the running summary.
    /// A write failure is logged and skipped; the pass keeps going.
    async fn apply_outcome(&self, card: &Card, outcome: CardOutcome, summary: &mut PassSummary) {
        let registry = self.registry.lock().await;
        let result = match outcome {
            CardOutcome::Claimed { amount, tax } => {
                summary.claimed += 1;
                summary.claimed_units += amount;
                match tax {
                    TaxOutcome::Paid { units } => summary.tax_paid_units += units,
                    TaxOutcome::Failed {
                        units,
                        receiver,
                        detail,
                    } => {
                        summary.tax_owed_units += units;
                        if let Err(e) =
                            registry.record_tax_arrear(&card.card_code, &receiver, units, &detail)
                        {
                            warn!("Could not record tax arrear for {}: {}", card.card_code, e);
                        }
                    }
                    TaxOutcome::Skipped => {}
                }
                registry.record_claim_success(&card.card_code, Utc::now().timestamp())
            }
            CardOutcome::ZeroClaim => {
                summary.zero_claims += 1;
                registry.record_claim_success(&card.card_code, Utc::now().timestamp())
            }
            CardOutcome::Cooldown => {
                summary.cooldowns += 1;
                Ok(())
            }
            CardOutcome::Gone => {
                summary.removed += 1;
                registry.delete(&card.card_code)
            }
            CardOutcome::Failed { .. } => {
                summary.failed += 1;
                registry.record_claim_failure(&card.card_code)
            }
        };
        if let Err(e) = result {
            warn!("Registry update for card {} failed: {}", card.card_code, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{ClaimReceipt, ErrorKind, LedgerError, MockLedgerApi, UNIT_SCALE};

    const TEN_PERCENT: u64 = UNIT_SCALE / 10;

    fn processor(
        mock: MockLedgerApi,
        cards: &[(&str, &str)],
        receiver: Option<&str>,
        item_delay: Duration,
    ) -> (PassProcessor, Arc<Mutex<CardRegistry>>) {
        let registry = CardRegistry::open_in_memory().unwrap();
        for (code, owner) in cards {
            registry.upsert(code, owner).unwrap();
        }
        let registry = Arc::new(Mutex::new(registry));
        let engine = ClaimEngine::new(Arc::new(mock), TEN_PERCENT, receiver.map(str::to_string));
        (
            PassProcessor::new(Arc::clone(&registry), engine, item_delay),
            registry,
        )
    }

    #[tokio::test]
    async fn test_mixed_pass_records_every_outcome() {
        let mut mock = MockLedgerApi::new();
        mock.expect_claim().withf(|c| c == "A").returning(|_| {
            Ok(ClaimReceipt {
                amount: Some(100 * UNIT_SCALE),
            })
        });
        mock.expect_claim()
            .withf(|c| c == "B")
            .returning(|_| Err(LedgerError::new(ErrorKind::NotFound, "card not found")));
        mock.expect_pay()
            .withf(|from, to, units| from == "A" && to == "RCV" && *units == 10 * UNIT_SCALE)
            .times(1)
            .returning(|_, _, _| Ok(()));

        let (pass, registry) = processor(
            mock,
            &[("A", "alice"), ("B", "bob")],
            Some("RCV"),
            Duration::ZERO,
        );
        {
            // B already failed twice; deletion must not care.
            let registry = registry.lock().await;
            registry.record_claim_failure("B").unwrap();
            registry.record_claim_failure("B").unwrap();
        }
        let summary = pass.run().await;

        assert_eq!(summary.total_cards, 2);
        assert_eq!(summary.claimed, 1);
        assert_eq!(summary.removed, 1);
        assert_eq!(summary.claimed_units, 100 * UNIT_SCALE);
        assert_eq!(summary.tax_paid_units, 10 * UNIT_SCALE);
        assert!(summary.fatal.is_none());

        let registry = registry.lock().await;
        let a = registry.get_card("A").unwrap().unwrap();
        assert!(a.last_claim_ts > 0);
        assert_eq!(a.claim_retry_count, 0);
        assert!(registry.get_card("B").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_transfer_still_records_success_and_arrear() {
        let mut mock = MockLedgerApi::new();
        mock.expect_claim().returning(|_| {
            Ok(ClaimReceipt {
                amount: Some(50 * UNIT_SCALE),
            })
        });
        mock.expect_pay()
            .returning(|_, _, _| Err(LedgerError::transient("connection reset")));

        let (pass, registry) = processor(mock, &[("A", "alice")], Some("RCV"), Duration::ZERO);
        let summary = pass.run().await;

        assert_eq!(summary.claimed, 1);
        assert_eq!(summary.tax_paid_units, 0);
        assert_eq!(summary.tax_owed_units, 5 * UNIT_SCALE);

        let registry = registry.lock().await;
        let card = registry.get_card("A").unwrap().unwrap();
        assert!(card.last_claim_ts > 0);
        assert_eq!(card.claim_retry_count, 0);

        let arrears = registry.list_tax_arrears().unwrap();
        assert_eq!(arrears.len(), 1);
        assert_eq!(arrears[0].card_code, "A");
        assert_eq!(arrears[0].receiver, "RCV");
        assert_eq!(arrears[0].amount_units, 5 * UNIT_SCALE);
    }

    #[tokio::test]
    async fn test_cooldown_leaves_card_untouched() {
        let mut mock = MockLedgerApi::new();
        mock.expect_claim()
            .returning(|_| Err(LedgerError::new(ErrorKind::CooldownActive, "too soon")));

        let (pass, registry) = processor(mock, &[("A", "alice")], None, Duration::ZERO);
        {
            let registry = registry.lock().await;
            registry.record_claim_success("A", 1_700_000_000).unwrap();
            registry.record_claim_failure("A").unwrap();
        }

        let summary = pass.run().await;
        assert_eq!(summary.cooldowns, 1);

        let registry = registry.lock().await;
        let card = registry.get_card("A").unwrap().unwrap();
        assert_eq!(card.last_claim_ts, 1_700_000_000);
        assert_eq!(card.claim_retry_count, 1);
    }

    #[tokio::test]
    async fn test_transient_failure_retries_and_pass_continues() {
        let mut mock = MockLedgerApi::new();
        mock.expect_claim()
            .withf(|c| c == "A")
            .returning(|_| Err(LedgerError::transient("gateway unavailable")));
        mock.expect_claim()
            .withf(|c| c == "B")
            .returning(|_| Ok(ClaimReceipt { amount: Some(0) }));

        let (pass, registry) = processor(
            mock,
            &[("A", "alice"), ("B", "bob")],
            None,
            Duration::ZERO,
        );
        let summary = pass.run().await;

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.zero_claims, 1);
        // One of two cards settled (the failed one is still pending).
        assert_eq!(summary.success_rate(), 50.0);

        let registry = registry.lock().await;
        assert_eq!(registry.get_card("A").unwrap().unwrap().claim_retry_count, 1);
        assert!(registry.get_card("B").unwrap().unwrap().last_claim_ts > 0);
    }

    #[tokio::test]
    async fn test_empty_registry_finishes_cleanly() {
        let mock = MockLedgerApi::new();
        let (pass, _registry) = processor(mock, &[], Some("RCV"), Duration::ZERO);
        let summary = pass.run().await;
        assert_eq!(summary.total_cards, 0);
        assert!(summary.fatal.is_none());
        assert_eq!(summary.success_rate(), 0.0);
    }

    #[tokio::test]
    async fn test_snapshot_failure_aborts_without_touching_cards() {
        let mut mock = MockLedgerApi::new();
        mock.expect_claim().never();

        let (pass, registry) = processor(mock, &[("A", "alice")], None, Duration::ZERO);
        registry.lock().await.drop_cards_table().unwrap();

        let summary = pass.run().await;
        assert!(summary.fatal.is_some());
        assert_eq!(summary.total_cards, 0);
        assert_eq!(summary.claimed, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pass_paces_every_card() {
        let mut mock = MockLedgerApi::new();
        mock.expect_claim()
            .returning(|_| Err(LedgerError::new(ErrorKind::CooldownActive, "too soon")));

        let (pass, _registry) = processor(
            mock,
            &[("A", "a"), ("B", "b"), ("C", "c")],
            None,
            Duration::from_millis(200),
        );

        let started = tokio::time::Instant::now();
        let summary = pass.run().await;

        // Delay applies after the last card too, so three cards pace out to
        // at least 600ms of virtual time.
        assert!(started.elapsed() >= Duration::from_millis(600));
        assert_eq!(summary.cooldowns, 3);
    }
}
