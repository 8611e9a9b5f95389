use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::Result;
use crate::ledger::{format_units, ErrorKind, LedgerApi};
use crate::storage::CardRegistry;

/// Result of one reconciliation sweep over the arrears book.
#[derive(Debug, Clone, Default)]
pub struct ReconcileReport {
    pub attempted: usize,
    pub settled: usize,
    pub dropped: usize,
    pub still_owed: usize,
    pub settled_units: u64,
    pub remaining_units: u64,
}

impl ReconcileReport {
    pub fn print_report(&self) {
        println!("\n{}", "=== Tax Reconciliation ===".bright_cyan().bold());
        if self.attempted == 0 {
            println!("{}", "No outstanding tax arrears.".green());
            return;
        }
        println!("Arrears retried:   {}", self.attempted);
        println!(
            "Settled:           {} ({} coins)",
            self.settled.to_string().green(),
            format_units(self.settled_units).green()
        );
        if self.dropped > 0 {
            println!(
                "Written off:       {} (source card gone)",
                self.dropped.to_string().yellow()
            );
        }
        println!(
            "Still owed:        {} ({} coins)",
            self.still_owed.to_string().yellow(),
            format_units(self.remaining_units).yellow()
        );
    }
}

/// Retries tax transfers that failed during past claim passes.
///
/// Runs only on explicit operator request. Claim passes record arrears but
/// never settle them, so re-running a pass stays free of hidden retries.
pub struct TaxReconciler {
    registry: Arc<Mutex<CardRegistry>>,
    ledger: Arc<dyn LedgerApi>,
    item_delay: Duration,
}

impl TaxReconciler {
    pub fn new(
        registry: Arc<Mutex<CardRegistry>>,
        ledger: Arc<dyn LedgerApi>,
        item_delay: Duration,
    ) -> Self {
        Self {
            registry,
            ledger,
            item_delay,
        }
    }

    /// Attempt every recorded arrear once, paced like a claim pass. A row is
    /// deleted after its transfer succeeds, or written off when the ledger no
    /// longer knows the source card; everything else stays owed for the next
    /// sweep.
    pub async fn settle_arrears(&self) -> Result<ReconcileReport> {
        let arrears = self.registry.lock().await.list_tax_arrears()?;
        let mut report = ReconcileReport {
            attempted: arrears.len(),
            ..Default::default()
        };
        if arrears.is_empty() {
            info!("No tax arrears to reconcile");
            return Ok(report);
        }

        info!("Reconciling {} tax arrears", arrears.len());
        for arrear in &arrears {
            match self
                .ledger
                .pay(&arrear.card_code, &arrear.receiver, arrear.amount_units)
                .await
            {
                Ok(()) => {
                    // If this delete fails the coins have already moved, so
                    // surface the error instead of risking a double payment
                    // on a later sweep.
                    self.registry.lock().await.settle_tax_arrear(arrear.id)?;
                    report.settled += 1;
                    report.settled_units += arrear.amount_units;
                    info!(
                        "Settled {} coins owed from {} to {}",
                        format_units(arrear.amount_units),
                        arrear.card_code,
                        arrear.receiver
                    );
                }
                Err(e) if e.kind == ErrorKind::NotFound => {
                    // The debt is only uncollectable once the source card
                    // itself is gone; a missing receiver may reappear.
                    let source_gone = self
                        .registry
                        .lock()
                        .await
                        .get_card(&arrear.card_code)?
                        .is_none();
                    if source_gone {
                        self.registry.lock().await.settle_tax_arrear(arrear.id)?;
                        report.dropped += 1;
                        warn!(
                            "Wrote off {} coins owed from {}: card no longer exists",
                            format_units(arrear.amount_units),
                            arrear.card_code
                        );
                    } else {
                        report.still_owed += 1;
                        report.remaining_units += arrear.amount_units;
                        warn!(
                            "Arrear of {} coins from {} still unpaid: {}",
                            format_units(arrear.amount_units),
                            arrear.card_code,
                            e
                        );
                    }
                }
                Err(e) => {
                    report.still_owed += 1;
                    report.remaining_units += arrear.amount_units;
                    warn!(
                        "Arrear of {} coins from {} still unpaid: {}",
                        format_units(arrear.amount_units),
                        arrear.card_code,
                        e
                    );
                }
            }
            tokio::time::sleep(self.item_delay).await;
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{ErrorKind, LedgerError, MockLedgerApi, UNIT_SCALE};

    fn registry_with_arrears(rows: &[(&str, &str, u64)]) -> Arc<Mutex<CardRegistry>> {
        let registry = CardRegistry::open_in_memory().unwrap();
        for (card, receiver, units) in rows {
            registry
                .record_tax_arrear(card, receiver, *units, "pay failed")
                .unwrap();
        }
        Arc::new(Mutex::new(registry))
    }

    #[tokio::test]
    async fn test_settles_only_successful_transfers() {
        let registry = registry_with_arrears(&[
            ("A", "RCV", 2 * UNIT_SCALE),
            ("B", "RCV", 3 * UNIT_SCALE),
        ]);

        let mut mock = MockLedgerApi::new();
        mock.expect_pay()
            .withf(|from, _, _| from == "A")
            .times(1)
            .returning(|_, _, _| Ok(()));
        mock.expect_pay()
            .withf(|from, _, _| from == "B")
            .times(1)
            .returning(|_, _, _| Err(LedgerError::transient("still down")));

        let reconciler = TaxReconciler::new(Arc::clone(&registry), Arc::new(mock), Duration::ZERO);
        let report = reconciler.settle_arrears().await.unwrap();

        assert_eq!(report.attempted, 2);
        assert_eq!(report.settled, 1);
        assert_eq!(report.still_owed, 1);
        assert_eq!(report.settled_units, 2 * UNIT_SCALE);
        assert_eq!(report.remaining_units, 3 * UNIT_SCALE);

        let remaining = registry.lock().await.list_tax_arrears().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].card_code, "B");
    }

    #[tokio::test]
    async fn test_empty_book_makes_no_calls() {
        let registry = registry_with_arrears(&[]);
        let mut mock = MockLedgerApi::new();
        mock.expect_pay().never();

        let reconciler = TaxReconciler::new(registry, Arc::new(mock), Duration::ZERO);
        let report = reconciler.settle_arrears().await.unwrap();
        assert_eq!(report.attempted, 0);
    }

    #[tokio::test]
    async fn test_unknown_failure_keeps_arrear() {
        let registry = registry_with_arrears(&[("A", "RCV", 7)]);
        let mut mock = MockLedgerApi::new();
        mock.expect_pay()
            .returning(|_, _, _| Err(LedgerError::new(ErrorKind::Unknown, "nonsense reply")));

        let reconciler = TaxReconciler::new(Arc::clone(&registry), Arc::new(mock), Duration::ZERO);
        let report = reconciler.settle_arrears().await.unwrap();

        assert_eq!(report.still_owed, 1);
        assert_eq!(registry.lock().await.list_tax_arrears().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_not_found_writes_off_arrear_once_card_is_unlinked() {
        // The arrear's source card was deleted after a remote not-found, so
        // the debt can never be paid again.
        let registry = registry_with_arrears(&[("A", "RCV", 5 * UNIT_SCALE)]);
        let mut mock = MockLedgerApi::new();
        mock.expect_pay()
            .times(1)
            .returning(|_, _, _| Err(LedgerError::new(ErrorKind::NotFound, "unknown card")));

        let reconciler = TaxReconciler::new(Arc::clone(&registry), Arc::new(mock), Duration::ZERO);
        let report = reconciler.settle_arrears().await.unwrap();

        assert_eq!(report.dropped, 1);
        assert_eq!(report.still_owed, 0);
        assert!(registry.lock().await.list_tax_arrears().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_not_found_keeps_arrear_while_card_is_linked() {
        let registry = registry_with_arrears(&[("A", "RCV", 5 * UNIT_SCALE)]);
        registry.lock().await.upsert("A", "alice").unwrap();

        let mut mock = MockLedgerApi::new();
        mock.expect_pay()
            .times(1)
            .returning(|_, _, _| Err(LedgerError::new(ErrorKind::NotFound, "unknown card")));

        let reconciler = TaxReconciler::new(Arc::clone(&registry), Arc::new(mock), Duration::ZERO);
        let report = reconciler.settle_arrears().await.unwrap();

        assert_eq!(report.dropped, 0);
        assert_eq!(report.still_owed, 1);
        assert_eq!(registry.lock().await.list_tax_arrears().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_paces_between_arrears() {
        let registry = registry_with_arrears(&[("A", "RCV", 1), ("B", "RCV", 1)]);
        let mut mock = MockLedgerApi::new();
        mock.expect_pay().times(2).returning(|_, _, _| Ok(()));

        let reconciler = TaxReconciler::new(
            registry,
            Arc::new(mock),
            Duration::from_millis(100),
        );
        let started = tokio::time::Instant::now();
        reconciler.settle_arrears().await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(200));
    }
}
