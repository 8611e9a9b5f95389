use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::ledger::{format_units, tax_units, ErrorKind, LedgerApi};

/// Result of one card's claim attempt against the ledger.
#[derive(Debug, Clone, PartialEq)]
pub enum CardOutcome {
    /// A positive amount was claimed. The tax transfer may still have failed;
    /// that never demotes the claim itself.
    Claimed { amount: u64, tax: TaxOutcome },
    /// The ledger accepted the claim but nothing was accrued (missing, zero
    /// or negative amount in the response).
    ZeroClaim,
    /// The card's cooldown has not elapsed yet.
    Cooldown,
    /// The ledger no longer recognizes the card.
    Gone,
    /// Transient or unclassified failure. The card is retried next pass.
    Failed { kind: ErrorKind, detail: String },
}

/// What happened to the tax share of a successful claim.
#[derive(Debug, Clone, PartialEq)]
pub enum TaxOutcome {
    /// No receiver configured, or the share floored to zero base units.
    Skipped,
    /// The transfer went through.
    Paid { units: u64 },
    /// The transfer failed; `units` is still owed to `receiver`.
    Failed {
        units: u64,
        receiver: String,
        detail: String,
    },
}

/// Executes the remote half of a pass for a single card: claim the accrued
/// balance, then forward the configured tax share out of it.
pub struct ClaimEngine {
    ledger: Arc<dyn LedgerApi>,
    tax_rate_scaled: u64,
    receiver_card: Option<String>,
}

impl ClaimEngine {
    pub fn new(
        ledger: Arc<dyn LedgerApi>,
        tax_rate_scaled: u64,
        receiver_card: Option<String>,
    ) -> Self {
        Self {
            ledger,
            tax_rate_scaled,
            receiver_card,
        }
    }

    /// Claim one card and forward tax from the proceeds.
    ///
    /// Never returns an error: every ledger response maps onto a
    /// [`CardOutcome`] the pass loop knows how to record.
    pub async fn claim_card(&self, card_code: &str) -> CardOutcome {
        match self.ledger.claim(card_code).await {
            Ok(receipt) => {
                let amount = receipt.amount.unwrap_or(0);
                if amount == 0 {
                    debug!("Card {} claimed zero value", card_code);
                    return CardOutcome::ZeroClaim;
                }
                info!("Card {} claimed {} coins", card_code, format_units(amount));
                let tax = self.forward_tax(card_code, amount).await;
                CardOutcome::Claimed { amount, tax }
            }
            Err(e) => match e.kind {
                ErrorKind::CooldownActive => {
                    debug!("Card {} still cooling down: {}", card_code, e.detail);
                    CardOutcome::Cooldown
                }
                ErrorKind::NotFound => {
                    info!("Card {} is gone from the ledger: {}", card_code, e.detail);
                    CardOutcome::Gone
                }
                ErrorKind::Transient | ErrorKind::Unknown => {
                    warn!("Claim for card {} failed ({}): {}", card_code, e.kind, e.detail);
                    CardOutcome::Failed {
                        kind: e.kind,
                        detail: e.detail,
                    }
                }
            },
        }
    }

    /// Send the tax share of `amount` to the receiver card. The transfer is
    /// best-effort relative to the claim: its outcome is reported, never
    /// escalated.
    async fn forward_tax(&self, card_code: &str, amount: u64) -> TaxOutcome {
        let receiver = match &self.receiver_card {
            Some(receiver) => receiver,
            None => return TaxOutcome::Skipped,
        };
        let share = tax_units(amount, self.tax_rate_scaled);
        if share == 0 {
            debug!("Tax share of {} floors to zero, skipping transfer", card_code);
            return TaxOutcome::Skipped;
        }
        match self.ledger.pay(card_code, receiver, share).await {
            Ok(()) => {
                info!(
                    "Forwarded {} coins tax from {} to {}",
                    format_units(share),
                    card_code,
                    receiver
                );
                TaxOutcome::Paid { units: share }
            }
            Err(e) => {
                warn!(
                    "Tax transfer of {} coins from {} to {} failed: {}",
                    format_units(share),
                    card_code,
                    receiver,
                    e
                );
                TaxOutcome::Failed {
                    units: share,
                    receiver: receiver.clone(),
                    detail: e.to_string(),
                }
            }
        }
    }
}
