use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A linked card: the unit of work for the claim pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    /// Opaque unique identifier on the external ledger.
    pub card_code: String,
    /// The user who linked the card. Re-linking moves ownership.
    pub owner_id: String,
    /// Unix seconds of the last successful claim; 0 means never claimed.
    pub last_claim_ts: i64,
    /// Consecutive non-terminal claim failures since the last success.
    pub claim_retry_count: u32,
    /// When the card was first linked. Display only.
    pub linked_at: DateTime<Utc>,
}

impl Card {
    pub fn last_claim(&self) -> Option<DateTime<Utc>> {
        if self.last_claim_ts == 0 {
            None
        } else {
            DateTime::from_timestamp(self.last_claim_ts, 0)
        }
    }
}

/// What happened when a user linked a card code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOutcome {
    Created,
    Updated,
}

/// What happened when a user asked to unlink a card code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed,
    NotFound,
    NotOwner,
}

/// A tax transfer that failed after its claim was already committed, owed to
/// the receiver until reconciled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxArrear {
    pub id: i64,
    pub card_code: String,
    pub receiver: String,
    pub amount_units: u64,
    pub detail: String,
    pub created_at: DateTime<Utc>,
}

/// Aggregate registry counters for the stats surfaces.
#[derive(Debug, Clone, Serialize)]
pub struct RegistryStats {
    pub total_cards: usize,
    pub distinct_owners: usize,
    pub never_claimed: usize,
    pub cards_retrying: usize,
    pub arrears_count: usize,
    pub arrears_units: u64,
}
