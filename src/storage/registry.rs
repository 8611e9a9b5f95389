use rusqlite::{params, Connection, OptionalExtension};

use crate::{
    error::{ClaimBotError, Result},
    storage::models::{Card, LinkOutcome, RegistryStats, RemoveOutcome, TaxArrear},
};
use chrono::{DateTime, Utc};

/// Durable store of linked cards and their claim state.
///
/// `list_all` returns cards in insertion order (sqlite rowid); re-linking a
/// card updates the owner in place so a card never changes position. The
/// claim pass depends on that for reproducible ordering.
pub struct CardRegistry {
    conn: Connection,
}

impl CardRegistry {
    pub fn new(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        let registry = Self { conn };
        registry.init_schema()?;
        Ok(registry)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let registry = Self { conn };
        registry.init_schema()?;
        Ok(registry)
    }

    #[cfg(test)]
    pub fn drop_cards_table(&self) -> Result<()> {
        self.conn.execute("DROP TABLE cards", [])?;
        Ok(())
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS cards (
                card_code TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                last_claim_ts INTEGER NOT NULL DEFAULT 0,
                claim_retry_count INTEGER NOT NULL DEFAULT 0,
                linked_at TEXT NOT NULL
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS tax_arrears (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                card_code TEXT NOT NULL,
                receiver TEXT NOT NULL,
                amount_units INTEGER NOT NULL,
                detail TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_cards_owner ON cards(owner_id)",
            [],
        )?;

        Ok(())
    }

    /// Link a card to an owner: insert if absent, otherwise move ownership.
    pub fn upsert(&self, card_code: &str, owner_id: &str) -> Result<LinkOutcome> {
        let card_code = validated(card_code)?;
        let owner_id = validated(owner_id)?;

        let existing: Option<String> = self
            .conn
            .query_row(
                "SELECT owner_id FROM cards WHERE card_code = ?1",
                [card_code],
                |row| row.get(0),
            )
            .optional()?;

        match existing {
            Some(_) => {
                self.conn.execute(
                    "UPDATE cards SET owner_id = ?2 WHERE card_code = ?1",
                    params![card_code, owner_id],
                )?;
                Ok(LinkOutcome::Updated)
            }
            None => {
                self.conn.execute(
                    "INSERT INTO cards (card_code, owner_id, last_claim_ts, claim_retry_count, linked_at)
                     VALUES (?1, ?2, 0, 0, ?3)",
                    params![card_code, owner_id, Utc::now().to_rfc3339()],
                )?;
                Ok(LinkOutcome::Created)
            }
        }
    }

    /// Unlink a card on behalf of `requester_id`. Never deletes a card owned
    /// by someone else.
    pub fn remove(&self, card_code: &str, requester_id: &str) -> Result<RemoveOutcome> {
        let owner: Option<String> = self
            .conn
            .query_row(
                "SELECT owner_id FROM cards WHERE card_code = ?1",
                [card_code],
                |row| row.get(0),
            )
            .optional()?;

        match owner {
            None => Ok(RemoveOutcome::NotFound),
            Some(owner) if owner != requester_id => Ok(RemoveOutcome::NotOwner),
            Some(_) => {
                self.conn
                    .execute("DELETE FROM cards WHERE card_code = ?1", [card_code])?;
                Ok(RemoveOutcome::Removed)
            }
        }
    }

    pub fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Card>> {
        let mut stmt = self.conn.prepare(
            "SELECT card_code, owner_id, last_claim_ts, claim_retry_count, linked_at
             FROM cards
             WHERE owner_id = ?1
             ORDER BY rowid",
        )?;

        let cards = stmt
            .query_map([owner_id], card_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(cards)
    }

    /// Every linked card, in stable insertion order.
    pub fn list_all(&self) -> Result<Vec<Card>> {
        let mut stmt = self.conn.prepare(
            "SELECT card_code, owner_id, last_claim_ts, claim_retry_count, linked_at
             FROM cards
             ORDER BY rowid",
        )?;

        let cards = stmt
            .query_map([], card_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(cards)
    }

    pub fn get_card(&self, card_code: &str) -> Result<Option<Card>> {
        let card = self
            .conn
            .query_row(
                "SELECT card_code, owner_id, last_claim_ts, claim_retry_count, linked_at
                 FROM cards
                 WHERE card_code = ?1",
                [card_code],
                card_from_row,
            )
            .optional()?;

        Ok(card)
    }

    /// Record a successful claim: reset the retry counter and advance the
    /// last-claim timestamp. MAX keeps the timestamp from ever moving
    /// backwards.
    pub fn record_claim_success(&self, card_code: &str, ts: i64) -> Result<()> {
        self.conn.execute(
            "UPDATE cards
             SET last_claim_ts = MAX(last_claim_ts, ?2), claim_retry_count = 0
             WHERE card_code = ?1",
            params![card_code, ts],
        )?;
        Ok(())
    }

    /// Record a non-terminal claim failure. Touches nothing but the counter.
    pub fn record_claim_failure(&self, card_code: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE cards
             SET claim_retry_count = claim_retry_count + 1
             WHERE card_code = ?1",
            [card_code],
        )?;
        Ok(())
    }

    /// Unconditional removal, used by the worker when the remote ledger no
    /// longer knows the card.
    pub fn delete(&self, card_code: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM cards WHERE card_code = ?1", [card_code])?;
        Ok(())
    }

    pub fn record_tax_arrear(
        &self,
        card_code: &str,
        receiver: &str,
        amount_units: u64,
        detail: &str,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO tax_arrears (card_code, receiver, amount_units, detail, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                card_code,
                receiver,
                amount_units,
                detail,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    pub fn list_tax_arrears(&self) -> Result<Vec<TaxArrear>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, card_code, receiver, amount_units, detail, created_at
             FROM tax_arrears
             ORDER BY id",
        )?;

        let arrears = stmt
            .query_map([], |row| {
                Ok(TaxArrear {
                    id: row.get(0)?,
                    card_code: row.get(1)?,
                    receiver: row.get(2)?,
                    amount_units: row.get(3)?,
                    detail: row.get(4)?,
                    created_at: parse_stored_time(row.get::<_, String>(5)?),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(arrears)
    }

    pub fn settle_tax_arrear(&self, id: i64) -> Result<()> {
        self.conn
            .execute("DELETE FROM tax_arrears WHERE id = ?1", [id])?;
        Ok(())
    }

    pub fn stats(&self) -> Result<RegistryStats> {
        let total_cards: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM cards", [], |row| row.get(0))?;

        let distinct_owners: i64 = self.conn.query_row(
            "SELECT COUNT(DISTINCT owner_id) FROM cards",
            [],
            |row| row.get(0),
        )?;

        let never_claimed: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM cards WHERE last_claim_ts = 0",
            [],
            |row| row.get(0),
        )?;

        let cards_retrying: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM cards WHERE claim_retry_count > 0",
            [],
            |row| row.get(0),
        )?;

        let arrears_count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM tax_arrears", [], |row| row.get(0))?;

        let arrears_units: Option<u64> = self.conn.query_row(
            "SELECT SUM(amount_units) FROM tax_arrears",
            [],
            |row| row.get(0),
        )?;

        Ok(RegistryStats {
            total_cards: total_cards as usize,
            distinct_owners: distinct_owners as usize,
            never_claimed: never_claimed as usize,
            cards_retrying: cards_retrying as usize,
            arrears_count: arrears_count as usize,
            arrears_units: arrears_units.unwrap_or(0),
        })
    }
}

fn validated(identifier: &str) -> Result<&str> {
    if identifier.trim().is_empty() {
        Err(ClaimBotError::InvalidIdentifier(
            "identifier must not be empty".to_string(),
        ))
    } else {
        Ok(identifier)
    }
}

fn card_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Card> {
    Ok(Card {
        card_code: row.get(0)?,
        owner_id: row.get(1)?,
        last_claim_ts: row.get(2)?,
        claim_retry_count: row.get(3)?,
        linked_at: parse_stored_time(row.get::<_, String>(4)?),
    })
}

/// Stored timestamps are display-only; a corrupt row degrades to the epoch
/// instead of failing the whole snapshot.
fn parse_stored_time(text: String) -> DateTime<Utc> {
    text.parse().unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}
