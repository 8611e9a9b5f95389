pub mod client;
pub mod types;
pub mod units;

pub use client::{HttpLedgerClient, LedgerApi};
pub use types::{ClaimReceipt, ErrorKind, LedgerError, LedgerResult};
pub use units::{format_units, parse_units, tax_units, UNIT_SCALE};

#[cfg(test)]
pub use client::MockLedgerApi;
