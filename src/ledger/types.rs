use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How a failed ledger call should be treated by the claim pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network trouble or a retryable remote error; try again next pass.
    Transient,
    /// The card is not yet eligible to claim again. Expected steady state.
    CooldownActive,
    /// The card no longer exists on the remote ledger.
    NotFound,
    /// A remote rejection that fits no other bucket.
    Unknown,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Transient => write!(f, "transient"),
            ErrorKind::CooldownActive => write!(f, "cooldown active"),
            ErrorKind::NotFound => write!(f, "not found"),
            ErrorKind::Unknown => write!(f, "unknown"),
        }
    }
}

/// Closed error type for both ledger operations.
///
/// Transport failures (timeout, connection refused, mangled response) and
/// application-level rejections all arrive in this one shape, so callers
/// branch on `kind` and never on how the failure happened.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {detail}")]
pub struct LedgerError {
    pub kind: ErrorKind,
    pub detail: String,
}

impl LedgerError {
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn transient(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transient, detail)
    }
}

pub type LedgerResult<T> = std::result::Result<T, LedgerError>;

/// Normalized successful claim response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimReceipt {
    /// Claimed amount in base units. `None` when the ledger omitted the field
    /// or sent something unparsable; the worker treats that as a zero-value
    /// claim.
    pub amount: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ClaimRequest<'a> {
    pub card_code: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PayRequest<'a> {
    pub from_card: &'a str,
    pub to_card: &'a str,
    /// Fixed 8-decimal string, already truncated toward zero.
    pub amount: String,
}

/// Response body shared by `/card/claim` and `/card/pay`.
///
/// Ledger versions disagree on the amount field name, and some send it as a
/// decimal string rather than a number, so it is captured raw and parsed by
/// the client.
#[derive(Debug, Deserialize)]
pub(crate) struct LedgerResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default, alias = "claimed", alias = "value")]
    pub amount: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Map the remote's free-text error onto the closed [`ErrorKind`] set.
///
/// This is the single place the error vocabulary is interpreted; everything
/// downstream works with the enum.
pub fn classify_error(error: &str) -> ErrorKind {
    let text = error.to_ascii_lowercase();

    if text.contains("cooldown")
        || text.contains("too soon")
        || text.contains("not ready")
        || text.contains("already claimed")
    {
        ErrorKind::CooldownActive
    } else if text.contains("not found")
        || text.contains("unknown card")
        || text.contains("invalid card")
        || text.contains("no such card")
        || text.contains("does not exist")
    {
        ErrorKind::NotFound
    } else if text.contains("timeout")
        || text.contains("timed out")
        || text.contains("rate limit")
        || text.contains("unavailable")
        || text.contains("try again")
    {
        ErrorKind::Transient
    } else {
        ErrorKind::Unknown
    }
}
