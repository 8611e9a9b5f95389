use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

use crate::error::{ClaimBotError, Result};
use crate::ledger::types::{
    classify_error, ClaimReceipt, ClaimRequest, ErrorKind, LedgerError, LedgerResponse,
    LedgerResult, PayRequest,
};
use crate::ledger::units::{format_units, units_from_json};

/// The two remote ledger operations the worker depends on.
///
/// Implementations must fold every failure mode, transport or application,
/// into [`LedgerError`]; callers branch on its `kind` and nothing else.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerApi: Send + Sync {
    /// Claim the accrued balance of a card.
    async fn claim(&self, card_code: &str) -> LedgerResult<ClaimReceipt>;

    /// Transfer `amount_units` (base units) between two cards.
    async fn pay(&self, from_card: &str, to_card: &str, amount_units: u64) -> LedgerResult<()>;
}

/// HTTP/JSON client for the external ledger service.
pub struct HttpLedgerClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpLedgerClient {
    /// Build a client with a fixed per-request timeout. A call that hits the
    /// timeout is reported as [`ErrorKind::Transient`].
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        if base_url.trim().is_empty() {
            return Err(ClaimBotError::Config("ledger base URL is empty".to_string()));
        }

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClaimBotError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// POST a JSON body and normalize the response.
    ///
    /// Returns `Ok` only for a decodable body with `success: true`; every
    /// other outcome becomes a classified [`LedgerError`].
    async fn post<B: Serialize + Sync>(&self, path: &str, body: &B) -> LedgerResult<LedgerResponse> {
        let url = self.endpoint(path);

        let response = match self.http.post(&url).json(body).send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                return Err(LedgerError::transient(format!("{path} timed out")));
            }
            Err(e) => {
                return Err(LedgerError::transient(format!("{path} request failed: {e}")));
            }
        };

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| LedgerError::transient(format!("{path} body read failed: {e}")))?;

        let parsed: LedgerResponse = match serde_json::from_str(&text) {
            Ok(parsed) => parsed,
            Err(_) if !status.is_success() => {
                return Err(LedgerError::transient(format!(
                    "{path} returned HTTP {status} with no structured body"
                )));
            }
            Err(e) => {
                return Err(LedgerError::new(
                    ErrorKind::Unknown,
                    format!("{path} returned undecodable body: {e}"),
                ));
            }
        };

        if parsed.success {
            Ok(parsed)
        } else {
            let detail = parsed
                .error
                .unwrap_or_else(|| format!("{path} reported failure with no detail"));
            Err(LedgerError::new(classify_error(&detail), detail))
        }
    }
}

#[async_trait]
impl LedgerApi for HttpLedgerClient {
    async fn claim(&self, card_code: &str) -> LedgerResult<ClaimReceipt> {
        let response = self.post("/card/claim", &ClaimRequest { card_code }).await?;
        let amount = response.amount.as_ref().and_then(units_from_json);
        debug!("Claim accepted for card {}: amount {:?}", card_code, amount);
        Ok(ClaimReceipt { amount })
    }

    async fn pay(&self, from_card: &str, to_card: &str, amount_units: u64) -> LedgerResult<()> {
        let request = PayRequest {
            from_card,
            to_card,
            amount: format_units(amount_units),
        };
        self.post("/card/pay", &request).await?;
        debug!(
            "Paid {} from card {} to card {}",
            request.amount, from_card, to_card
        );
        Ok(())
    }
}
